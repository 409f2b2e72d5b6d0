pub mod definition_dir;
pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod watcher;

/// Re-export commonly used types from adapters
pub use definition_dir::DirectoryDefinitionSource;
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, router};
pub use middleware::*;
pub use watcher::DirectoryWatcher;
