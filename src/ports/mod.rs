//! Traits the core depends on; implementations live in `adapters`.
pub mod definition_source;
pub mod http_client;

pub use definition_source::DefinitionSource;
pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
