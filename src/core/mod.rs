pub mod openapi;
pub mod proxy;
pub mod registry;
pub mod route;
pub mod service;

pub use proxy::{ProxyError, Transport};
pub use registry::{RescanReport, ServiceRegistry};
pub use route::{RouteMatch, RouteNotFound, RouteTable};
pub use service::ServiceDefinition;
