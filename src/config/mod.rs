pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{
    DefinitionError, is_definition_file, load_gateway_config, load_service_definition,
    parse_service_definition,
};
pub use models::*;
pub use validation::{
    GatewayConfigValidator, ServiceDefinitionValidator, ValidationError, ValidationResult,
};
