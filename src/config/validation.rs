use std::{
    collections::{BTreeMap, HashSet},
    net::SocketAddr,
    path::Path,
    time::Duration,
};

use crate::{
    config::models::{
        EndpointDocument, GatewayConfig, ParameterDocument, RequestBodyDocument, ServiceDocument,
    },
    core::{
        route::PathTemplate,
        service::{
            Endpoint, MediaTypeSpec, Parameter, ParameterLocation, RequestBodySpec,
            ServiceDefinition, default_string_schema,
        },
    },
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ValidationError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the gateway settings, reporting every problem at once.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services_dir.trim().is_empty() {
            errors.push(ValidationError::missing("services_dir"));
        }

        if !config.openapi_path.starts_with('/') {
            errors.push(ValidationError::invalid(
                "openapi_path",
                "Must start with '/'",
            ));
        }

        match parse_duration("upstream_timeout", &config.upstream_timeout) {
            Ok(timeout) if timeout.is_zero() => errors.push(ValidationError::invalid(
                "upstream_timeout",
                "Must be greater than 0",
            )),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        for (field, value) in [
            ("write_settle_delay", &config.write_settle_delay),
            ("rescan_settle_delay", &config.rescan_settle_delay),
        ] {
            if let Err(e) = parse_duration(field, value) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

/// Parse a humantime duration such as `"200ms"` or `"1m 30s"`.
pub fn parse_duration(field: &str, value: &str) -> ValidationResult<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ValidationError::invalid(field, format!("Invalid duration '{value}': {e}")))
}

impl GatewayConfig {
    pub fn upstream_timeout(&self) -> ValidationResult<Duration> {
        parse_duration("upstream_timeout", &self.upstream_timeout)
    }

    pub fn write_settle_delay(&self) -> ValidationResult<Duration> {
        parse_duration("write_settle_delay", &self.write_settle_delay)
    }

    pub fn rescan_settle_delay(&self) -> ValidationResult<Duration> {
        parse_duration("rescan_settle_delay", &self.rescan_settle_delay)
    }
}

/// Turns a raw [`ServiceDocument`] into a normalized [`ServiceDefinition`].
///
/// Normalization trims every free-text field, strips the trailing `/` from the
/// address, upper-cases methods, prepends a missing leading `/` to endpoint paths,
/// defaults parameter schemas to `{"type": "string"}`, synthesizes a required path
/// parameter for every template placeholder the author did not declare, and drops
/// request bodies that list no media types. The first violation aborts with an
/// error naming the offending field.
pub struct ServiceDefinitionValidator;

impl ServiceDefinitionValidator {
    pub fn validate(doc: ServiceDocument, source: &Path) -> ValidationResult<ServiceDefinition> {
        let name = doc.service_name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::missing("serviceName"));
        }

        let address = doc.service_address.trim().trim_end_matches('/').to_string();
        if address.is_empty() {
            return Err(ValidationError::missing("serviceAddress"));
        }
        Self::validate_address(&address)?;

        if doc.endpoints.is_empty() {
            return Err(ValidationError::invalid(
                "endpoints",
                "Service must define at least one endpoint",
            ));
        }

        let endpoints = doc
            .endpoints
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| Self::validate_endpoint(index, endpoint))
            .collect::<ValidationResult<Vec<_>>>()?;

        Ok(ServiceDefinition {
            name,
            address,
            description: doc.description.trim().to_string(),
            endpoints,
            source: source.to_path_buf(),
        })
    }

    fn validate_address(address: &str) -> ValidationResult<()> {
        let url = url::Url::parse(address).map_err(|e| {
            ValidationError::invalid("serviceAddress", format!("Invalid URL format: {e}"))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ValidationError::invalid(
                "serviceAddress",
                format!("URL scheme must be 'http' or 'https', got '{}'", url.scheme()),
            ));
        }

        if url.host().is_none() {
            return Err(ValidationError::invalid(
                "serviceAddress",
                "URL must have a valid host",
            ));
        }

        Ok(())
    }

    fn validate_endpoint(index: usize, doc: EndpointDocument) -> ValidationResult<Endpoint> {
        let mut path = doc.path.trim().to_string();
        if path.is_empty() {
            return Err(ValidationError::missing(format!("endpoints[{index}].path")));
        }
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        let method = doc.method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err(ValidationError::missing(format!(
                "endpoints[{index}].method"
            )));
        }
        if http::Method::from_bytes(method.as_bytes()).is_err() {
            return Err(ValidationError::invalid(
                format!("endpoints[{index}].method"),
                format!("'{method}' is not a valid HTTP method"),
            ));
        }

        let template = PathTemplate::parse(&path).map_err(|e| {
            ValidationError::invalid(format!("endpoints[{index}].path"), e.to_string())
        })?;
        let placeholders: Vec<&str> = template.param_names().collect();

        let mut parameters = Vec::with_capacity(doc.parameters.len() + placeholders.len());
        let mut declared_path_params: HashSet<String> = HashSet::new();
        for (param_index, param) in doc.parameters.into_iter().enumerate() {
            let field = format!("endpoints[{index}].parameters[{param_index}]");
            let parameter = Self::validate_parameter(&field, param, &placeholders)?;

            if parameter.location == ParameterLocation::Path
                && !declared_path_params.insert(parameter.name.clone())
            {
                return Err(ValidationError::invalid(
                    format!("{field}.name"),
                    format!("Path parameter '{}' is declared more than once", parameter.name),
                ));
            }
            parameters.push(parameter);
        }

        for name in placeholders {
            if !declared_path_params.contains(name) {
                parameters.push(Parameter {
                    name: name.to_string(),
                    location: ParameterLocation::Path,
                    required: true,
                    description: String::new(),
                    schema: default_string_schema(),
                });
            }
        }

        let operation_id = Some(doc.operation_id.trim().to_string()).filter(|id| !id.is_empty());

        Ok(Endpoint {
            path,
            method,
            description: doc.description.trim().to_string(),
            operation_id,
            parameters,
            request_body: doc.request_body.and_then(Self::normalize_request_body),
        })
    }

    fn validate_parameter(
        field: &str,
        doc: ParameterDocument,
        placeholders: &[&str],
    ) -> ValidationResult<Parameter> {
        let name = doc.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::missing(format!("{field}.name")));
        }

        let in_template = placeholders.contains(&name.as_str());
        let location = match doc.location.trim().to_ascii_lowercase().as_str() {
            "" if in_template => ParameterLocation::Path,
            "" | "query" => ParameterLocation::Query,
            "path" => ParameterLocation::Path,
            other => {
                return Err(ValidationError::invalid(
                    format!("{field}.in"),
                    format!("Expected 'path' or 'query', got '{other}'"),
                ));
            }
        };

        if location == ParameterLocation::Path && !in_template {
            return Err(ValidationError::invalid(
                format!("{field}.name"),
                format!("Path parameter '{name}' does not appear in the endpoint path"),
            ));
        }

        Ok(Parameter {
            required: doc.required || location == ParameterLocation::Path,
            name,
            location,
            description: doc.description.trim().to_string(),
            schema: doc.schema.unwrap_or_else(default_string_schema),
        })
    }

    fn normalize_request_body(doc: RequestBodyDocument) -> Option<RequestBodySpec> {
        if doc.content.is_empty() {
            return None;
        }

        let content: BTreeMap<String, MediaTypeSpec> = doc
            .content
            .into_iter()
            .map(|(media_type, media)| {
                (
                    media_type,
                    MediaTypeSpec {
                        schema: media.schema,
                        example: media.example,
                    },
                )
            })
            .collect();

        Some(RequestBodySpec {
            description: doc.description.trim().to_string(),
            required: doc.required,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::config::models::{MediaTypeDocument, RequestBodyDocument};

    fn source() -> PathBuf {
        PathBuf::from("/defs/service.yaml")
    }

    fn endpoint(method: &str, path: &str) -> EndpointDocument {
        EndpointDocument {
            path: path.to_string(),
            method: method.to_string(),
            ..EndpointDocument::default()
        }
    }

    fn document(endpoints: Vec<EndpointDocument>) -> ServiceDocument {
        ServiceDocument {
            service_name: "  weather ".to_string(),
            service_address: " http://localhost:9001/ ".to_string(),
            description: " Forecasts ".to_string(),
            endpoints,
        }
    }

    #[test]
    fn normalizes_service_fields() {
        let doc = document(vec![endpoint("get", "weather")]);
        let service = ServiceDefinitionValidator::validate(doc, &source()).unwrap();

        assert_eq!(service.name, "weather");
        assert_eq!(service.address, "http://localhost:9001");
        assert_eq!(service.description, "Forecasts");
        assert_eq!(service.endpoints[0].method, "GET");
        assert_eq!(service.endpoints[0].path, "/weather");
        assert_eq!(service.source, source());
    }

    #[test]
    fn synthesizes_missing_path_parameters() {
        let service = ServiceDefinitionValidator::validate(
            document(vec![endpoint("GET", "/weather/{city}/{day}")]),
            &source(),
        )
        .unwrap();

        let params = &service.endpoints[0].parameters;
        assert_eq!(params.len(), 2);
        for (param, expected) in params.iter().zip(["city", "day"]) {
            assert_eq!(param.name, expected);
            assert_eq!(param.location, ParameterLocation::Path);
            assert!(param.required);
            assert_eq!(param.schema, json!({ "type": "string" }));
        }
    }

    #[test]
    fn declared_path_parameter_is_forced_required_and_kept_once() {
        let mut ep = endpoint("GET", "/weather/{city}");
        ep.parameters = vec![
            ParameterDocument {
                name: "city".to_string(),
                required: false,
                schema: Some(json!({ "type": "string", "minLength": 2 })),
                ..ParameterDocument::default()
            },
            ParameterDocument {
                name: " units ".to_string(),
                ..ParameterDocument::default()
            },
        ];

        let service = ServiceDefinitionValidator::validate(document(vec![ep]), &source()).unwrap();
        let params = &service.endpoints[0].parameters;

        let path_params: Vec<_> = params
            .iter()
            .filter(|p| p.location == ParameterLocation::Path)
            .collect();
        assert_eq!(path_params.len(), 1);
        assert!(path_params[0].required);
        assert_eq!(path_params[0].schema["minLength"], 2);

        let units = params.iter().find(|p| p.name == "units").unwrap();
        assert_eq!(units.location, ParameterLocation::Query);
        assert!(!units.required);
        assert_eq!(units.schema, json!({ "type": "string" }));
    }

    #[test]
    fn rejects_missing_fields_by_name() {
        let mut doc = document(vec![endpoint("GET", "/x")]);
        doc.service_name = "   ".to_string();
        assert_eq!(
            ServiceDefinitionValidator::validate(doc, &source()).unwrap_err(),
            ValidationError::MissingField {
                field: "serviceName".to_string()
            }
        );

        let mut doc = document(vec![endpoint("GET", "/x")]);
        doc.service_address.clear();
        assert!(matches!(
            ServiceDefinitionValidator::validate(doc, &source()),
            Err(ValidationError::MissingField { field }) if field == "serviceAddress"
        ));

        assert!(matches!(
            ServiceDefinitionValidator::validate(document(vec![]), &source()),
            Err(ValidationError::InvalidField { field, .. }) if field == "endpoints"
        ));

        assert!(matches!(
            ServiceDefinitionValidator::validate(document(vec![endpoint("", "/x")]), &source()),
            Err(ValidationError::MissingField { field }) if field == "endpoints[0].method"
        ));

        assert!(matches!(
            ServiceDefinitionValidator::validate(
                document(vec![endpoint("GET", "/ok"), endpoint("GET", " ")]),
                &source()
            ),
            Err(ValidationError::MissingField { field }) if field == "endpoints[1].path"
        ));
    }

    #[test]
    fn rejects_bad_address_and_template() {
        let mut doc = document(vec![endpoint("GET", "/x")]);
        doc.service_address = "ftp://files.local".to_string();
        assert!(matches!(
            ServiceDefinitionValidator::validate(doc, &source()),
            Err(ValidationError::InvalidField { field, .. }) if field == "serviceAddress"
        ));

        assert!(matches!(
            ServiceDefinitionValidator::validate(
                document(vec![endpoint("GET", "/todos/{id")]),
                &source()
            ),
            Err(ValidationError::InvalidField { field, .. }) if field == "endpoints[0].path"
        ));
    }

    #[test]
    fn rejects_repeated_placeholder() {
        let err = ServiceDefinitionValidator::validate(
            document(vec![endpoint("GET", "/x"), endpoint("GET", "/a/{id}/{id}")]),
            &source(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField { ref field, .. } if field == "endpoints[1].path"
        ));
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_unknown_location_and_orphan_path_parameter() {
        let mut ep = endpoint("GET", "/todos");
        ep.parameters = vec![ParameterDocument {
            name: "x".to_string(),
            location: "header".to_string(),
            ..ParameterDocument::default()
        }];
        assert!(matches!(
            ServiceDefinitionValidator::validate(document(vec![ep]), &source()),
            Err(ValidationError::InvalidField { field, .. })
                if field == "endpoints[0].parameters[0].in"
        ));

        let mut ep = endpoint("GET", "/todos");
        ep.parameters = vec![ParameterDocument {
            name: "id".to_string(),
            location: "PATH".to_string(),
            ..ParameterDocument::default()
        }];
        assert!(matches!(
            ServiceDefinitionValidator::validate(document(vec![ep]), &source()),
            Err(ValidationError::InvalidField { field, .. })
                if field == "endpoints[0].parameters[0].name"
        ));
    }

    #[test]
    fn drops_request_body_without_media_types() {
        let mut empty = endpoint("POST", "/todos");
        empty.request_body = Some(RequestBodyDocument {
            description: "nothing".to_string(),
            ..RequestBodyDocument::default()
        });

        let mut full = endpoint("PUT", "/todos");
        full.request_body = Some(RequestBodyDocument {
            description: " New todo ".to_string(),
            required: true,
            content: [(
                "application/json".to_string(),
                MediaTypeDocument {
                    schema: Some(json!({ "type": "object" })),
                    example: Some(json!({ "title": "milk" })),
                },
            )]
            .into_iter()
            .collect(),
        });

        let service =
            ServiceDefinitionValidator::validate(document(vec![empty, full]), &source()).unwrap();
        assert!(service.endpoints[0].request_body.is_none());

        let body = service.endpoints[1].request_body.as_ref().unwrap();
        assert_eq!(body.description, "New todo");
        assert!(body.required);
        assert_eq!(
            body.content["application/json"].example,
            Some(json!({ "title": "milk" }))
        );
    }

    #[test]
    fn blank_operation_id_becomes_none() {
        let mut ep = endpoint("GET", "/todos");
        ep.operation_id = "  ".to_string();
        let service = ServiceDefinitionValidator::validate(document(vec![ep]), &source()).unwrap();
        assert_eq!(service.endpoints[0].operation_id, None);
    }

    #[test]
    fn gateway_validator_accepts_defaults() {
        assert!(GatewayConfigValidator::validate(&GatewayConfig::default()).is_ok());
        let config = GatewayConfig::default();
        assert_eq!(config.upstream_timeout().unwrap(), Duration::from_secs(60));
        assert_eq!(
            config.write_settle_delay().unwrap(),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn gateway_validator_collects_every_error() {
        let config = GatewayConfig::builder()
            .listen_addr("localhost")
            .openapi_path("openapi.json")
            .upstream_timeout("0s")
            .settle_delays("soon", "200ms")
            .build();

        match GatewayConfigValidator::validate(&config) {
            Err(ValidationError::ValidationFailed { message }) => {
                assert!(message.starts_with("Found 4 validation errors"));
                assert!(message.contains("listen address"));
                assert!(message.contains("openapi_path"));
                assert!(message.contains("upstream_timeout"));
                assert!(message.contains("write_settle_delay"));
            }
            other => panic!("expected aggregated failure, got {other:?}"),
        }
    }
}
