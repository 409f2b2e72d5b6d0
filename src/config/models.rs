//! Configuration data structures for Wayfinder.
//!
//! Two families live here:
//! * [`GatewayConfig`]: process-level settings (listen address, definition
//!   directory, timeouts, logging). Every field has a default so a missing config
//!   file is valid.
//! * `*Document` types: the raw, unvalidated shape of one service definition file.
//!   They are turned into [`ServiceDefinition`](crate::core::service::ServiceDefinition)
//!   by [`ServiceDefinitionValidator`](crate::config::ServiceDefinitionValidator).
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output format of the structured log.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// `info` block of the published OpenAPI document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DocumentInfo {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            title: "Local Service Gateway".to_string(),
            version: "1.0.0".to_string(),
            description: "Auto-generated OpenAPI schema for locally discovered services."
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Directory holding one definition file per backend service.
    pub services_dir: String,
    /// Path serving the generated OpenAPI document.
    pub openapi_path: String,
    /// Overall deadline for one backend call, parsed by humantime (e.g. "60s").
    pub upstream_timeout: String,
    /// Quiet period after a create/write before the file is reloaded.
    pub write_settle_delay: String,
    /// Quiet period after a rename before the directory is rescanned.
    pub rescan_settle_delay: String,
    pub log_format: LogFormat,
    pub document: DocumentInfo,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            services_dir: "./services".to_string(),
            openapi_path: "/openapi.json".to_string(),
            upstream_timeout: "60s".to_string(),
            write_settle_delay: "200ms".to_string(),
            rescan_settle_delay: "300ms".to_string(),
            log_format: LogFormat::default(),
            document: DocumentInfo::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

/// Builder for GatewayConfig, mostly used by tests and embedders.
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn services_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.services_dir = dir.into();
        self
    }

    pub fn openapi_path(mut self, path: impl Into<String>) -> Self {
        self.config.openapi_path = path.into();
        self
    }

    pub fn upstream_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.config.upstream_timeout = timeout.into();
        self
    }

    pub fn settle_delays(mut self, write: impl Into<String>, rescan: impl Into<String>) -> Self {
        self.config.write_settle_delay = write.into();
        self.config.rescan_settle_delay = rescan.into();
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// Raw service definition file.
///
/// The lower-case aliases accept keys folded by the `config` crate.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDocument {
    #[serde(default, alias = "servicename")]
    pub service_name: String,
    #[serde(default, alias = "serviceaddress")]
    pub service_address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointDocument>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDocument {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "operationid")]
    pub operation_id: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDocument>,
    #[serde(default, alias = "requestbody")]
    pub request_body: Option<RequestBodyDocument>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ParameterDocument {
    #[serde(default)]
    pub name: String,
    /// `path` or `query`; inferred from the template when empty.
    #[serde(default, rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RequestBodyDocument {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: BTreeMap<String, MediaTypeDocument>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MediaTypeDocument {
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub example: Option<Value>,
}
