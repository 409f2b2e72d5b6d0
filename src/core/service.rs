//! Validated service metadata.
//!
//! Values of these types only ever come out of
//! [`ServiceDefinitionValidator`](crate::config::ServiceDefinitionValidator), so the
//! rest of the crate can rely on the normalization invariants: trimmed names, an
//! address without a trailing `/`, upper-case methods, paths starting with `/` and one
//! required path parameter per template placeholder.
use std::{collections::BTreeMap, fmt, path::PathBuf};

use serde::Serialize;
use serde_json::Value;

/// One backend service and the endpoints it exposes through the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub address: String,
    pub description: String,
    pub endpoints: Vec<Endpoint>,
    /// Definition file this service was loaded from.
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    pub description: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBodySpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub description: String,
    pub schema: Value,
}

/// Where a parameter travels. Ordering follows the wire name so that sorting by
/// location matches a lexicographic sort of `"path"` / `"query"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodySpec {
    pub description: String,
    pub required: bool,
    /// Media type -> schema/example, kept sorted for deterministic output.
    pub content: BTreeMap<String, MediaTypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaTypeSpec {
    pub schema: Option<Value>,
    pub example: Option<Value>,
}

/// Schema used for parameters that do not declare one.
pub fn default_string_schema() -> Value {
    serde_json::json!({ "type": "string" })
}

impl ServiceDefinition {
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}
