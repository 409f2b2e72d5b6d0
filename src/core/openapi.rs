//! OpenAPI 3.1 document synthesis.
//!
//! A pure transform from validated service metadata to a serializable document. The
//! caller holds the registry read lock while this runs; nothing here performs I/O.
//! All collections are ordered (`BTreeMap` / sorted `Vec`) so rendering the same
//! service set twice yields identical bytes.
use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use serde_json::Value;

use crate::{
    config::DocumentInfo,
    core::service::{Endpoint, Parameter, ParameterLocation, RequestBodySpec, ServiceDefinition},
};

pub const OPENAPI_VERSION: &str = "3.1.0";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpenApiDocument {
    pub openapi: &'static str,
    pub info: DocumentInfo,
    pub servers: Vec<ServerObject>,
    /// path -> lower-case method -> operation
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagObject>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerObject {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagObject {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodyObject>,
    pub responses: BTreeMap<&'static str, ResponseObject>,
    #[serde(rename = "x-service-name")]
    pub service_name: String,
    #[serde(rename = "x-service-address")]
    pub service_address: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParameterObject {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestBodyObject {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    pub content: BTreeMap<String, MediaTypeObject>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaTypeObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseObject {
    pub description: &'static str,
}

/// Build the document for `services` (iterated in name order).
pub fn build_document(
    services: &BTreeMap<String, Arc<ServiceDefinition>>,
    info: &DocumentInfo,
    base_url: &str,
) -> OpenApiDocument {
    let tags = services
        .values()
        .map(|service| TagObject {
            name: service.name.clone(),
            description: service.description.clone(),
        })
        .collect();

    let mut paths: BTreeMap<String, BTreeMap<String, Operation>> = BTreeMap::new();
    for service in services.values() {
        for endpoint in &service.endpoints {
            let method = endpoint.method.to_ascii_lowercase();
            let operation = build_operation(service, endpoint, &method);
            paths
                .entry(endpoint.path.clone())
                .or_default()
                .insert(method, operation);
        }
    }

    OpenApiDocument {
        openapi: OPENAPI_VERSION,
        info: info.clone(),
        servers: vec![ServerObject {
            url: base_url.to_string(),
        }],
        paths,
        tags,
    }
}

/// Render the document as pretty-printed JSON bytes.
pub fn render_document(
    services: &BTreeMap<String, Arc<ServiceDefinition>>,
    info: &DocumentInfo,
    base_url: &str,
) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(&build_document(services, info, base_url))
}

fn build_operation(service: &ServiceDefinition, endpoint: &Endpoint, method: &str) -> Operation {
    let summary = if endpoint.description.is_empty() {
        format!("{} {}", endpoint.method, endpoint.path)
    } else {
        endpoint.description.clone()
    };

    let operation_id = endpoint
        .operation_id
        .clone()
        .unwrap_or_else(|| generate_operation_id(&service.name, method, &endpoint.path));

    let mut responses = BTreeMap::new();
    responses.insert(
        "200",
        ResponseObject {
            description: "Successful response.",
        },
    );
    responses.insert(
        "default",
        ResponseObject {
            description: "Unexpected error.",
        },
    );

    Operation {
        operation_id,
        summary,
        description: operation_description(service, endpoint),
        tags: vec![service.name.clone()],
        parameters: convert_parameters(&endpoint.parameters),
        request_body: endpoint.request_body.as_ref().and_then(convert_request_body),
        responses,
        service_name: service.name.clone(),
        service_address: service.address.clone(),
    }
}

fn operation_description(service: &ServiceDefinition, endpoint: &Endpoint) -> String {
    let mut parts = Vec::with_capacity(3);
    if !endpoint.description.is_empty() {
        parts.push(endpoint.description.clone());
    }
    if !service.description.is_empty() {
        parts.push(format!("Service description: {}", service.description));
    }
    parts.push(format!(
        "Requests are proxied to {}{}",
        service.address, endpoint.path
    ));
    parts.join("\n\n")
}

fn convert_parameters(parameters: &[Parameter]) -> Vec<ParameterObject> {
    let mut sorted: Vec<&Parameter> = parameters.iter().collect();
    sorted.sort_by(|a, b| (a.location, &a.name).cmp(&(b.location, &b.name)));
    sorted
        .into_iter()
        .map(|p| ParameterObject {
            name: p.name.clone(),
            location: p.location,
            required: p.required,
            description: p.description.clone(),
            schema: p.schema.clone(),
        })
        .collect()
}

fn convert_request_body(body: &RequestBodySpec) -> Option<RequestBodyObject> {
    let content: BTreeMap<String, MediaTypeObject> = body
        .content
        .iter()
        .filter(|(_, media)| media.schema.is_some() || media.example.is_some())
        .map(|(media_type, media)| {
            (
                media_type.clone(),
                MediaTypeObject {
                    schema: media.schema.clone(),
                    example: media.example.clone(),
                },
            )
        })
        .collect();

    if content.is_empty() {
        return None;
    }

    Some(RequestBodyObject {
        description: body.description.clone(),
        required: body.required,
        content,
    })
}

/// `{service}_{method}_{path}` with the path reduced to `[A-Za-z0-9_]`.
pub fn generate_operation_id(service: &str, method: &str, path: &str) -> String {
    let mut sanitized = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '{' | '}' => {}
            c if c.is_ascii_alphanumeric() => sanitized.push(c),
            _ => {
                if !sanitized.ends_with('_') {
                    sanitized.push('_');
                }
            }
        }
    }
    let sanitized = sanitized.trim_matches('_');
    let sanitized = if sanitized.is_empty() { "root" } else { sanitized };
    format!("{service}_{method}_{sanitized}")
}
