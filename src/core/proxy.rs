//! Request rewriting for the reverse proxy.
//!
//! Everything here is synchronous header and URI manipulation; the actual backend
//! call goes through the [`HttpClient`](crate::ports::HttpClient) port.
use axum::body::Body as AxumBody;
use hyper::{
    HeaderMap, Method, Request, Uri,
    header::{self, HeaderName, HeaderValue},
    http::uri::InvalidUri,
};
use thiserror::Error;

use crate::{
    core::route::{RouteMatch, RouteNotFound},
    ports::HttpClientError,
};

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Connection-scoped headers that never cross the proxy in either direction.
pub const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error(transparent)]
    RouteNotFound(#[from] RouteNotFound),

    #[error("invalid target for service {service}: {reason}")]
    InvalidTarget { service: String, reason: String },

    #[error("backend request failed: {0}")]
    Backend(#[from] HttpClientError),
}

/// Whether the inbound connection was encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Plain,
    Tls,
}

impl Transport {
    pub fn scheme(&self) -> &'static str {
        match self {
            Transport::Plain => "http",
            Transport::Tls => "https",
        }
    }
}

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Host the client addressed: the `Host` header, else the URI authority (HTTP/2).
pub fn inbound_host<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
}

/// Scheme the client believes it is using.
pub fn external_scheme(headers: &HeaderMap, transport: Transport) -> String {
    headers
        .get(&X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| transport.scheme().to_string())
}

/// `{scheme}://{host}` as seen from outside, used for the document's server URL.
pub fn external_base_url<B>(req: &Request<B>, transport: Transport) -> String {
    let scheme = external_scheme(req.headers(), transport);
    let host = inbound_host(req).unwrap_or_else(|| "localhost".to_string());
    format!("{scheme}://{host}")
}

/// Point the forwarding path at the service's scheme and authority. The base
/// address's own path is replaced. The path and the inbound query are copied as
/// raw text, never re-encoded.
pub fn build_target_uri(
    service: &str,
    base: &str,
    forward_path: &str,
    query: Option<&str>,
) -> Result<Uri, ProxyError> {
    let invalid = |reason: String| ProxyError::InvalidTarget {
        service: service.to_string(),
        reason,
    };

    let base: Uri = base.parse().map_err(|e: InvalidUri| invalid(e.to_string()))?;
    let (Some(scheme), Some(authority)) = (base.scheme(), base.authority()) else {
        return Err(invalid(format!("{base} is not an absolute address")));
    };

    let path_and_query = match query {
        Some(query) => format!("{forward_path}?{query}"),
        None => forward_path.to_string(),
    };

    Uri::builder()
        .scheme(scheme.clone())
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| invalid(e.to_string()))
}

/// Turn the inbound request into the request sent to the matched backend.
pub fn prepare_backend_request(
    req: Request<AxumBody>,
    route: &RouteMatch,
    transport: Transport,
) -> Result<Request<AxumBody>, ProxyError> {
    let service = route.service();
    let target = build_target_uri(
        &service.name,
        &service.address,
        &route.forward_path,
        req.uri().query(),
    )?;

    let original_host = inbound_host(&req);
    let proto = external_scheme(req.headers(), transport);
    let (mut parts, body) = req.into_parts();

    strip_hop_by_hop(&mut parts.headers);
    // The client adapter derives Host from the target URI.
    parts.headers.remove(header::HOST);

    if let Some(host) = original_host.and_then(|h| HeaderValue::from_str(&h).ok()) {
        parts.headers.insert(X_FORWARDED_HOST, host);
    }
    if let Ok(proto) = HeaderValue::from_str(&proto) {
        parts.headers.insert(X_FORWARDED_PROTO, proto);
    }

    let body = if parts.method == Method::HEAD {
        parts.headers.remove(header::CONTENT_LENGTH);
        AxumBody::empty()
    } else {
        body
    };

    parts.uri = target;
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use super::*;
    use crate::core::{
        route::RouteTable,
        service::{Endpoint, ServiceDefinition},
    };

    fn weather_route(path: &str) -> RouteMatch {
        let service = Arc::new(ServiceDefinition {
            name: "weather".to_string(),
            address: "http://127.0.0.1:9001/api".to_string(),
            description: String::new(),
            endpoints: vec![Endpoint {
                path: "/weather/{city}".to_string(),
                method: "GET".to_string(),
                description: String::new(),
                operation_id: None,
                parameters: Vec::new(),
                request_body: None,
            }],
            source: PathBuf::from("weather.yaml"),
        });
        RouteTable::build([&service]).find("GET", path).unwrap()
    }

    #[test]
    fn target_replaces_base_path_and_keeps_query() {
        let uri = build_target_uri(
            "weather",
            "http://127.0.0.1:9001/api",
            "/weather/paris",
            Some("units=metric&lang=fr"),
        )
        .unwrap();
        assert_eq!(
            uri.to_string(),
            "http://127.0.0.1:9001/weather/paris?units=metric&lang=fr"
        );
    }

    #[test]
    fn target_keeps_raw_path_and_query() {
        let uri = build_target_uri(
            "weather",
            "http://127.0.0.1:9001",
            "/weather/o'hare%20intl",
            Some("q='x'&city=S%C3%A3o+Paulo&empty="),
        )
        .unwrap();
        assert_eq!(uri.path(), "/weather/o'hare%20intl");
        assert_eq!(uri.query(), Some("q='x'&city=S%C3%A3o+Paulo&empty="));
    }

    #[test]
    fn target_rejects_relative_base() {
        let err = build_target_uri("x", "/just/a/path", "/a", None).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTarget { .. }));
    }

    #[test]
    fn target_rejects_garbage_base() {
        let err = build_target_uri("x", "not a url", "/a", None).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTarget { .. }));
    }

    #[test]
    fn strips_hop_by_hop_and_keeps_custom_headers() {
        let req = Request::builder()
            .uri("/weather/paris?units=metric")
            .header(header::HOST, "gateway.local:8080")
            .header(header::CONNECTION, "keep-alive")
            .header("keep-alive", "timeout=5")
            .header(header::TE, "trailers")
            .header("x-custom", "1")
            .body(AxumBody::empty())
            .unwrap();

        let out =
            prepare_backend_request(req, &weather_route("/weather/paris"), Transport::Plain)
                .unwrap();

        assert_eq!(
            out.uri().to_string(),
            "http://127.0.0.1:9001/weather/paris?units=metric"
        );
        assert!(out.headers().get(header::CONNECTION).is_none());
        assert!(out.headers().get("keep-alive").is_none());
        assert!(out.headers().get(header::TE).is_none());
        assert_eq!(out.headers()["x-custom"], "1");
        assert_eq!(out.headers()[X_FORWARDED_HOST], "gateway.local:8080");
        assert_eq!(out.headers()[X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn forwarded_proto_is_propagated() {
        let req = Request::builder()
            .uri("/weather/oslo")
            .header(header::HOST, "gw")
            .header("x-forwarded-proto", "https")
            .body(AxumBody::empty())
            .unwrap();
        let out = prepare_backend_request(req, &weather_route("/weather/oslo"), Transport::Plain)
            .unwrap();
        assert_eq!(out.headers()[X_FORWARDED_PROTO], "https");
    }

    #[test]
    fn proto_derived_from_transport() {
        let req = Request::builder()
            .uri("/weather/oslo")
            .body(AxumBody::empty())
            .unwrap();
        let out =
            prepare_backend_request(req, &weather_route("/weather/oslo"), Transport::Tls).unwrap();
        assert_eq!(out.headers()[X_FORWARDED_PROTO], "https");
        assert!(out.headers().get(X_FORWARDED_HOST).is_none());
    }

    #[test]
    fn base_url_prefers_forwarded_proto() {
        let req = Request::builder()
            .uri("/openapi.json")
            .header(header::HOST, "api.example.com")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();
        assert_eq!(
            external_base_url(&req, Transport::Plain),
            "https://api.example.com"
        );

        let req = Request::builder()
            .uri("http://localhost:8080/openapi.json")
            .body(())
            .unwrap();
        assert_eq!(
            external_base_url(&req, Transport::Plain),
            "http://localhost:8080"
        );
    }

    #[test]
    fn strip_hop_by_hop_leaves_end_to_end_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    }
}
