use std::{convert::Infallible, sync::Arc, time::Instant};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    http::{Method, StatusCode, header},
    middleware,
    routing::any,
};
use eyre::{Result, WrapErr};
use hyper::Response;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::{
    adapters::middleware::{cors_middleware, request_timing_middleware},
    config::DocumentInfo,
    core::{
        proxy::{
            ProxyError, Transport, external_base_url, prepare_backend_request, strip_hop_by_hop,
        },
        registry::ServiceRegistry,
    },
    ports::http_client::HttpClient,
    tracing_setup::create_request_span,
};

pub const NOT_FOUND_MESSAGE: &str = "no matching endpoint";
pub const BAD_GATEWAY_MESSAGE: &str = "proxy error";

/// HTTP handler for the Wayfinder gateway: serves the OpenAPI document and proxies
/// everything else to the owning backend.
#[derive(Clone)]
pub struct HttpHandler {
    registry: Arc<ServiceRegistry>,
    http_client: Arc<dyn HttpClient>,
    openapi_path: String,
    document: DocumentInfo,
}

impl HttpHandler {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        http_client: Arc<dyn HttpClient>,
        openapi_path: impl Into<String>,
        document: DocumentInfo,
    ) -> Self {
        Self {
            registry,
            http_client,
            openapi_path: openapi_path.into(),
            document,
        }
    }

    /// Main request handler. Pre-flight `OPTIONS` never reaches this point; the
    /// CORS middleware answers it.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        transport: Transport,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        if req.uri().path() == self.openapi_path {
            return self.handle_openapi(&req, transport);
        }
        self.handle_proxy_request(req, transport).await
    }

    fn handle_openapi(
        &self,
        req: &Request<AxumBody>,
        transport: Transport,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let base_url = external_base_url(req, transport);

        match self.registry.describe(&self.document, &base_url) {
            Ok(payload) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(AxumBody::from(payload))
                .wrap_err("Failed to build OpenAPI response"),
            Err(e) => {
                tracing::error!("Failed to build OpenAPI document: {}", e);
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to build OpenAPI document",
                )
            }
        }
    }

    async fn handle_proxy_request(
        &self,
        req: Request<AxumBody>,
        transport: Transport,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let span = create_request_span(req.method().as_str(), req.uri().path());
        let started = Instant::now();

        let outcome = self
            .proxy_request_to_backend(req, transport)
            .instrument(span.clone())
            .await;

        let response = match outcome {
            Ok(response) => Ok(response),
            Err(ProxyError::RouteNotFound(e)) => {
                tracing::debug!(parent: &span, "{}", e);
                text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
            }
            Err(e) => {
                tracing::error!(parent: &span, "Proxy error: {}", e);
                text_response(StatusCode::BAD_GATEWAY, BAD_GATEWAY_MESSAGE)
            }
        }?;

        span.record("http.status_code", response.status().as_u16());
        span.record("duration_ms", started.elapsed().as_millis() as u64);
        Ok(response)
    }

    /// Proxy the request to the backend owning the matched endpoint.
    async fn proxy_request_to_backend(
        &self,
        req: Request<AxumBody>,
        transport: Transport,
    ) -> Result<Response<AxumBody>, ProxyError> {
        let route = self
            .registry
            .find_route(req.method().as_str(), req.uri().path())?;
        tracing::Span::current().record("service.name", route.service().name.as_str());

        let is_head = req.method() == Method::HEAD;
        let outbound = prepare_backend_request(req, &route, transport)?;

        tracing::info!(
            "Proxy {} {} -> {}",
            outbound.method(),
            route.forward_path,
            outbound.uri()
        );

        let response = self.http_client.send_request(outbound).await?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        let body = if is_head { AxumBody::empty() } else { body };

        Ok(Response::from_parts(parts, body))
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Result<Response<AxumBody>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(AxumBody::from(message))
        .wrap_err("Failed to build error response")
}

/// Router serving every path through `handler`, with tracing, timing and CORS layers.
pub fn router(handler: Arc<HttpHandler>, transport: Transport) -> Router {
    let route = move |req: Request| {
        let handler = handler.clone();
        async move {
            match handler.handle_request(req, transport).await {
                Ok(response) => Ok::<Response<AxumBody>, Infallible>(response),
                Err(e) => {
                    tracing::error!("Request handling error: {:?}", e);
                    let mut response = Response::new(AxumBody::from("Internal Server Error"));
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    Ok(response)
                }
            }
        }
    };

    Router::new()
        .route("/{*path}", any(route.clone()))
        .route("/", any(route))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_timing_middleware))
                .layer(middleware::from_fn(cors_middleware)),
        )
}
