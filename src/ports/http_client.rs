use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Why a backend exchange produced no response. The proxy maps every variant to 502.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Connect, write or response-head read failed.
    #[error("backend unreachable: {0}")]
    ConnectionError(String),

    /// No response head within the configured upstream timeout.
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("request cannot be sent: {0}")]
    InvalidRequest(String),
}

pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Port for forwarding one request to a backend service.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send `req` (already carrying an absolute backend URI) and return the
    /// backend's response head with a streaming body.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
