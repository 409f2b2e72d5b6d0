use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{
    Request, Response, Version,
    body::{Body, Bytes, Frame, Incoming, SizeHint},
    header,
    header::HeaderValue,
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::time::{Instant, Sleep, sleep_until, timeout_at};
use tracing::Instrument;

use crate::{
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup::create_backend_span,
};

/// Plain HTTP/1.1 client for backend services.
///
/// * Sets `Host` from the target URI
/// * One deadline covers the whole exchange: connect, response head and body
/// * Streams the backend body back as an Axum body
///
/// Dropping the returned future aborts the backend call, which is how client
/// disconnects propagate.
pub struct HttpClientAdapter {
    client: Client<HttpConnector, AxumBody>,
    timeout: Duration,
}

impl HttpClientAdapter {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(connector);

        tracing::debug!(timeout = ?timeout, "Created backend HTTP client");
        Self { client, timeout }
    }

    fn set_host_header(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let Some(host) = req.uri().host() else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        };
        let value = match req.uri().port_u16() {
            Some(port) => HeaderValue::from_str(&format!("{host}:{port}")),
            None => HeaderValue::from_str(host),
        }
        .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::set_host_header(&mut req)?;
        *req.version_mut() = Version::HTTP_11;

        let backend = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );
        let method = req.method().clone();
        let uri = req.uri().clone();

        let span = create_backend_span(&backend, method.as_str(), uri.path());

        async move {
            tracing::debug!("Sending request: {} {}", method, uri);

            let deadline = Instant::now() + self.timeout;

            match timeout_at(deadline, self.client.request(req)).await {
                Ok(Ok(response)) => {
                    tracing::Span::current()
                        .record("http.status_code", response.status().as_u16());

                    let (mut parts, body) = response.into_parts();
                    // Axum re-frames the streamed body.
                    parts.headers.remove(header::TRANSFER_ENCODING);
                    let body = DeadlineBody::new(body, deadline, self.timeout);
                    Ok(Response::from_parts(parts, AxumBody::new(body)))
                }
                Ok(Err(e)) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    tracing::warn!(
                        "Error making request to backend {} ({} {}): {}",
                        backend,
                        method,
                        uri,
                        e
                    );
                    Err(HttpClientError::ConnectionError(format!(
                        "Request to {method} {uri} failed: {e}"
                    )))
                }
                Err(_) => {
                    tracing::Span::current().record("http.status_code", 504u16);
                    tracing::warn!(
                        "Backend {} did not answer {} {} within {:?}",
                        backend,
                        method,
                        uri,
                        self.timeout
                    );
                    Err(HttpClientError::Timeout(self.timeout))
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Backend body that fails with [`HttpClientError::Timeout`] once the exchange
/// deadline passes, even if the backend stalls mid-body.
struct DeadlineBody {
    inner: Pin<Box<Incoming>>,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
}

impl DeadlineBody {
    fn new(inner: Incoming, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner: Box::pin(inner),
            deadline: Box::pin(sleep_until(deadline)),
            timeout,
        }
    }
}

impl Body for DeadlineBody {
    type Data = Bytes;
    type Error = HttpClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();

        if let Poll::Ready(frame) = this.inner.as_mut().poll_frame(cx) {
            return Poll::Ready(frame.map(|result| {
                result.map_err(|e| HttpClientError::ConnectionError(e.to_string()))
            }));
        }
        if this.deadline.as_mut().poll(cx).is_ready() {
            tracing::warn!("Backend body not finished within {:?}", this.timeout);
            return Poll::Ready(Some(Err(HttpClientError::Timeout(this.timeout))));
        }
        Poll::Pending
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
