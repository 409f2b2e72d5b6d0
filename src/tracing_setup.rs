use eyre::{Result, WrapErr};
use tracing::Span;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` when set and valid, otherwise [`DEFAULT_FILTER`].
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber for the gateway process.
///
/// `Json` emits one object per event with the span list attached, for log shippers.
/// `Pretty` is the multi-line console format used during development. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    let registry = Registry::default().with(env_filter());

    match format {
        LogFormat::Json => registry
            .with(fmt.json().with_current_span(false).with_span_list(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt.pretty()).try_init(),
    }
    .wrap_err_with(|| format!("Failed to install {format:?} tracing subscriber"))?;

    tracing::info!(format = ?format, "Wayfinder logging initialized");
    Ok(())
}

/// Span covering one inbound request. `service.name` is filled in once routed.
pub fn create_request_span(method: &str, path: &str) -> Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        service.name = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

pub fn create_backend_span(backend_url: &str, method: &str, path: &str) -> Span {
    tracing::info_span!(
        "backend_request",
        backend.url = backend_url,
        http.method = method,
        http.path = path,
        http.status_code = tracing::field::Empty,
    )
}

pub fn create_watcher_span(dir: &str) -> Span {
    tracing::info_span!("definition_watcher", dir = dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let first = init_tracing(LogFormat::Json);
        let second = init_tracing(LogFormat::Pretty);
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn span_helpers_name_their_spans() {
        // Spans are disabled without a subscriber; a bare registry enables them.
        tracing::subscriber::with_default(Registry::default(), || {
            let request = create_request_span("GET", "/weather/paris");
            let backend = create_backend_span("http://127.0.0.1:9001", "GET", "/weather/paris");
            let watcher = create_watcher_span("/srv/services");

            assert_eq!(request.metadata().map(|m| m.name()), Some("request"));
            assert_eq!(backend.metadata().map(|m| m.name()), Some("backend_request"));
            assert_eq!(watcher.metadata().map(|m| m.name()), Some("definition_watcher"));
            assert!(request.metadata().is_some_and(|m| m.fields().field("duration_ms").is_some()));
        });
    }
}
