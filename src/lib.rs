//! Wayfinder - a service-discovering API gateway.
//!
//! Wayfinder watches a directory of service definition files (YAML, JSON or TOML),
//! keeps a route table derived from them, proxies matching requests to the owning
//! backend and publishes a merged OpenAPI 3.1 document describing every active
//! service.
//!
//! # Features
//! - Hot reload: definition files are picked up, reloaded and dropped as they change
//! - Path templates (`/weather/{city}`) matched per HTTP method
//! - Reverse proxy with hop-by-hop header hygiene and `X-Forwarded-*` headers
//! - Deterministic OpenAPI document served at a configurable path
//! - Permissive CORS on every response
//! - Structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use wayfinder::{
//!     DirectoryDefinitionSource, HttpClientAdapter, HttpHandler, ServiceRegistry,
//!     config::DocumentInfo, core::Transport,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let source = Arc::new(DirectoryDefinitionSource::new("./services")?);
//! let registry = Arc::new(ServiceRegistry::new(source));
//! registry.rescan()?;
//!
//! let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(60)));
//! let handler = Arc::new(HttpHandler::new(
//!     registry,
//!     client,
//!     "/openapi.json",
//!     DocumentInfo::default(),
//! ));
//! let app = wayfinder::adapters::router(handler, Transport::Plain);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! **ports** hold the traits the core needs (definition source, backend client),
//! **adapters** implement them (directory, hyper client, axum handler, notify
//! watcher) and **core** keeps the registry, route matching, proxy rewriting and
//! document synthesis free of I/O.
//!
//! # Error Handling
//! Domain failures are typed (`DefinitionError`, `RouteNotFound`, `ProxyError`);
//! start-up plumbing returns `eyre::Result` with context attached.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{DirectoryDefinitionSource, DirectoryWatcher, HttpClientAdapter, HttpHandler},
    core::ServiceRegistry,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
