use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use wayfinder::{
    adapters::{DirectoryDefinitionSource, DirectoryWatcher, HttpClientAdapter, HttpHandler, router},
    config::{GatewayConfig, GatewayConfigValidator, load_gateway_config},
    core::{ServiceRegistry, Transport},
    ports::DefinitionSource,
    tracing_setup,
    utils::{GracefulShutdown, ShutdownReason},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Gateway settings file (toml, yaml or json)
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Directory holding the service definition files
    #[clap(short = 'd', long, global = true)]
    services_dir: Option<String>,

    /// Address to listen on, e.g. 127.0.0.1:8080
    #[clap(short, long, global = true)]
    listen: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server (default)
    Serve,
    /// Load every service definition and report problems
    Validate,
    /// Write a sample service definition into the services directory
    Init,
}

const SAMPLE_DEFINITION: &str = r#"# Sample Wayfinder service definition.
# One file per backend service; the file is reloaded whenever it changes.
serviceName: weather
serviceAddress: http://localhost:9001
description: Current conditions and forecasts
endpoints:
  - path: /weather/{city}
    method: GET
    description: Current weather for a city
    parameters:
      - name: city
        in: path
        description: City name, e.g. paris
      - name: units
        in: query
        schema:
          type: string
          enum: [metric, imperial]
  - path: /weather/{city}/alerts
    method: POST
    description: Subscribe to weather alerts for a city
    requestBody:
      required: true
      content:
        application/json:
          schema:
            type: object
            properties:
              email:
                type: string
          example:
            email: someone@example.com
"#;

fn resolve_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = load_gateway_config(args.config.as_deref())?;
    if let Some(listen) = &args.listen {
        config.listen_addr = listen.clone();
    }
    if let Some(dir) = &args.services_dir {
        config.services_dir = dir.clone();
    }
    GatewayConfigValidator::validate(&config).wrap_err("Invalid gateway configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Some(Commands::Validate) => validate_definitions_command(&config),
        Some(Commands::Init) => init_definition_command(&config).await,
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    tracing_setup::init_tracing(config.log_format)?;

    let upstream_timeout = config.upstream_timeout()?;
    let write_settle = config.write_settle_delay()?;
    let rescan_settle = config.rescan_settle_delay()?;

    let source = Arc::new(
        DirectoryDefinitionSource::new(&config.services_dir)
            .wrap_err("Failed to open services directory")?,
    );
    let registry = Arc::new(ServiceRegistry::new(source.clone()));

    let report = registry
        .rescan()
        .wrap_err("Failed to load service definitions")?;
    for (path, error) in &report.failed {
        tracing::warn!(source = %path.display(), "Skipped definition: {}", error);
    }
    for service in registry.snapshot() {
        tracing::info!(
            service = %service.name,
            address = %service.address,
            endpoints = service.endpoint_count(),
            "Service ready"
        );
    }
    tracing::info!(
        services = report.loaded.len(),
        routes = registry.route_count(),
        dir = %source.root().display(),
        "Service registry initialized"
    );

    let shutdown = GracefulShutdown::new();

    let watcher_handle = DirectoryWatcher::new(registry.clone(), write_settle, rescan_settle)
        .spawn(shutdown.child_token())?;

    let signal_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown.run_signal_handler().await {
                tracing::error!("Signal handler failed: {:?}", e);
            }
        })
    };

    let http_client = Arc::new(HttpClientAdapter::new(upstream_timeout));
    let handler = Arc::new(HttpHandler::new(
        registry.clone(),
        http_client,
        config.openapi_path.clone(),
        config.document.clone(),
    ));
    let app = router(handler, Transport::Plain);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Wayfinder gateway listening on {} (OpenAPI document at {})",
        addr,
        config.openapi_path
    );

    let server_result = {
        let shutdown = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait_for_shutdown_signal().await })
            .await
            .context("Server error")
    };

    if !shutdown.is_shutdown_initiated() {
        shutdown.trigger_shutdown(ShutdownReason::Manual);
    }
    if let Err(e) = watcher_handle.await {
        tracing::warn!("Definition watcher task ended abnormally: {}", e);
    }
    signal_handle.abort();

    server_result?;
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate every definition file in the services directory and exit
fn validate_definitions_command(config: &GatewayConfig) -> Result<()> {
    let dir = Path::new(&config.services_dir);
    println!("🔍 Validating service definitions in: {}", dir.display());

    if !dir.is_dir() {
        eprintln!("❌ Error: Services directory '{}' not found", dir.display());
        std::process::exit(1);
    }

    let source = DirectoryDefinitionSource::new(dir)?;
    let paths = source
        .list_sources()
        .map_err(|e| eyre!("Failed to list definitions: {e}"))?;

    if paths.is_empty() {
        println!("⚠️  No definition files (.yaml, .yml, .json, .toml) found");
        return Ok(());
    }

    let mut failures = 0usize;
    let mut names = std::collections::HashMap::new();
    for path in &paths {
        let file = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match source.read_definition(path) {
            Ok(service) => {
                println!(
                    "✅ {file}: service '{}' -> {} ({} endpoints)",
                    service.name,
                    service.address,
                    service.endpoint_count()
                );
                if let Some(previous) = names.insert(service.name.clone(), file.clone()) {
                    println!(
                        "⚠️  service name '{}' is also declared in {previous}; the last file loaded wins",
                        service.name
                    );
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("❌ {file}: {e}");
            }
        }
    }

    println!();
    if failures > 0 {
        eprintln!("❌ {failures} of {} definition files are invalid", paths.len());
        std::process::exit(1);
    }
    println!("🎉 All {} definition files are valid!", paths.len());
    Ok(())
}

/// Write a sample service definition
async fn init_definition_command(config: &GatewayConfig) -> Result<()> {
    let dir = Path::new(&config.services_dir);
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join("weather.yaml");
    if path.exists() {
        eprintln!("❌ Error: '{}' already exists", path.display());
        std::process::exit(1);
    }

    tokio::fs::write(&path, SAMPLE_DEFINITION)
        .await
        .context("Failed to write sample definition")?;
    println!("✅ Created sample service definition at: {}", path.display());
    println!(
        "   Run 'wayfinder serve --services-dir {}' to start the gateway",
        dir.display()
    );
    Ok(())
}
