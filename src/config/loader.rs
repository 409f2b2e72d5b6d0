use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};
use thiserror::Error;

use crate::{
    config::{
        models::{GatewayConfig, ServiceDocument},
        validation::{ServiceDefinitionValidator, ValidationError},
    },
    core::service::ServiceDefinition,
};

/// Prefix for environment overrides, e.g. `WAYFINDER_LISTEN_ADDR`.
pub const ENV_PREFIX: &str = "WAYFINDER";

/// Why one definition source could not be turned into a service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid service definition {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    #[error("{} is not a service definition file", path.display())]
    UnsupportedFormat { path: PathBuf },
}

impl DefinitionError {
    pub fn path(&self) -> &Path {
        match self {
            DefinitionError::Io { path, .. }
            | DefinitionError::Parse { path, .. }
            | DefinitionError::Invalid { path, .. }
            | DefinitionError::UnsupportedFormat { path } => path,
        }
    }
}

/// Map a file extension to the format used to parse it.
pub fn definition_format(path: &Path) -> Option<FileFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "yaml" | "yml" => Some(FileFormat::Yaml),
        "json" => Some(FileFormat::Json),
        "toml" => Some(FileFormat::Toml),
        _ => None,
    }
}

/// Whether `path` looks like a service definition (by extension only).
pub fn is_definition_file(path: &Path) -> bool {
    definition_format(path).is_some()
}

/// Parse definition content without touching the file system.
pub fn parse_service_definition(
    content: &str,
    format: FileFormat,
    source: &Path,
) -> Result<ServiceDefinition, DefinitionError> {
    let document: ServiceDocument = Config::builder()
        .add_source(File::from_str(content, format))
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|source_err| DefinitionError::Parse {
            path: source.to_path_buf(),
            source: source_err,
        })?;

    ServiceDefinitionValidator::validate(document, source).map_err(|e| DefinitionError::Invalid {
        path: source.to_path_buf(),
        source: e,
    })
}

/// Read, parse and validate one definition file.
pub fn load_service_definition(path: &Path) -> Result<ServiceDefinition, DefinitionError> {
    let format = definition_format(path).ok_or_else(|| DefinitionError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let metadata = std::fs::metadata(path).map_err(|e| DefinitionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if metadata.is_dir() {
        return Err(DefinitionError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_service_definition(&content, format, path)
}

/// Load gateway settings: defaults, then the optional file, then `WAYFINDER_*`
/// environment variables.
pub fn load_gateway_config(config_path: Option<&str>) -> Result<GatewayConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        let format = definition_format(path).unwrap_or(FileFormat::Toml);
        builder = builder.add_source(File::new(config_path, format).required(true));
    }

    let settings = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(false))
        .build()
        .with_context(|| format!("Failed to build gateway config from {config_path:?}"))?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize gateway config from {config_path:?}"))?;

    Ok(gateway_config)
}
