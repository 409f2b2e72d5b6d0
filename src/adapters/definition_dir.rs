use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};

use crate::{
    config::{DefinitionError, is_definition_file, load_service_definition},
    core::service::ServiceDefinition,
    ports::DefinitionSource,
};

/// Definition source backed by one flat directory of yaml/json/toml files.
#[derive(Debug, Clone)]
pub struct DirectoryDefinitionSource {
    root: PathBuf,
}

impl DirectoryDefinitionSource {
    /// Open `dir`, creating it when missing. Paths handed out afterwards are
    /// absolute so they line up with what the file watcher reports.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Failed to create definition directory {}", dir.display()))?;
        let root = std::fs::canonicalize(dir)
            .wrap_err_with(|| format!("Failed to resolve definition directory {}", dir.display()))?;
        Ok(Self { root })
    }

    /// Absolute path for a file name inside the directory.
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

impl DefinitionSource for DirectoryDefinitionSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_sources(&self) -> Result<Vec<PathBuf>, DefinitionError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| DefinitionError::Io {
            path: self.root.clone(),
            source: e,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        dir = %self.root.display(),
                        error = %e,
                        "Skipping unreadable directory entry"
                    );
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && is_definition_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn read_definition(&self, path: &Path) -> Result<ServiceDefinition, DefinitionError> {
        load_service_definition(path)
    }
}
