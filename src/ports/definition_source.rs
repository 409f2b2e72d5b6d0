use std::path::{Path, PathBuf};

use crate::{config::DefinitionError, core::service::ServiceDefinition};

/// Where service definitions come from.
///
/// A source is a flat collection of definition files identified by path. The
/// registry asks it for the current listing during a rescan and reads single
/// files when the watcher reports a change.
pub trait DefinitionSource: Send + Sync + 'static {
    /// Directory (or other root) the definitions live under.
    fn root(&self) -> &Path;

    /// Every definition file currently present, in a stable order.
    fn list_sources(&self) -> Result<Vec<PathBuf>, DefinitionError>;

    /// Read, parse and validate one definition.
    fn read_definition(&self, path: &Path) -> Result<ServiceDefinition, DefinitionError>;
}
