//! The live set of services and the route table derived from it.
//!
//! `ServiceRegistry` is the single point of mutation. Definition files are read and
//! validated before the write lock is taken; under the lock only the maps are
//! updated and the [`RouteTable`] is rebuilt from scratch, so a reader sees either
//! the old table or the new one and never a mix.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    config::{DefinitionError, DocumentInfo},
    core::{
        openapi,
        route::{RouteMatch, RouteNotFound, RouteTable},
        service::ServiceDefinition,
    },
    ports::DefinitionSource,
};

#[derive(Debug, Default)]
struct RegistryState {
    services: BTreeMap<String, Arc<ServiceDefinition>>,
    /// Definition file -> name of the service it currently provides.
    sources: HashMap<PathBuf, String>,
    routes: RouteTable,
}

impl RegistryState {
    fn rebuild_routes(&mut self) {
        self.routes = RouteTable::build(self.services.values());
    }

    /// Drop whatever `source` currently provides. Returns the removed service.
    fn detach_source(&mut self, source: &Path) -> Option<Arc<ServiceDefinition>> {
        let name = self.sources.remove(source)?;
        match self.services.get(&name) {
            Some(existing) if existing.source == source => self.services.remove(&name),
            _ => None,
        }
    }
}

/// Outcome of a full directory rescan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RescanReport {
    /// Names of services loaded (or reloaded).
    pub loaded: Vec<String>,
    /// Sources that failed to load, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Names of services dropped because their source disappeared.
    pub removed: Vec<String>,
}

pub struct ServiceRegistry {
    source: Arc<dyn DefinitionSource>,
    state: RwLock<RegistryState>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("root", &self.source.root())
            .field("services", &self.service_names())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new(source: Arc<dyn DefinitionSource>) -> Self {
        Self {
            source,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn definition_source(&self) -> &Arc<dyn DefinitionSource> {
        &self.source
    }

    // A panicking writer cannot leave the maps half-updated (the table is swapped in
    // as the last step), so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read `path` and install the service it declares. On failure the registry is
    /// left untouched, including any service previously loaded from `path`.
    pub fn load(&self, path: &Path) -> Result<Arc<ServiceDefinition>, DefinitionError> {
        let definition = self.source.read_definition(path)?;
        Ok(self.upsert(definition))
    }

    /// Install an already validated definition, keyed by its name and source.
    pub fn upsert(&self, definition: ServiceDefinition) -> Arc<ServiceDefinition> {
        let definition = Arc::new(definition);
        let name = definition.name.clone();
        let source = definition.source.clone();

        let mut state = self.write();

        if let Some(previous) = state.sources.get(&source).cloned()
            && previous != name
        {
            tracing::info!(
                source = %source.display(),
                old = %previous,
                new = %name,
                "Service renamed"
            );
            if state
                .services
                .get(&previous)
                .is_some_and(|s| s.source == source)
            {
                state.services.remove(&previous);
            }
        }

        if let Some(existing) = state.services.get(&name)
            && existing.source != source
        {
            tracing::warn!(
                service = %name,
                previous_source = %existing.source.display(),
                source = %source.display(),
                "Service name claimed by another definition, replacing it"
            );
            let other = existing.source.clone();
            state.sources.remove(&other);
        }

        state.sources.insert(source, name.clone());
        state.services.insert(name, definition.clone());
        state.rebuild_routes();

        tracing::debug!(
            service = %definition.name,
            endpoints = definition.endpoint_count(),
            routes = state.routes.len(),
            "Service registered"
        );
        definition
    }

    /// Forget the service provided by `path`, if any.
    pub fn remove(&self, path: &Path) -> Option<Arc<ServiceDefinition>> {
        let mut state = self.write();
        let removed = state.detach_source(path);
        if removed.is_some() {
            state.rebuild_routes();
        }
        removed
    }

    /// Reload every definition currently present and drop services whose source has
    /// disappeared.
    pub fn rescan(&self) -> Result<RescanReport, DefinitionError> {
        let present = self.source.list_sources()?;
        let mut report = RescanReport::default();

        for path in &present {
            match self.load(path) {
                Ok(service) => report.loaded.push(service.name.clone()),
                Err(e) => {
                    tracing::warn!(
                        source = %path.display(),
                        error = %e,
                        "Skipping service definition"
                    );
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        let present: HashSet<&PathBuf> = present.iter().collect();
        let stale: Vec<PathBuf> = self
            .read()
            .sources
            .keys()
            .filter(|source| !present.contains(source))
            .cloned()
            .collect();

        if !stale.is_empty() {
            let mut state = self.write();
            for source in &stale {
                if let Some(service) = state.detach_source(source) {
                    report.removed.push(service.name.clone());
                }
            }
            state.rebuild_routes();
        }

        Ok(report)
    }

    /// Copy of every active service, ordered by name.
    pub fn snapshot(&self) -> Vec<Arc<ServiceDefinition>> {
        self.read().services.values().cloned().collect()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.read().services.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        self.read().services.get(name).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.read().routes.len()
    }

    pub fn find_route(&self, method: &str, path: &str) -> Result<RouteMatch, RouteNotFound> {
        self.read().routes.find(method, path)
    }

    /// Render the OpenAPI document while holding the read lock for the whole build.
    pub fn describe(&self, info: &DocumentInfo, base_url: &str) -> serde_json::Result<Vec<u8>> {
        let state = self.read();
        openapi::render_document(&state.services, info, base_url)
    }
}
