//! Keeps the registry in sync with the definition directory.
//!
//! notify delivers raw events on its own thread; they are forwarded over a channel to
//! one tokio task that owns the debounce timers. Writes are coalesced per file with a
//! [`DelayQueue`] entry that is reset on every new event, so a save that touches a
//! file several times triggers a single reload.
use std::{
    collections::HashMap,
    future::poll_fn,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use eyre::{Result, WrapErr};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode, ModifyKind},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::{
    sync::CancellationToken,
    time::{DelayQueue, delay_queue},
};
use tracing::Instrument;

use crate::{
    config::is_definition_file, core::registry::ServiceRegistry,
    tracing_setup::create_watcher_span,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PendingAction {
    Load(PathBuf),
    Rescan,
}

/// Debounce timers keyed by action. Scheduling an action that is already pending
/// pushes its deadline back instead of queueing it twice.
#[derive(Default)]
pub struct PendingActions {
    queue: DelayQueue<PendingAction>,
    keys: HashMap<PendingAction, delay_queue::Key>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, action: PendingAction, delay: Duration) {
        match self.keys.get(&action) {
            Some(key) => self.queue.reset(key, delay),
            None => {
                let key = self.queue.insert(action.clone(), delay);
                self.keys.insert(action, key);
            }
        }
    }

    pub fn cancel(&mut self, action: &PendingAction) -> bool {
        match self.keys.remove(action) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, action: &PendingAction) -> bool {
        self.keys.contains_key(action)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Wait for the next action whose delay has elapsed. Returns `None` when nothing
    /// is pending.
    pub async fn next_expired(&mut self) -> Option<PendingAction> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let action = expired.into_inner();
        self.keys.remove(&action);
        Some(action)
    }
}

pub struct DirectoryWatcher {
    registry: Arc<ServiceRegistry>,
    dir: PathBuf,
    write_settle: Duration,
    rescan_settle: Duration,
}

impl DirectoryWatcher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        write_settle: Duration,
        rescan_settle: Duration,
    ) -> Self {
        let dir = registry.definition_source().root().to_path_buf();
        Self {
            registry,
            dir,
            write_settle,
            rescan_settle,
        }
    }

    /// Install the notify watcher and run the event loop until `cancel` fires.
    /// Failing to install the watcher is a start-up error.
    pub fn spawn(self, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver only goes away when the loop has stopped.
            let _ = tx.send(res);
        })
        .wrap_err("Failed to create file system watcher")?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .wrap_err_with(|| format!("Failed to watch {}", self.dir.display()))?;

        let span = create_watcher_span(&self.dir.display().to_string());
        tracing::info!(parent: &span, "Watching definition directory");

        Ok(tokio::spawn(
            async move { self.run(watcher, rx, cancel).await }.instrument(span),
        ))
    }

    async fn run(
        self,
        _watcher: RecommendedWatcher,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        cancel: CancellationToken,
    ) {
        let mut pending = PendingActions::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Definition watcher stopping");
                    break;
                }
                message = events.recv() => match message {
                    Some(Ok(event)) => self.handle_event(event, &mut pending),
                    Some(Err(e)) => tracing::warn!("File watch error: {}", e),
                    None => {
                        tracing::warn!("File watch channel closed");
                        break;
                    }
                },
                Some(action) = pending.next_expired(), if !pending.is_empty() => {
                    self.dispatch(action).await;
                }
            }
        }
    }

    fn handle_event(&self, event: Event, pending: &mut PendingActions) {
        tracing::trace!(kind = ?event.kind, paths = ?event.paths, "File system event");

        match event.kind {
            EventKind::Create(_)
            | EventKind::Modify(
                ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other,
            )
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                for path in event.paths.into_iter().filter(|p| is_definition_file(p)) {
                    pending.schedule(PendingAction::Load(path), self.write_settle);
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths.iter().filter(|p| is_definition_file(p)) {
                    self.remove_now(path, pending);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in event.paths.into_iter().filter(|p| is_definition_file(p)) {
                    if path.exists() {
                        pending.schedule(PendingAction::Load(path), self.write_settle);
                    } else {
                        self.remove_now(&path, pending);
                    }
                }
                pending.schedule(PendingAction::Rescan, self.rescan_settle);
            }
            _ => {}
        }
    }

    fn remove_now(&self, path: &Path, pending: &mut PendingActions) {
        pending.cancel(&PendingAction::Load(path.to_path_buf()));
        if let Some(service) = self.registry.remove(path) {
            tracing::info!(
                service = %service.name,
                source = %path.display(),
                "Service removed"
            );
        }
    }

    /// Run one registry update off the async workers and wait for it. Events that
    /// arrive meanwhile stay queued, so a removal can never be overtaken by a load
    /// that read the file just before it disappeared.
    async fn dispatch(&self, action: PendingAction) {
        let registry = self.registry.clone();
        let span = tracing::Span::current();

        let job = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            match action {
                PendingAction::Load(path) => match registry.load(&path) {
                    Ok(service) => tracing::info!(
                        service = %service.name,
                        endpoints = service.endpoint_count(),
                        source = %path.display(),
                        "Service loaded"
                    ),
                    Err(e) => tracing::warn!(
                        source = %path.display(),
                        error = %e,
                        "Failed to load service definition"
                    ),
                },
                PendingAction::Rescan => match registry.rescan() {
                    Ok(report) => tracing::info!(
                        loaded = report.loaded.len(),
                        failed = report.failed.len(),
                        removed = ?report.removed,
                        "Definition directory rescanned"
                    ),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to rescan definition directory")
                    }
                },
            }
        });

        if let Err(e) = job.await {
            tracing::error!("Definition update task failed: {}", e);
        }
    }
}
