use std::sync::{Arc, Mutex, PoisonError};

use eyre::{Result, WrapErr};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested from inside the process
    Manual,
}

/// Process-wide shutdown switch shared by the server, the watcher and the signal
/// handler.
#[derive(Debug, Clone, Default)]
pub struct GracefulShutdown {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled once shutdown starts. Child tokens let a task be stopped
    /// on its own without stopping everything else.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start shutdown. Only the first reason is kept.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                tracing::warn!("Shutdown already initiated, ignoring {:?}", reason);
                return;
            }
            *slot = Some(reason);
        }
        tracing::info!("Shutdown initiated: {:?}", reason);
        self.token.cancel();
    }

    /// Resolve once shutdown has started, for `with_graceful_shutdown`.
    pub async fn wait_for_shutdown_signal(&self) {
        self.token.cancelled().await;
    }

    /// Listen for SIGINT/SIGTERM until one arrives or shutdown is triggered
    /// some other way.
    pub async fn run_signal_handler(&self) -> Result<()> {
        let terminate = wait_for_sigterm();
        tokio::pin!(terminate);

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                self.trigger_shutdown(ShutdownReason::Interrupt);
            }
            result = &mut terminate => {
                result?;
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                self.trigger_shutdown(ShutdownReason::Terminate);
            }
            _ = self.token.cancelled() => {}
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix systems, we only have Ctrl+C
    std::future::pending::<()>().await;
    Ok(())
}
