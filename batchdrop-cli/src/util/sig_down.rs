//! Shutdown signal handling.
//!
//! [`SigDown`] spawns a task that listens for SIGTERM and SIGINT (Ctrl+C on
//! Windows) and cancels a [`CancellationToken`]. The disbursement engine stops
//! submitting new batches once the token is cancelled; batches already in flight
//! run to a terminal state.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token on the first shutdown signal.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn try_new() -> Result<Self, std::io::Error> {
        let inner = CancellationToken::new();
        let outer = inner.clone();
        let task_tracker = TaskTracker::new();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            task_tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::warn!("Received SIGTERM, finishing in-flight batches"),
                    _ = sigint.recv() => tracing::warn!("Received SIGINT, finishing in-flight batches"),
                    () = inner.cancelled() => return,
                }
                inner.cancel();
            });
        }

        #[cfg(windows)]
        {
            task_tracker.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::warn!("Received Ctrl+C, finishing in-flight batches");
                        inner.cancel();
                    }
                    () = inner.cancelled() => {}
                }
            });
        }

        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token: outer,
        })
    }

    /// Returns a clone of the token cancelled on shutdown.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stops listening and waits for the handler task to exit.
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        self.task_tracker.wait().await;
    }
}
