//! Graceful shutdown signal.
//!
//! Trimmed down from the teacher's `SigDown`: listens for SIGTERM/SIGINT and
//! cancels a [`CancellationToken`] shared with the scanner loop. The
//! HTTP-specific parts of the original (request draining, task tracker for
//! in-flight handlers) have no counterpart here since this engine has no
//! inbound server.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancels its token on the first SIGTERM or SIGINT.
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns a task that waits for SIGTERM/SIGINT and cancels the token.
    pub fn install(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            let mut term = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(err) => {
                    tracing::error!(%err, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut int = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(err) => {
                    tracing::error!(%err, "failed to install SIGINT handler");
                    return;
                }
            };
            tokio::select! {
                _ = term.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = int.recv() => tracing::info!("received SIGINT, shutting down"),
            }
            token.cancel();
        });
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
