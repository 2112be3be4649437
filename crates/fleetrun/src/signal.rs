//! Interrupt handling
//!
//! The first SIGINT or SIGTERM cancels the run; later ones are only logged so
//! hosts still get to close their sessions.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Spawn a task that cancels `cancel` on SIGINT or SIGTERM
pub fn spawn_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!(error = %e, "can't install SIGTERM handler");
                return;
            }
        };

        loop {
            #[cfg(unix)]
            let name = tokio::select! {
                res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
                _ = term.recv() => Ok("SIGTERM"),
            };
            #[cfg(not(unix))]
            let name = tokio::signal::ctrl_c().await.map(|()| "SIGINT");

            match name {
                Ok(name) if cancel.is_cancelled() => {
                    warn!(signal = name, "already canceling, waiting for hosts to stop");
                }
                Ok(name) => {
                    warn!(signal = name, "interrupted, canceling run");
                    cancel.cancel();
                }
                Err(e) => {
                    error!(error = %e, "signal listener failed");
                    return;
                }
            }
        }
    });
}
