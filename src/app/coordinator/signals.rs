//! Signal handling for graceful cancellation
//!
//! This module turns system signals (CTRL-C, SIGTERM) into cancellation of a
//! shared [`CancellationToken`], which every in-flight download observes.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Signal handler that cancels a token on CTRL-C or SIGTERM
pub struct SignalHandler {
    token: CancellationToken,
}

impl SignalHandler {
    /// Create a new signal handler for the given token
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Setup signal handling (CTRL-C, SIGTERM)
    ///
    /// Returns a handle to the background task that monitors for signals.
    /// The task also ends, without cancelling, if the token is cancelled by
    /// someone else first.
    pub fn setup(&self) -> JoinHandle<()> {
        let token = self.token.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, cancelling downloads");
                },
                _ = terminate => {
                    info!("Received terminate signal, cancelling downloads");
                },
                _ = token.cancelled() => return,
            }

            token.cancel();
        })
    }
}
