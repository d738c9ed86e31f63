//! Termination signals shared by the API and worker processes.

use std::io;

/// SIGINT, plus SIGTERM on Unix.
///
/// The SIGTERM handler is registered by [`ShutdownSignal::install`], so a
/// signal delivered before [`ShutdownSignal::recv`] is polled still counts.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            )?,
        })
    }

    /// Wait for the first termination signal.
    pub async fn recv(self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = {
            let mut terminate = self.terminate;
            async move {
                terminate.recv().await;
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {
                tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
            }
            () = terminate => {
                tracing::info!("Received SIGTERM, starting graceful shutdown");
            }
        }
    }
}
