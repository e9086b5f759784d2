//! Ctrl+C / SIGTERM handling for commands and long-running polls

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Cancels the running command and in-flight log polling when the process
/// is asked to stop
#[derive(Clone, Default)]
pub struct ShutdownService {
    token: CancellationToken,
}

impl ShutdownService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to pollers; cancelled on the first signal
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger cancellation
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was triggered
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `work` to completion unless cancellation comes first.
    ///
    /// The signal handlers replace the default Ctrl+C behaviour, so every
    /// command runs under this to stay interruptible. `None` means `work`
    /// was dropped unfinished.
    pub async fn run_until_cancelled<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            output = work => Some(output),
        }
    }

    /// Install OS signal handlers and auto-trigger on Ctrl+C/SIGTERM
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::debug!("Received Ctrl+C, cancelling"),
                _ = terminate => tracing::debug!("Received SIGTERM, cancelling"),
            }

            service.trigger();
        });
    }
}
