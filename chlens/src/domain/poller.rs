//! Bounded polling of the server's log tables
//!
//! `system.query_log` and `system.trace_log` are flushed asynchronously
//! (every few seconds by default), so a record for a statement that just
//! finished may not be visible yet. The poller re-runs a read-only lookup
//! until it returns rows or the deadline passes.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::data::{ExecutorError, FeedbackLevel, RowSet};

#[derive(Error, Debug)]
pub enum PollError {
    #[error("no rows after {attempts} lookups in {elapsed:?}")]
    Timeout { elapsed: Duration, attempts: u32 },

    #[error("cancelled after {attempts} lookups in {elapsed:?}")]
    Cancelled { elapsed: Duration, attempts: u32 },

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Sequential lookup loop: at most one statement in flight at a time
#[derive(Debug, Clone)]
pub struct LogPoller {
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
    feedback: FeedbackLevel,
}

impl LogPoller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            cancel: CancellationToken::new(),
            feedback: FeedbackLevel::Normal,
        }
    }

    /// Same poller with a different overall budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Progress messages go to info under `Normal`, debug under `Quiet`
    pub fn with_feedback(mut self, level: FeedbackLevel) -> Self {
        self.feedback = level;
        self
    }

    /// Abort waiting as soon as `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn feedback(&self) -> FeedbackLevel {
        self.feedback
    }

    /// Run `lookup` until it yields at least one row.
    ///
    /// The first lookup runs immediately. Both the lookups and the sleeps
    /// between them are cut short at the deadline and on cancellation, so the
    /// call never outlives `timeout` even when the server stalls. Executor
    /// errors end the loop at once.
    pub async fn poll<F, Fut>(&self, mut lookup: F) -> Result<RowSet, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RowSet, ExecutorError>>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let rows = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled {
                        elapsed: started.elapsed(),
                        attempts,
                    });
                }
                rows = lookup() => rows?,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(attempts, "Log lookup still running at deadline");
                    return Err(PollError::Timeout {
                        elapsed: started.elapsed(),
                        attempts,
                    });
                }
            };
            if !rows.is_empty() {
                if attempts > 1 {
                    tracing::debug!(
                        attempts,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Log record appeared"
                    );
                }
                return Ok(rows);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PollError::Timeout {
                    elapsed: now - started,
                    attempts,
                });
            }
            if attempts == 1 {
                let timeout_ms = self.timeout.as_millis();
                match self.feedback {
                    FeedbackLevel::Normal => {
                        tracing::info!(timeout_ms, "Waiting for record to appear in the log...")
                    }
                    FeedbackLevel::Quiet => {
                        tracing::debug!(timeout_ms, "Waiting for record to appear in the log...")
                    }
                }
            }

            let delay = self.interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled {
                        elapsed: started.elapsed(),
                        attempts,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
