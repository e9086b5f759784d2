//! Correlation and telemetry error types

use std::path::PathBuf;

use thiserror::Error;

use crate::data::ExecutorError;

#[derive(Error, Debug)]
pub enum ChlensError {
    /// No execution backend; nothing was attempted
    #[error("Query executor unavailable: {0}")]
    DependencyUnavailable(String),

    /// Bad input caught before any statement was issued
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(
        "Timed out after {elapsed_ms} ms waiting for tag '{tag}' to appear in system.query_log"
    )]
    CorrelationTimeout { tag: String, elapsed_ms: u128 },

    #[error("Tag '{tag}' matched {matches} records in system.query_log, expected exactly one")]
    AmbiguousCorrelation { tag: String, matches: usize },

    #[error(
        "Timed out after {elapsed_ms} ms waiting for query '{query_id}' to appear in system.query_log"
    )]
    TraceTimeout { query_id: String, elapsed_ms: u128 },

    #[error("Query with id '{query_id}' not found in system.query_log")]
    QueryNotFound { query_id: String },

    #[error("Query id '{query_id}' matched {matches} records in system.query_log")]
    AmbiguousQueryId { query_id: String, matches: usize },

    #[error("No trace samples found in system.trace_log for query '{query_id}'")]
    NoTraceFound { query_id: String },

    #[error("Unexpected log record: {0}")]
    MalformedRecord(String),

    #[error("Flamegraph rendering failed: {reason}. Folded stacks kept at {}", .data_path.display())]
    Render { data_path: PathBuf, reason: String },

    #[error("Cancelled after {elapsed_ms} ms")]
    Cancelled { elapsed_ms: u128 },

    /// Backend failure, passed through as reported
    #[error(transparent)]
    Backend(ExecutorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecutorError> for ChlensError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Unavailable(reason) => Self::DependencyUnavailable(reason),
            other => Self::Backend(other),
        }
    }
}

impl ChlensError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Timeouts are the only errors worth retrying with a longer window
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::CorrelationTimeout { .. } | Self::TraceTimeout { .. }
        )
    }
}
