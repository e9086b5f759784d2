//! Query executor error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Transport or protocol failure reported by the client library
    #[error("ClickHouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),

    /// The server answered but refused the statement (syntax, permissions, ...)
    #[error("Server rejected query: {0}")]
    Rejected(String),

    /// No usable execution backend (not configured or unreachable)
    #[error("Query executor is not available: {0}")]
    Unavailable(String),

    /// The response body could not be turned into a row set
    #[error("Failed to decode result set: {0}")]
    Decode(String),
}

impl ExecutorError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
