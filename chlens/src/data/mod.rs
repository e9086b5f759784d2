//! Statement execution seam
//!
//! Everything above this module talks to the database through
//! [`QueryExecutor`], which runs one statement and hands back a [`RowSet`].
//! The ClickHouse HTTP backend lives in [`clickhouse`]; tests use an
//! in-memory scripted executor.

pub mod clickhouse;
pub mod error;
mod feedback;
mod rows;
#[cfg(test)]
pub(crate) mod testing;

pub use self::clickhouse::ClickhouseExecutor;
pub use error::ExecutorError;
pub use feedback::{Feedback, FeedbackGuard, FeedbackLevel};
pub use rows::{RowSet, cell_to_string};

use async_trait::async_trait;

/// Executes raw SQL and returns the full result set
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run one statement. Errors keep the backend's own message.
    async fn execute(&self, sql: &str) -> Result<RowSet, ExecutorError>;

    /// Echo level for executed statements
    fn feedback(&self) -> &Feedback;
}
