//! Correlation engine and telemetry retrieval
//!
//! Statements are tagged through `log_comment`, executed, and matched back
//! to their `system.query_log` record. On top of that sit the pipeline graph
//! and CPU profile retrieval and the built-in diagnostic queries.

pub mod common_queries;
pub mod correlate;
pub mod error;
pub mod flamegraph;
pub mod pipeline;
pub mod poller;
pub mod profile;
pub mod query;

pub use common_queries::{COMMON_QUERIES, CommonQuery, CommonQueryParams};
pub use correlate::{CorrelationResult, TagCorrelator};
pub use error::ChlensError;
pub use flamegraph::{FlamegraphArtifacts, FlamegraphWriter};
pub use pipeline::{PipelineGraph, PipelineGraphFetcher};
pub use poller::{LogPoller, PollError};
pub use profile::{ProfileSampler, StackSample, Trace, TraceOrder};
pub use query::{ExecutionWindow, Query, QueryId, QuerySource, Tag, inject_setting};
