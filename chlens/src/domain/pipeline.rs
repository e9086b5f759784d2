//! EXPLAIN PIPELINE graphs

use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::ChlensError;
use super::query::{Query, QueryId, QuerySource};
use crate::data::{QueryExecutor, cell_to_string};
use crate::utils::sql::{quote_literal, strip_format_clause, trim_statement};

/// Characters left as-is in the viewer fragment
const FRAGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// DOT text of one statement's execution pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineGraph {
    dot: String,
}

impl PipelineGraph {
    pub fn dot(&self) -> &str {
        &self.dot
    }

    /// Link that opens the graph in a web Graphviz viewer
    pub fn viewer_url(&self, base: &str) -> String {
        format!("{}{}", base, utf8_percent_encode(&self.dot, FRAGMENT))
    }
}

pub struct PipelineGraphFetcher {
    executor: Arc<dyn QueryExecutor>,
}

impl PipelineGraphFetcher {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn fetch(&self, source: &QuerySource, compact: bool) -> Result<PipelineGraph, ChlensError> {
        let query = match source {
            QuerySource::Statement(query) => query.clone(),
            QuerySource::Execution(query_id) => self.logged_statement(query_id).await?,
        };

        let explain = Query::new(&format!(
            "EXPLAIN PIPELINE graph = 1, compact = {} {}",
            u8::from(compact),
            query.to_sql()
        ))?
        .with_setting("allow_experimental_analyzer", "1");

        let rows = self.executor.execute(&explain.to_sql()).await?;
        let dot = rows
            .rows()
            .iter()
            .filter_map(|row| row.first())
            .map(cell_to_string)
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!(lines = rows.len(), "Fetched pipeline graph");
        Ok(PipelineGraph { dot })
    }

    /// Original text of a past execution
    async fn logged_statement(&self, query_id: &QueryId) -> Result<Query, ChlensError> {
        let sql = format!(
            "SELECT query FROM system.query_log WHERE query_id = {} AND type = 'QueryStart' LIMIT 2",
            quote_literal(query_id.as_str())
        );
        let rows = self.executor.execute(&sql).await?;

        match rows.len() {
            0 => Err(ChlensError::QueryNotFound {
                query_id: query_id.to_string(),
            }),
            1 => {
                let text = rows.get_str(0, "query").ok_or_else(|| {
                    ChlensError::MalformedRecord("missing query column".into())
                })?;
                tracing::info!(query_id = %query_id, query = %text, "Found logged statement");
                Query::new(strip_format_clause(trim_statement(&text)))
            }
            n => Err(ChlensError::AmbiguousQueryId {
                query_id: query_id.to_string(),
                matches: n,
            }),
        }
    }
}
