//! CPU sampling traces from `system.trace_log`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::ChlensError;
use super::correlate::TagCorrelator;
use super::poller::{LogPoller, PollError};
use super::query::{Query, QueryId, QuerySource};
use crate::data::{QueryExecutor, RowSet};
use crate::utils::sql::quote_literal;

/// How samples are grouped when read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceOrder {
    /// All identical stacks merged, most frequent first
    #[default]
    Aggregated,
    /// Only consecutive identical stacks merged, in time order
    Chronological,
}

/// One distinct call stack, root frame first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSample {
    pub stack: Vec<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub query_id: QueryId,
    pub samples: Vec<StackSample>,
}

impl Trace {
    pub fn total_samples(&self) -> u64 {
        self.samples.iter().map(|s| s.count).sum()
    }
}

pub struct ProfileSampler {
    executor: Arc<dyn QueryExecutor>,
    correlator: TagCorrelator,
    poller: LogPoller,
    sample_period_ns: u64,
}

impl ProfileSampler {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        poller: LogPoller,
        window_margin: Duration,
        sample_period_ns: u64,
    ) -> Self {
        Self {
            correlator: TagCorrelator::new(executor.clone(), poller.clone(), window_margin),
            executor,
            poller,
            sample_period_ns,
        }
    }

    /// Collect the stack samples of `source`.
    ///
    /// A statement is first run with the CPU profiler enabled and correlated
    /// to its query id. The execution must then be visible in
    /// `system.query_log`; an invisible one is [`ChlensError::TraceTimeout`].
    /// `system.trace_log` flushes on its own timer, so samples are polled
    /// with what is left of the budget (at least one interval). Still no
    /// samples after that is [`ChlensError::NoTraceFound`].
    pub async fn sample(&self, source: &QuerySource, order: TraceOrder) -> Result<Trace, ChlensError> {
        let query_id = match source {
            QuerySource::Execution(id) => id.clone(),
            QuerySource::Statement(query) => self.run_profiled(query).await?,
        };

        let started = Instant::now();
        self.wait_for_execution(&query_id).await?;

        let trace_query = Query::new(&trace_sql(&query_id, order))?
            .with_setting("allow_introspection_functions", "1")
            .to_sql();
        let budget = self
            .poller
            .timeout()
            .saturating_sub(started.elapsed())
            .max(self.poller.interval());
        let rows = {
            let feedback = self.executor.feedback().level();
            let _quiet = self.executor.feedback().quiet();
            self.poller
                .clone()
                .with_timeout(budget)
                .with_feedback(feedback)
                .poll(|| self.executor.execute(&trace_query))
                .await
                .map_err(|e| match e {
                    PollError::Timeout { .. } => ChlensError::NoTraceFound {
                        query_id: query_id.to_string(),
                    },
                    PollError::Cancelled { elapsed, .. } => ChlensError::Cancelled {
                        elapsed_ms: elapsed.as_millis(),
                    },
                    PollError::Executor(e) => e.into(),
                })?
        };

        let samples = parse_samples(&rows)?;
        let trace = Trace { query_id, samples };
        tracing::info!(
            query_id = %trace.query_id,
            stacks = trace.samples.len(),
            samples = trace.total_samples(),
            "Collected trace"
        );
        Ok(trace)
    }

    async fn run_profiled(&self, query: &Query) -> Result<QueryId, ChlensError> {
        let profiled = query
            .with_setting(
                "query_profiler_cpu_time_period_ns",
                self.sample_period_ns.to_string(),
            )
            .with_setting("query_profiler_real_time_period_ns", "0");
        let result = self.correlator.correlate(&profiled).await?;
        Ok(result.query_id)
    }

    async fn wait_for_execution(&self, query_id: &QueryId) -> Result<(), ChlensError> {
        let visible = format!(
            "SELECT query_id FROM system.query_log WHERE query_id = {} AND type != 'QueryStart' LIMIT 1",
            quote_literal(query_id.as_str())
        );
        let feedback = self.executor.feedback().level();
        let _quiet = self.executor.feedback().quiet();
        self.poller
            .clone()
            .with_feedback(feedback)
            .poll(|| self.executor.execute(&visible))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                PollError::Timeout { elapsed, .. } => ChlensError::TraceTimeout {
                    query_id: query_id.to_string(),
                    elapsed_ms: elapsed.as_millis(),
                },
                PollError::Cancelled { elapsed, .. } => ChlensError::Cancelled {
                    elapsed_ms: elapsed.as_millis(),
                },
                PollError::Executor(e) => e.into(),
            })
    }
}

fn trace_sql(query_id: &QueryId, order: TraceOrder) -> String {
    let id = quote_literal(query_id.as_str());
    match order {
        TraceOrder::Aggregated => format!(
            "SELECT arrayMap(x -> demangle(addressToSymbol(x)), trace) AS stack, count() AS samples \
             FROM system.trace_log \
             WHERE query_id = {id} AND trace_type = 'CPU' \
             GROUP BY trace \
             ORDER BY samples DESC"
        ),
        // A group ends where the next sample's stack differs; the running
        // count of ended groups numbers the runs.
        TraceOrder::Chronological => format!(
            "SELECT arrayMap(x -> demangle(addressToSymbol(x)), trace) AS stack, count() AS samples \
             FROM ( \
                 SELECT trace, \
                     sum(end_of_group) OVER (ORDER BY event_time_microseconds ASC \
                         ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING) AS grp \
                 FROM ( \
                     SELECT event_time_microseconds, trace, \
                         if(trace != leadInFrame(trace) OVER (ORDER BY event_time_microseconds ASC \
                             ROWS BETWEEN CURRENT ROW AND 1 FOLLOWING), 1, 0) AS end_of_group \
                     FROM system.trace_log \
                     WHERE query_id = {id} AND trace_type = 'CPU' \
                 ) \
             ) \
             GROUP BY grp, trace \
             ORDER BY grp"
        ),
    }
}

/// Rows of `(stack: Array(String) leaf first, samples: UInt64)`
fn parse_samples(rows: &RowSet) -> Result<Vec<StackSample>, ChlensError> {
    (0..rows.len())
        .map(|i| {
            let mut stack = rows
                .get_str_array(i, "stack")
                .ok_or_else(|| ChlensError::MalformedRecord(format!("row {}: missing stack", i)))?;
            let count = rows
                .get_u64(i, "samples")
                .filter(|&c| c > 0)
                .ok_or_else(|| {
                    ChlensError::MalformedRecord(format!("row {}: missing sample count", i))
                })?;
            stack.reverse();
            Ok(StackSample { stack, count })
        })
        .collect()
}
