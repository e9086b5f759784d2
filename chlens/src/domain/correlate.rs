//! Tag-and-poll correlation of a statement with its `system.query_log` record

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::poller::{LogPoller, PollError};
use super::query::{ExecutionWindow, Query, QueryId, Tag};
use super::ChlensError;
use crate::data::{FeedbackLevel, QueryExecutor};
use crate::utils::sql::quote_literal;

/// What the server recorded about one tagged execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationResult {
    pub query_id: QueryId,
    /// Server-side `query_duration_ms`
    pub duration_ms: u64,
}

/// Runs a statement under a fresh [`Tag`] and finds its log record
pub struct TagCorrelator {
    executor: Arc<dyn QueryExecutor>,
    poller: LogPoller,
    window_margin: Duration,
}

impl TagCorrelator {
    pub fn new(executor: Arc<dyn QueryExecutor>, poller: LogPoller, window_margin: Duration) -> Self {
        Self {
            executor,
            poller,
            window_margin,
        }
    }

    /// Execute `query` tagged with a new `log_comment` and return the
    /// matching `query_id`.
    ///
    /// The duration comes from the server's `query_duration_ms` column; the
    /// client-side window is only logged, since it also counts network and
    /// transfer time.
    pub async fn correlate(&self, query: &Query) -> Result<CorrelationResult, ChlensError> {
        let margin = chrono::Duration::from_std(self.window_margin)
            .map_err(|_| self.margin_out_of_range())?;
        let tag = Tag::generate();
        let tagged = query.with_setting("log_comment", quote_literal(tag.as_str()));
        let feedback = self.executor.feedback().level();
        match feedback {
            FeedbackLevel::Normal => tracing::info!(tag = %tag, "Query log_comment"),
            FeedbackLevel::Quiet => tracing::debug!(tag = %tag, "Query log_comment"),
        }

        let start = Utc::now();
        self.executor.execute(&tagged.to_sql()).await?;
        let window = ExecutionWindow::close(start, Utc::now());

        let lookup = self.lookup_sql(&tag, &window, margin)?;
        let poller = self.poller.clone().with_feedback(feedback);
        let rows = {
            let _quiet = self.executor.feedback().quiet();
            poller
                .poll(|| self.executor.execute(&lookup))
                .await
                .map_err(|e| match e {
                    PollError::Timeout { elapsed, .. } => ChlensError::CorrelationTimeout {
                        tag: tag.to_string(),
                        elapsed_ms: elapsed.as_millis(),
                    },
                    PollError::Cancelled { elapsed, .. } => ChlensError::Cancelled {
                        elapsed_ms: elapsed.as_millis(),
                    },
                    PollError::Executor(e) => e.into(),
                })?
        };

        if rows.len() > 1 {
            return Err(ChlensError::AmbiguousCorrelation {
                tag: tag.to_string(),
                matches: rows.len(),
            });
        }

        let raw_id = rows
            .get_str(0, "query_id")
            .ok_or_else(|| ChlensError::MalformedRecord("missing query_id column".into()))?;
        if raw_id.is_empty() {
            return Err(ChlensError::MalformedRecord("empty query_id".into()));
        }
        let query_id = QueryId::from_log(raw_id);
        let duration_ms = rows.get_u64(0, "query_duration_ms").ok_or_else(|| {
            ChlensError::MalformedRecord("missing query_duration_ms column".into())
        })?;

        tracing::debug!(
            query_id = %query_id,
            duration_ms,
            client_elapsed_ms = window.elapsed_ms(),
            "Correlated query log record"
        );

        Ok(CorrelationResult {
            query_id,
            duration_ms,
        })
    }

    /// Finished, initial (not shard-forwarded) executions carrying `tag`.
    /// LIMIT 2 so a duplicate shows up instead of being silently dropped.
    fn lookup_sql(
        &self,
        tag: &Tag,
        window: &ExecutionWindow,
        margin: chrono::Duration,
    ) -> Result<String, ChlensError> {
        let since = window
            .start()
            .checked_sub_signed(margin)
            .ok_or_else(|| self.margin_out_of_range())?
            .timestamp();
        Ok(format!(
            "SELECT query_id, query_duration_ms FROM system.query_log \
             WHERE log_comment = {tag} AND type = 'QueryFinish' AND is_initial_query = 1 \
             AND event_date >= toDate(toDateTime({since})) AND event_time > toDateTime({since}) \
             ORDER BY query_duration_ms DESC LIMIT 2",
            tag = quote_literal(tag.as_str()),
            since = since,
        ))
    }

    fn margin_out_of_range(&self) -> ChlensError {
        ChlensError::validation(format!(
            "window margin of {:?} is out of range",
            self.window_margin
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::{ScriptedExecutor, no_rows, rows};
    use crate::data::{ExecutorError, FeedbackLevel};
    use regex::Regex;
    use serde_json::json;
    use std::collections::HashSet;

    const QUERY_ID: &str = "5f8b3c1e-0c44-4a4e-9d55-6b0a8f2d9e11";

    fn log_record(query_id: &str, duration: u64) -> Vec<serde_json::Value> {
        vec![json!(query_id), json!(duration.to_string())]
    }

    fn correlator(executor: Arc<ScriptedExecutor>) -> TagCorrelator {
        TagCorrelator::new(
            executor,
            LogPoller::new(Duration::from_secs(2), Duration::from_millis(500)),
            Duration::from_secs(86_400),
        )
    }

    fn tag_in(sql: &str) -> String {
        let re = Regex::new(r"log_comment = '([0-9a-f-]{36})'").unwrap();
        re.captures(sql).unwrap()[1].to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlate_select_one() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![rows(
                &["query_id", "query_duration_ms"],
                vec![log_record(QUERY_ID, 42)],
            )],
        ));

        let result = correlator(executor.clone())
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap();

        assert_eq!(result.query_id.as_str(), QUERY_ID);
        assert_eq!(result.duration_ms, 42);

        let executed = executor.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].starts_with("SELECT 1 SETTINGS log_comment = '"));
        let tag = tag_in(&executed[0]);
        assert!(uuid::Uuid::parse_str(&tag).is_ok());
        assert!(executed[1].contains(&format!("log_comment = '{}'", tag)));
        assert!(executed[1].contains("type = 'QueryFinish'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logged_query_id_is_taken_verbatim() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![rows(
                &["query_id", "query_duration_ms"],
                vec![log_record("abc-123", 42)],
            )],
        ));

        let result = correlator(executor)
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap();

        assert_eq!(
            result,
            CorrelationResult {
                query_id: QueryId::from_log("abc-123"),
                duration_ms: 42,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_caller_stays_quiet() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![
                no_rows(&["query_id", "query_duration_ms"]),
                rows(
                    &["query_id", "query_duration_ms"],
                    vec![log_record(QUERY_ID, 3)],
                ),
            ],
        ));
        let correlator = correlator(executor.clone());

        {
            let _silent = executor.feedback().quiet();
            correlator
                .correlate(&Query::new("SELECT 1").unwrap())
                .await
                .unwrap();
            assert_eq!(executor.feedback().level(), FeedbackLevel::Quiet);
        }

        assert!(
            executor
                .executed_with_levels()
                .iter()
                .all(|(_, level)| *level == FeedbackLevel::Quiet)
        );
        assert_eq!(executor.feedback().level(), FeedbackLevel::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_margin_is_rejected() {
        let executor = Arc::new(ScriptedExecutor::new());
        let correlator = TagCorrelator::new(
            executor.clone(),
            LogPoller::new(Duration::from_secs(2), Duration::from_millis(500)),
            Duration::from_secs(u64::MAX),
        );

        let err = correlator
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ChlensError::Validation(_)));
        assert!(executor.executed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_log_flush() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![
                no_rows(&["query_id", "query_duration_ms"]),
                no_rows(&["query_id", "query_duration_ms"]),
                rows(
                    &["query_id", "query_duration_ms"],
                    vec![log_record(QUERY_ID, 7)],
                ),
            ],
        ));

        let result = correlator(executor.clone())
            .correlate(&Query::new("SELECT count() FROM numbers(10)").unwrap())
            .await
            .unwrap();

        assert_eq!(result.duration_ms, 7);
        assert_eq!(executor.count_matching("system.query_log"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_quietly_and_restores_feedback() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![rows(
                &["query_id", "query_duration_ms"],
                vec![log_record(QUERY_ID, 1)],
            )],
        ));

        correlator(executor.clone())
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap();

        let levels = executor.executed_with_levels();
        assert_eq!(levels[0].1, FeedbackLevel::Normal);
        assert_eq!(levels[1].1, FeedbackLevel::Quiet);
        assert_eq!(executor.feedback().level(), FeedbackLevel::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_names_tag_and_restores_feedback() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("system.query_log", vec![no_rows(&["query_id", "query_duration_ms"])]),
        );

        let err = correlator(executor.clone())
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap_err();

        let tag = tag_in(&executor.executed()[0]);
        match err {
            ChlensError::CorrelationTimeout { tag: t, elapsed_ms } => {
                assert_eq!(t, tag);
                assert!(elapsed_ms >= 2000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(executor.feedback().level(), FeedbackLevel::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_records_are_ambiguous() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![rows(
                &["query_id", "query_duration_ms"],
                vec![log_record(QUERY_ID, 5), log_record(QUERY_ID, 3)],
            )],
        ));

        let err = correlator(executor)
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ChlensError::AmbiguousCorrelation { matches: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_lookup_propagates_unchanged() {
        let executor = Arc::new(
            ScriptedExecutor::new().reject("system.query_log", "Code: 497. Not enough privileges"),
        );

        let err = correlator(executor.clone())
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap_err();

        match err {
            ChlensError::Backend(ExecutorError::Rejected(msg)) => {
                assert_eq!(msg, "Code: 497. Not enough privileges")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(executor.feedback().level(), FeedbackLevel::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_statement_skips_lookup() {
        let executor =
            Arc::new(ScriptedExecutor::new().reject("numbers", "Code: 62. Syntax error"));

        let err = correlator(executor.clone())
            .correlate(&Query::new("SELECT * FROM numbers(").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ChlensError::Backend(_)));
        assert_eq!(executor.count_matching("system.query_log"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_window_uses_margin() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![rows(
                &["query_id", "query_duration_ms"],
                vec![log_record(QUERY_ID, 1)],
            )],
        ));
        let before = Utc::now().timestamp();

        correlator(executor.clone())
            .correlate(&Query::new("SELECT 1").unwrap())
            .await
            .unwrap();

        let lookup = &executor.executed()[1];
        let re = Regex::new(r"event_time > toDateTime\((\d+)\)").unwrap();
        let since: i64 = re.captures(lookup).unwrap()[1].parse().unwrap();
        assert!(since <= before - 86_400 + 1);
        assert!(since >= before - 86_400 - 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_correlation_uses_a_fresh_tag() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "system.query_log",
            vec![rows(
                &["query_id", "query_duration_ms"],
                vec![log_record(QUERY_ID, 1)],
            )],
        ));
        let correlator = correlator(executor.clone());
        let query = Query::new("SELECT 1").unwrap();

        for _ in 0..20 {
            correlator.correlate(&query).await.unwrap();
        }

        let tags: HashSet<String> = executor
            .executed()
            .iter()
            .filter(|sql| sql.starts_with("SELECT 1 SETTINGS"))
            .map(|sql| tag_in(sql))
            .collect();
        assert_eq!(tags.len(), 20);
    }
}
