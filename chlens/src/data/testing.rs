//! Scripted in-memory executor for engine tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{ExecutorError, Feedback, FeedbackLevel, QueryExecutor, RowSet};

type Reply = Result<RowSet, String>;

struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

/// Answers statements by substring match, in registration order.
///
/// Each rule pops its replies in turn and repeats the last one forever.
/// Unmatched statements get an empty row set. Every executed statement is
/// recorded together with the feedback level it ran under.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    executed: Mutex<Vec<(String, FeedbackLevel)>>,
    feedback: Feedback,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `replies` (in order) to statements containing `needle`
    pub fn on(self, needle: &str, replies: Vec<RowSet>) -> Self {
        self.push_rule(needle, replies.into_iter().map(Ok).collect())
    }

    /// Reject statements containing `needle` with a server error
    pub fn reject(self, needle: &str, message: &str) -> Self {
        self.push_rule(needle, VecDeque::from([Err(message.to_string())]))
    }

    fn push_rule(self, needle: &str, replies: VecDeque<Reply>) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push(Rule {
                needle: needle.to_string(),
                replies,
            });
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn executed_with_levels(&self) -> Vec<(String, FeedbackLevel)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.executed()
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> Result<RowSet, ExecutorError> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), self.feedback.level()));

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| sql.contains(&r.needle)) else {
            return Ok(RowSet::default());
        };
        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        };
        match reply {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(ExecutorError::Rejected(message)),
            None => Ok(RowSet::default()),
        }
    }

    fn feedback(&self) -> &Feedback {
        &self.feedback
    }
}

/// Build a row set from column names and JSON rows
pub fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> RowSet {
    RowSet::new(columns.iter().map(|c| c.to_string()).collect(), data)
}

/// Empty row set with the given columns
pub fn no_rows(columns: &[&str]) -> RowSet {
    rows(columns, Vec::new())
}
