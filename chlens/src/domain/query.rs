//! Statements, settings clauses and identifiers

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ChlensError;
use crate::utils::sql::trim_statement;

/// Append `setting` to the statement's SETTINGS clause, creating the clause
/// if the statement has none.
///
/// Detection lower-cases the text, turns line breaks into spaces and looks
/// for the bare word `settings`. A statement mentioning that word elsewhere,
/// e.g. `SELECT 'no settings here'`, is taken to already have a clause and
/// gets `, <setting>` appended, which the server will reject.
pub fn inject_setting(query: &str, setting: &str) -> String {
    let normalized = query.replace(['\r', '\n'], " ").to_lowercase();
    if normalized.contains(" settings ") {
        format!("{}, {}", query, setting)
    } else {
        format!("{} SETTINGS {}", query, setting)
    }
}

/// Statement text plus settings to merge in before execution.
///
/// Adding a setting returns a new `Query`; the text itself is never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    settings: Vec<(String, String)>,
}

impl Query {
    /// Trailing `;` is dropped so clauses can be appended.
    pub fn new(text: &str) -> Result<Self, ChlensError> {
        let text = trim_statement(text);
        if text.is_empty() {
            return Err(ChlensError::validation("empty statement"));
        }
        Ok(Self {
            text: text.to_string(),
            settings: Vec::new(),
        })
    }

    /// `value` is inserted verbatim; quote string values first.
    pub fn with_setting(&self, name: &str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.settings.push((name.to_string(), value.into()));
        next
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Final SQL with every setting injected in insertion order
    pub fn to_sql(&self) -> String {
        self.settings
            .iter()
            .fold(self.text.clone(), |sql, (name, value)| {
                inject_setting(&sql, &format!("{} = {}", name, value))
            })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Unique marker written to `log_comment` so a statement's log record can
/// be found again. One per correlation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side execution identifier.
///
/// Ids typed by the user go through [`QueryId::parse`] and must be UUIDs.
/// Ids read back from the log are opaque: clients may pick their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryId(String);

impl QueryId {
    /// Id as recorded in `system.query_log`, taken verbatim
    pub fn from_log(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn parse(raw: &str) -> Result<Self, ChlensError> {
        let raw = raw.trim();
        Uuid::parse_str(raw)
            .map(|_| Self(raw.to_string()))
            .map_err(|e| ChlensError::validation(format!("'{}' is not a valid query_id: {}", raw, e)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either a statement to run now or a past execution to inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    Statement(Query),
    Execution(QueryId),
}

impl QuerySource {
    /// A query id wins over statement text; it is validated here, before any
    /// statement is issued.
    pub fn resolve(query_id: Option<&str>, text: Option<&str>) -> Result<Self, ChlensError> {
        match (query_id, text) {
            (Some(id), _) => QueryId::parse(id).map(Self::Execution),
            (None, Some(text)) => Query::new(text).map(Self::Statement),
            (None, None) => Err(ChlensError::validation(
                "either a statement or a query_id is required",
            )),
        }
    }
}

/// Wall-clock bracket around one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionWindow {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl ExecutionWindow {
    /// Close a window opened at `start`. A clock that stepped backwards
    /// yields a zero-length window rather than a negative one.
    pub fn close(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self {
            start,
            stop: stop.max(start),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    pub fn elapsed_ms(&self) -> u64 {
        (self.stop - self.start).num_milliseconds().max(0) as u64
    }
}
