//! Built-in diagnostic queries over the system tables

use std::sync::OnceLock;

use chrono::Local;
use regex::{Captures, Regex};

use super::ChlensError;
use super::query::Query;
use crate::core::constants::DEFAULT_CLICKHOUSE_USER;
use crate::utils::sql::escape_literal;

/// A named statement template with `{param}` placeholders.
///
/// Placeholders always sit inside single quotes in the template; values are
/// escaped as string literal content.
#[derive(Debug)]
pub struct CommonQuery {
    pub name: &'static str,
    pub description: &'static str,
    template: &'static str,
    pub default_limit: Option<u64>,
}

pub const COMMON_QUERIES: &[CommonQuery] = &[
    CommonQuery {
        name: "tablesize",
        description: "Compressed and uncompressed size of active parts per table",
        template: "SELECT
    database,
    table,
    formatReadableSize(sum(data_compressed_bytes) AS size) AS compressed,
    formatReadableSize(sum(data_uncompressed_bytes) AS usize) AS uncompressed,
    round(usize / size, 2) AS compr_rate,
    sum(rows) AS rows,
    count() AS part_count,
    round(usize / rows) AS uncompressed_row_size
FROM system.parts
WHERE (active = 1) AND (database LIKE '{database}') AND (table LIKE '{table}')
GROUP BY
    database,
    table
ORDER BY size DESC",
        default_limit: None,
    },
    CommonQuery {
        name: "columnsize",
        description: "Compressed and uncompressed size of active parts per column",
        template: "SELECT
    database,
    table,
    column,
    formatReadableSize(sum(column_data_compressed_bytes) AS size) AS compressed,
    formatReadableSize(sum(column_data_uncompressed_bytes) AS usize) AS uncompressed,
    round(usize / size, 2) AS compr_ratio,
    sum(rows) AS rows_cnt,
    round(usize / rows_cnt, 2) AS avg_row_size
FROM system.parts_columns
WHERE (active = 1) AND (database LIKE '{database}') AND (table LIKE '{table}') AND (column LIKE '{column}')
GROUP BY
    database,
    table,
    column
ORDER BY size DESC",
        default_limit: None,
    },
    CommonQuery {
        name: "myrecentqueries",
        description: "Latest query log events of a user",
        template: "SELECT
    event_time,
    type,
    query_duration_ms,
    query
FROM system.query_log
WHERE user = '{user}'
ORDER BY event_time_microseconds DESC",
        default_limit: Some(10),
    },
    CommonQuery {
        name: "recentslowqueries",
        description: "Slowest queries since a point in time",
        template: "SELECT
    event_time,
    user,
    type,
    query_duration_ms,
    query
FROM system.query_log
WHERE event_time >= toDateTime('{since}')
ORDER BY query_duration_ms DESC",
        default_limit: Some(10),
    },
];

/// Values for template placeholders. Unset values fall back to defaults:
/// `%` for LIKE patterns, the configured user, 24 hours ago for `since`.
#[derive(Debug, Clone, Default)]
pub struct CommonQueryParams {
    pub database: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub user: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u64>,
}

impl CommonQueryParams {
    fn value(&self, name: &str) -> Option<String> {
        let pattern = |v: &Option<String>| Some(v.clone().unwrap_or_else(|| "%".to_string()));
        match name {
            "database" => pattern(&self.database),
            "table" => pattern(&self.table),
            "column" => pattern(&self.column),
            "user" => Some(
                self.user
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLICKHOUSE_USER.to_string()),
            ),
            "since" => Some(self.since.clone().unwrap_or_else(|| {
                (Local::now() - chrono::Duration::hours(24))
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })),
            _ => None,
        }
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("Invalid regex"))
}

pub fn find(name: &str) -> Result<&'static CommonQuery, ChlensError> {
    COMMON_QUERIES
        .iter()
        .find(|q| q.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| {
            let known: Vec<_> = COMMON_QUERIES.iter().map(|q| q.name).collect();
            ChlensError::validation(format!(
                "unknown common query '{}', expected one of: {}",
                name,
                known.join(", ")
            ))
        })
}

impl CommonQuery {
    /// Fill the placeholders and append the row limit, if any
    pub fn render(&self, params: &CommonQueryParams) -> Result<Query, ChlensError> {
        if let Some(missing) = placeholder_re()
            .captures_iter(self.template)
            .map(|c| c[1].to_string())
            .find(|name| params.value(name).is_none())
        {
            return Err(ChlensError::validation(format!(
                "no value for parameter '{}' of '{}'",
                missing, self.name
            )));
        }

        let mut sql = placeholder_re()
            .replace_all(self.template, |c: &Captures| {
                escape_literal(&params.value(&c[1]).unwrap_or_default())
            })
            .into_owned();

        if let Some(limit) = params.limit.or(self.default_limit) {
            sql.push_str(&format!("\nLIMIT {}", limit));
        }
        Query::new(&sql)
    }
}
