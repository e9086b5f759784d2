//! ClickHouse query executor
//!
//! Runs arbitrary statements over the HTTP interface and decodes the
//! `JSONCompact` output into a [`RowSet`]. Typed `Row` structs are not used
//! because the statements are user supplied and their shape is unknown.

use std::time::Instant;

use async_trait::async_trait;
use clickhouse::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{ExecutorError, Feedback, FeedbackLevel, QueryExecutor, RowSet};
use crate::core::config::ClickhouseConfig;

/// Output format requested for every statement
const RESULT_FORMAT: &str = "JSONCompact";

#[derive(Deserialize)]
struct ColumnMeta {
    name: String,
}

#[derive(Deserialize)]
struct JsonCompactBody {
    meta: Vec<ColumnMeta>,
    data: Vec<Vec<Value>>,
}

/// ClickHouse-backed [`QueryExecutor`]
///
/// The clickhouse crate's `Client` keeps an HTTP keep-alive pool, so one
/// executor is shared by every step of a correlation.
pub struct ClickhouseExecutor {
    client: Client,
    feedback: Feedback,
}

impl ClickhouseExecutor {
    /// Build the client and verify the server answers.
    ///
    /// Any failure here is reported as [`ExecutorError::Unavailable`]: nothing
    /// downstream can work without a reachable server.
    pub async fn connect(config: &ClickhouseConfig) -> Result<Self, ExecutorError> {
        if config.url.trim().is_empty() {
            return Err(ExecutorError::unavailable("no ClickHouse URL configured"));
        }

        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.user {
            client = client.with_user(user);
        }
        if let Some(ref password) = config.password {
            client = client.with_password(password);
        }
        if config.compression {
            client = client.with_compression(clickhouse::Compression::Lz4);
        }

        let executor = Self {
            client,
            feedback: Feedback::default(),
        };
        executor.health_check().await.map_err(|e| {
            ExecutorError::unavailable(format!(
                "cannot reach ClickHouse at {}: {}. Verify the server is running and accessible.",
                config.url, e
            ))
        })?;

        tracing::debug!(
            url = %config.url,
            database = %config.database,
            compression = %config.compression,
            "ClickhouseExecutor connected"
        );

        Ok(executor)
    }

    /// Health check - verify connection to ClickHouse
    async fn health_check(&self) -> Result<(), clickhouse::error::Error> {
        self.client.query("SELECT 1").execute().await
    }
}

#[async_trait]
impl QueryExecutor for ClickhouseExecutor {
    async fn execute(&self, sql: &str) -> Result<RowSet, ExecutorError> {
        let started = Instant::now();
        let mut cursor = self
            .client
            .query(&escape_bind_markers(sql))
            .fetch_bytes(RESULT_FORMAT)
            .map_err(map_client_error)?;

        let mut body = Vec::new();
        while let Some(chunk) = cursor.next().await.map_err(map_client_error)? {
            body.extend_from_slice(&chunk);
        }

        let rows = decode_json_compact(&body)?;
        let elapsed_ms = started.elapsed().as_millis();
        match self.feedback.level() {
            FeedbackLevel::Normal => {
                tracing::info!(rows = rows.len(), elapsed_ms, sql, "Statement executed")
            }
            FeedbackLevel::Quiet => {
                tracing::debug!(rows = rows.len(), elapsed_ms, sql, "Statement executed")
            }
        }
        Ok(rows)
    }

    fn feedback(&self) -> &Feedback {
        &self.feedback
    }
}

/// The client treats `?` as a bind placeholder; `??` is a literal `?`.
fn escape_bind_markers(sql: &str) -> String {
    sql.replace('?', "??")
}

fn map_client_error(e: clickhouse::error::Error) -> ExecutorError {
    match e {
        clickhouse::error::Error::BadResponse(message) => ExecutorError::Rejected(message),
        other => ExecutorError::Clickhouse(other),
    }
}

/// Decode a `JSONCompact` body. Statements without output (DDL, INSERT)
/// produce an empty body and an empty row set.
fn decode_json_compact(body: &[u8]) -> Result<RowSet, ExecutorError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RowSet::default());
    }
    let parsed: JsonCompactBody =
        serde_json::from_slice(body).map_err(|e| ExecutorError::Decode(e.to_string()))?;
    let columns = parsed.meta.into_iter().map(|m| m.name).collect();
    Ok(RowSet::new(columns, parsed.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_bind_markers() {
        assert_eq!(escape_bind_markers("SELECT 1"), "SELECT 1");
        assert_eq!(
            escape_bind_markers("SELECT 'is it?' AS q"),
            "SELECT 'is it??' AS q"
        );
    }

    #[test]
    fn test_decode_json_compact() {
        let body = br#"{
            "meta": [{"name": "query_id", "type": "String"}, {"name": "query_duration_ms", "type": "UInt64"}],
            "data": [["abc-123", "42"]],
            "rows": 1,
            "statistics": {"elapsed": 0.001, "rows_read": 1, "bytes_read": 10}
        }"#;
        let rows = decode_json_compact(body).unwrap();
        assert_eq!(rows.columns(), ["query_id", "query_duration_ms"]);
        assert_eq!(rows.rows(), [vec![json!("abc-123"), json!("42")]]);
        assert_eq!(rows.get_u64(0, "query_duration_ms"), Some(42));
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(decode_json_compact(b"").unwrap().is_empty());
        assert!(decode_json_compact(b"\n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = decode_json_compact(b"Code: 62. DB::Exception").unwrap_err();
        assert!(matches!(err, ExecutorError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connect_without_url_is_unavailable() {
        let config = ClickhouseConfig {
            url: String::new(),
            database: "default".to_string(),
            user: None,
            password: None,
            compression: false,
        };
        let err = ClickhouseExecutor::connect(&config).await.err().unwrap();
        assert!(err.is_unavailable());
    }
}
