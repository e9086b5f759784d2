//! Column-named result sets

use serde_json::Value;

/// Rows returned by one statement, cells kept as JSON values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the column called `column`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Cell rendered as text; strings are returned without JSON quotes
    pub fn get_str(&self, row: usize, column: &str) -> Option<String> {
        self.value(row, column).map(cell_to_string)
    }

    /// Unsigned integer cell. ClickHouse quotes 64-bit integers in JSON
    /// formats, so numeric strings are accepted too.
    pub fn get_u64(&self, row: usize, column: &str) -> Option<u64> {
        match self.value(row, column)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Array-of-strings cell
    pub fn get_str_array(&self, row: usize, column: &str) -> Option<Vec<String>> {
        match self.value(row, column)? {
            Value::Array(items) => Some(items.iter().map(cell_to_string).collect()),
            _ => None,
        }
    }
}

pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RowSet {
        RowSet::new(
            vec!["query_id".into(), "query_duration_ms".into(), "stack".into()],
            vec![vec![json!("abc-123"), json!("42"), json!(["foo", "main"])]],
        )
    }

    #[test]
    fn test_lookup_by_column_name() {
        let rows = sample();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get_str(0, "query_id").as_deref(), Some("abc-123"));
        assert!(rows.get_str(0, "missing").is_none());
        assert!(rows.get_str(1, "query_id").is_none());
    }

    #[test]
    fn test_quoted_u64_is_parsed() {
        let rows = sample();
        assert_eq!(rows.get_u64(0, "query_duration_ms"), Some(42));
        assert_eq!(rows.get_u64(0, "query_id"), None);
    }

    #[test]
    fn test_string_array_cell() {
        let rows = sample();
        assert_eq!(
            rows.get_str_array(0, "stack"),
            Some(vec!["foo".to_string(), "main".to_string()])
        );
        assert!(rows.get_str_array(0, "query_id").is_none());
    }

    #[test]
    fn test_cell_to_string_variants() {
        assert_eq!(cell_to_string(&json!("text")), "text");
        assert_eq!(cell_to_string(&json!(7)), "7");
        assert_eq!(cell_to_string(&Value::Null), "NULL");
    }
}
