//! SQL text helpers

use std::sync::OnceLock;

use regex::Regex;

/// Escape a value for use inside a single-quoted ClickHouse string literal
///
/// # Example
///
/// ```
/// use chlens::utils::sql::escape_literal;
///
/// assert_eq!(escape_literal(r"it's C:\tmp"), r"it\'s C:\\tmp");
/// ```
pub fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Quote a value as a ClickHouse string literal
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", escape_literal(s))
}

/// Strip surrounding whitespace and trailing `;` so clauses can be appended
pub fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Drop a trailing `FORMAT <name>` clause.
///
/// Statements sent over HTTP are logged with the output format the client
/// appended, which cannot be followed by further clauses.
pub fn strip_format_clause(sql: &str) -> &str {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\s+FORMAT\s+\w+\s*;?\s*$").expect("Invalid regex"));
    match re.find(sql) {
        Some(m) => &sql[..m.start()],
        None => sql,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal_plain() {
        assert_eq!(escape_literal("hello"), "hello");
    }

    #[test]
    fn test_escape_literal_quote_and_backslash() {
        assert_eq!(escape_literal("a'b\\c"), "a\\'b\\\\c");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("o'clock"), "'o\\'clock'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_trim_statement() {
        assert_eq!(trim_statement("  SELECT 1;  \n"), "SELECT 1");
        assert_eq!(trim_statement("SELECT 1 ;;"), "SELECT 1");
        assert_eq!(trim_statement("SELECT ';'"), "SELECT ';'");
        assert_eq!(trim_statement(""), "");
    }

    #[test]
    fn test_strip_format_clause() {
        assert_eq!(
            strip_format_clause("SELECT 1 SETTINGS log_comment = 'x' FORMAT JSONCompact"),
            "SELECT 1 SETTINGS log_comment = 'x'"
        );
        assert_eq!(strip_format_clause("SELECT 1\nformat TSV;\n"), "SELECT 1");
        assert_eq!(strip_format_clause("SELECT 1"), "SELECT 1");
        assert_eq!(
            strip_format_clause("SELECT 'FORMAT JSON' AS f"),
            "SELECT 'FORMAT JSON' AS f"
        );
    }
}
