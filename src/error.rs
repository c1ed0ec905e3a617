pub use masterror::{AppError, AppResult};

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create schema parse error with optional position info
pub fn schema_parse_error(message: impl Into<String>) -> AppError {
    let msg = message.into();
    AppError::bad_request(format_sql_error("Schema parse error", &msg))
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create error for a rule payload that does not match the rule's payload
/// kind
pub fn payload_error(rule: &str, message: impl std::fmt::Display) -> AppError {
    AppError::bad_request(format!("Invalid payload for rule '{}': {}", rule, message))
}

/// Create error for input that violates the review contract
pub fn contract_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create error raised by a rule callback
pub fn rule_failure(rule: &str, message: impl std::fmt::Display) -> AppError {
    AppError::internal(format!("Rule '{}' failed: {}", rule, message))
}

/// Create error reported by a query executor
pub fn executor_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Line and column reported by the SQL parser, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlPosition {
    pub line:   u64,
    pub column: u64
}

/// Format SQL error with position highlighting
fn format_sql_error(prefix: &str, message: &str) -> String {
    if let Some(pos) = extract_position(message) {
        format!(
            "{} at line {}, column {}:\n  {}",
            prefix, pos.line, pos.column, message
        )
    } else {
        format!("{}:\n  {}", prefix, message)
    }
}

/// Extract the position sqlparser appends to its messages
/// (`"... at Line: X, Column: Y"`).
pub fn extract_position(message: &str) -> Option<SqlPosition> {
    let line_marker = "Line: ";
    let col_marker = ", Column: ";

    let line_start = message.rfind(line_marker)?;
    let line_num_start = line_start + line_marker.len();
    let col_start = message[line_num_start..].find(col_marker)?;
    let line_str = &message[line_num_start..line_num_start + col_start];
    let col_num_start = line_num_start + col_start + col_marker.len();

    let col_end = message[col_num_start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(message.len() - col_num_start);
    let col_str = &message[col_num_start..col_num_start + col_end];

    match (line_str.parse(), col_str.parse()) {
        (Ok(line), Ok(column)) => Some(SqlPosition { line, column }),
        _ => None
    }
}

/// Strip the trailing position from a sqlparser message.
pub fn strip_position(message: &str) -> &str {
    match message.rfind(" at Line: ") {
        Some(idx) => &message[..idx],
        None => message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_position() {
        let pos =
            extract_position("sql parser error: Expected: ), found: ; at Line: 3, Column: 17");
        assert_eq!(pos, Some(SqlPosition { line: 3, column: 17 }));
    }

    #[test]
    fn test_extract_position_missing() {
        assert_eq!(extract_position("recursion limit exceeded"), None);
    }

    #[test]
    fn test_strip_position() {
        assert_eq!(
            strip_position("Expected: an expression, found: EOF at Line: 1, Column: 7"),
            "Expected: an expression, found: EOF"
        );
        assert_eq!(strip_position("plain"), "plain");
    }

    #[test]
    fn test_format_sql_error_mentions_line() {
        let msg = format_sql_error("Schema parse error", "bad token at Line: 2, Column: 5");
        assert!(msg.starts_with("Schema parse error at line 2, column 5"));
    }
}
