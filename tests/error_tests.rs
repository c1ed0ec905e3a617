// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_advisor::error::{
    config_error, contract_error, executor_error, extract_position, file_read_error, payload_error,
    rule_failure, schema_parse_error, strip_position
};

#[test]
fn test_constructors_produce_messages() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let errors = [
        file_read_error("/path/to/file.sql", io_error),
        schema_parse_error("Expected: ), found: ; at Line: 5, Column: 10"),
        config_error("Unknown dialect: oracle"),
        payload_error("column.required", "missing field `list`"),
        contract_error("empty rule list"),
        rule_failure("naming.table", "invalid regex"),
        executor_error("connection refused")
    ];
    for error in errors {
        assert!(!error.to_string().is_empty());
    }
}

#[test]
fn test_position_helpers() {
    let message = "sql parser error: Expected: an expression, found: EOF at Line: 4, Column: 9";
    let position = extract_position(message).unwrap();
    assert_eq!((position.line, position.column), (4, 9));
    assert!(strip_position(message).ends_with("found: EOF"));
}
