use sql_advisor::query::{RoutineKind, SqlDialect, SqlTree, parse_script};

#[test]
fn test_statements_carry_base_lines() {
    let sql = "SELECT 1;\n\n-- comment\nSELECT 2;\nSELECT 3; SELECT 4;";
    let statements = parse_script(sql, SqlDialect::MySQL).unwrap();
    let lines: Vec<u64> = statements.iter().map(|s| s.base_line).collect();
    assert_eq!(lines, [0, 3, 4, 4]);
    assert_eq!(statements[1].absolute_line(1), 4);
}

#[test]
fn test_syntax_error_line_is_absolute() {
    let err = parse_script("SELECT 1;\nSELECT 2;\n\nSELEC broken;", SqlDialect::MySQL).unwrap_err();
    assert_eq!(err.line, 4);
    let diagnostic = err.into_diagnostic();
    assert_eq!(diagnostic.position.line, 4);
}

#[test]
fn test_routine_is_not_parsed_by_grammar() {
    let sql =
        "CREATE TRIGGER trg BEFORE INSERT ON t FOR EACH ROW\nBEGIN\n  SET NEW.a = 1;\nEND;\nSELECT 1;";
    let statements = parse_script(sql, SqlDialect::MySQL).unwrap();
    assert_eq!(statements.len(), 2);
    match &statements[0].tree {
        SqlTree::Routine(routine) => {
            assert_eq!(routine.kind, RoutineKind::Trigger);
            assert_eq!(routine.name, "trg");
        }
        SqlTree::Statement(_) => panic!("expected routine")
    }
    assert_eq!(statements[1].base_line, 4);
}

#[test]
fn test_dialect_names() {
    assert_eq!(SqlDialect::from_name("Postgres"), Some(SqlDialect::PostgreSQL));
    assert_eq!(SqlDialect::from_name("mariadb"), Some(SqlDialect::MySQL));
    assert_eq!(SqlDialect::from_name("oracle"), None);
    assert_eq!(SqlDialect::default(), SqlDialect::MySQL);
}

#[test]
fn test_empty_script_has_no_statements() {
    assert!(parse_script("  ;\n-- nothing\n", SqlDialect::Generic).unwrap().is_empty());
}
