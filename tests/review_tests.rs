//! End-to-end properties of the review driver.

use std::sync::Arc;

use serde_json::json;
use sql_advisor::{
    diagnostic::{Code, Diagnostic, Severity},
    executor::StaticExecutor,
    query::{SqlDialect, parse_script},
    review::{ReviewContext, review},
    rules::{RuleConfig, RuleLevel, RuleType},
    walk::{Node, NodeKind, Visitor, walk}
};

fn rule(rule_type: RuleType) -> RuleConfig {
    let config = RuleConfig::new(rule_type, RuleLevel::Warning);
    match rule_type.default_payload() {
        Some(payload) => config.with_payload(payload),
        None => config
    }
}

fn check(sql: &str, rules: &[RuleConfig]) -> Vec<Diagnostic> {
    review(sql, rules, &ReviewContext::default()).unwrap()
}

fn codes(diagnostics: &[Diagnostic]) -> Vec<Code> {
    diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn test_clean_script_yields_single_ok() {
    let rules = [
        rule(RuleType::StatementRequireWhere),
        rule(RuleType::StatementNoSelectAll),
        rule(RuleType::TableRequirePk)
    ];
    let sql = "CREATE TABLE t (id INT PRIMARY KEY, a INT);\nSELECT a FROM t WHERE id = 1;";
    let diagnostics = check(sql, &rules);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].is_ok());
    assert_eq!(diagnostics[0].severity, Severity::Success);
    assert_eq!(diagnostics[0].title, "OK");
}

#[test]
fn test_require_where_reports_line_one() {
    let diagnostics = check("SELECT * FROM t", &[RuleConfig::new(
        RuleType::StatementRequireWhere,
        RuleLevel::Error
    )]);
    assert_eq!(codes(&diagnostics), [Code::STATEMENT_NO_WHERE]);
    assert_eq!(diagnostics[0].position.line, 1);
    assert_eq!(diagnostics[0].severity, Severity::Error);
}

#[test]
fn test_function_deny_list_is_case_insensitive() {
    let rules = [
        rule(RuleType::SystemFunctionDisallowedList).with_payload(json!({ "list": ["sha1"] }))
    ];
    for sql in [
        "SELECT id FROM t WHERE h = SHA1(x)",
        "SELECT id FROM t WHERE h = Sha1(x)",
        "SELECT id FROM t WHERE h = sha1(x)"
    ] {
        let diagnostics = check(sql, &rules);
        assert_eq!(codes(&diagnostics), [Code::DISABLED_FUNCTION], "{}", sql);
    }
}

#[test]
fn test_line_is_base_line_plus_local_line() {
    let mut sql = String::from("SELECT 1;\n");
    for _ in 0..9 {
        sql.push_str("-- padding\n");
    }
    sql.push_str("CREATE TABLE t (\n  c VARCHAR(300)\n);\n");
    let rules = [rule(RuleType::ColumnMaximumVarcharLength).with_payload(json!({ "number": 255 }))];
    let diagnostics = check(&sql, &rules);
    assert_eq!(codes(&diagnostics), [Code::VARCHAR_LENGTH_EXCEEDS_LIMIT]);
    assert_eq!(diagnostics[0].position.line, 12);
}

#[test]
fn test_index_total_counts_create_and_alter() {
    let sql = "CREATE TABLE t (\n  a INT, b INT, c INT, d INT,\n  \
               INDEX i1 (a), INDEX i2 (b), INDEX i3 (c)\n);\nALTER TABLE t ADD INDEX i4 (d);";
    let rules = [rule(RuleType::IndexTotalNumberLimit).with_payload(json!({ "number": 3 }))];
    let diagnostics = check(sql, &rules);
    assert_eq!(codes(&diagnostics), [Code::INDEX_COUNT_EXCEEDS_LIMIT]);
    assert_eq!(diagnostics[0].position.line, 5);
    assert!(diagnostics[0].message.contains("`t`"));
}

#[test]
fn test_index_total_counts_inline_column_keys() {
    let sql = "CREATE TABLE t (\n  a INT PRIMARY KEY,\n  b INT UNIQUE,\n  c INT UNIQUE,\n  \
               d INT\n);\nALTER TABLE t ADD INDEX i4 (d);";
    let rules = [rule(RuleType::IndexTotalNumberLimit).with_payload(json!({ "number": 3 }))];
    let diagnostics = check(sql, &rules);
    assert_eq!(codes(&diagnostics), [Code::INDEX_COUNT_EXCEEDS_LIMIT]);
    assert_eq!(diagnostics[0].position.line, 7);
    assert!(diagnostics[0].message.contains("`t`"));
    assert!(diagnostics[0].message.ends_with("found 4"));
}

#[test]
fn test_select_list_function_not_flagged() {
    let rules = [rule(RuleType::StatementWhereDisallowFunctionsAndCalculations)];
    let diagnostics = check("SELECT UPPER(name), NOW() FROM t WHERE id = 1", &rules);
    assert_eq!(diagnostics, vec![Diagnostic::ok()]);
}

#[test]
fn test_review_is_idempotent() {
    let sql = "CREATE TABLE Orders (id INT, note TEXT);\nDELETE FROM orders;\n\
               SELECT * FROM orders WHERE note LIKE '%x';";
    let rules = RuleType::template();
    let first = check(sql, &rules);
    let second = check(sql, &rules);
    assert!(first.len() > 1);
    assert_eq!(first, second);
}

#[test]
fn test_executor_failure_does_not_silence_siblings() {
    let context =
        ReviewContext::new(SqlDialect::MySQL).with_executor(Arc::new(StaticExecutor::new()));
    let rules = [
        rule(RuleType::StatementDisallowUsingFilesort),
        rule(RuleType::StatementNoSelectAll)
    ];
    let diagnostics = review("SELECT * FROM t WHERE a = 1", &rules, &context).unwrap();
    let found = codes(&diagnostics);
    assert_eq!(found.len(), 2);
    assert!(found.contains(&Code::STATEMENT_EXPLAIN_QUERY_FAILED));
    assert!(found.contains(&Code::STATEMENT_SELECT_ALL));
}

#[test]
fn test_constant_select_skips_plan_rules() {
    let context =
        ReviewContext::new(SqlDialect::MySQL).with_executor(Arc::new(StaticExecutor::new()));
    let rules = [
        rule(RuleType::StatementSelectFullTableScan),
        rule(RuleType::StatementDisallowUsingFilesort)
    ];
    let diagnostics = review("SELECT 1", &rules, &context).unwrap();
    assert_eq!(diagnostics, vec![Diagnostic::ok()]);
}

#[test]
fn test_alter_varchar_over_limit() {
    let rules = [rule(RuleType::ColumnMaximumVarcharLength).with_payload(json!({ "number": 255 }))];
    let diagnostics = check("ALTER TABLE t ADD COLUMN c VARCHAR(300)", &rules);
    assert_eq!(codes(&diagnostics), [Code::VARCHAR_LENGTH_EXCEEDS_LIMIT]);
    let message = &diagnostics[0].message;
    assert!(message.contains("t.c"), "{}", message);
    assert!(message.contains("300"));
    assert!(message.contains("255"));
}

#[test]
fn test_syntax_error_is_single_diagnostic_at_absolute_line() {
    let sql = "SELECT a FROM t WHERE id = 1;\nSELECT b FROM t WHERE id = 2;\nSELEC broken;";
    let diagnostics = check(sql, &RuleType::template());
    assert_eq!(codes(&diagnostics), [Code::STATEMENT_SYNTAX_ERROR]);
    assert_eq!(diagnostics[0].position.line, 3);
    assert_eq!(diagnostics[0].title, "Syntax error");
}

#[test]
fn test_disabled_rule_produces_nothing() {
    let rules = [RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Disabled)];
    assert_eq!(check("DELETE FROM t", &rules), vec![Diagnostic::ok()]);
}

#[test]
fn test_unknown_payload_shape_is_error() {
    let rules = [RuleConfig::new(RuleType::ColumnRequired, RuleLevel::Warning)
        .with_payload(json!({ "number": 3 }))];
    assert!(review("SELECT 1", &rules, &ReviewContext::default()).is_err());
}

#[test]
fn test_unknown_rule_type_is_skipped() {
    let mut config = RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Error);
    config.rule_type = "statement.does-not-exist".into();
    assert_eq!(check("DELETE FROM t", &[config]), vec![Diagnostic::ok()]);
}

#[test]
fn test_info_level_maps_to_success() {
    let rules = [RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Info)];
    let diagnostics = check("DELETE FROM t", &rules);
    assert_eq!(codes(&diagnostics), [Code::STATEMENT_NO_WHERE]);
    assert_eq!(diagnostics[0].severity, Severity::Success);
}

#[derive(Default)]
struct Trace(Vec<(bool, NodeKind)>);

impl Visitor for Trace {
    fn enter(&mut self, _node: Node<'_>, kind: NodeKind) {
        self.0.push((true, kind));
    }

    fn exit(&mut self, _node: Node<'_>, kind: NodeKind) {
        self.0.push((false, kind));
    }
}

#[test]
fn test_walk_order_is_stable() {
    let sql = "SELECT a, COUNT(*) FROM t JOIN u ON t.id = u.id \
               WHERE a > 1 GROUP BY a ORDER BY a LIMIT 5";
    let traces: Vec<_> = (0..2)
        .map(|_| {
            let statements = parse_script(sql, SqlDialect::MySQL).unwrap();
            let mut trace = Trace::default();
            walk(&statements[0].tree, &mut trace);
            trace.0
        })
        .collect();
    assert_eq!(traces[0], traces[1]);
    assert_eq!(traces[0].first(), Some(&(true, NodeKind::SelectStatement)));
    assert_eq!(traces[0].last(), Some(&(false, NodeKind::SelectStatement)));
}
