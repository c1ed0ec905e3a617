use std::fs;

use sql_advisor::{
    config::Config,
    diagnostic::Code,
    query::SqlDialect,
    review::{ReviewContext, review},
    rules::{RuleLevel, RuleType}
};
use tempfile::TempDir;

#[test]
fn test_default_config_is_template() {
    let config = Config::default();
    assert_eq!(config.rule_configs().unwrap(), RuleType::template());
    assert_eq!(config.dialect().unwrap(), None);
}

#[test]
fn test_config_file_drives_review() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("advisor.toml");
    fs::write(
        &path,
        r#"
dialect = "mysql"

[rules]
disabled = ["statement.where.require"]

[rules.severity]
"statement.select.no-select-all" = "error"
"#
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    let rules = config.rule_configs().unwrap();
    let context = ReviewContext::new(config.dialect().unwrap().unwrap_or_default());
    let diagnostics = review("SELECT * FROM t", &rules, &context).unwrap();

    assert!(diagnostics.iter().all(|d| d.code != Code::STATEMENT_NO_WHERE));
    let select_all = diagnostics
        .iter()
        .find(|d| d.code == Code::STATEMENT_SELECT_ALL)
        .unwrap();
    assert_eq!(select_all.severity.to_string(), "ERROR");
}

#[test]
fn test_payload_override_reaches_rule() {
    let config = Config::from_toml(
        "[rules.payload]\n\"column.maximum-varchar-length\" = { number = 10 }\n"
    )
    .unwrap();
    let rules = config.rule_configs().unwrap();
    let diagnostics = review(
        "ALTER TABLE t ADD COLUMN c VARCHAR(20)",
        &rules,
        &ReviewContext::new(SqlDialect::MySQL)
    )
    .unwrap();
    assert!(
        diagnostics
            .iter()
            .any(|d| d.code == Code::VARCHAR_LENGTH_EXCEEDS_LIMIT)
    );
}

#[test]
fn test_bad_payload_override_fails_review() {
    let config =
        Config::from_toml("[rules.payload]\n\"statement.insert.row-limit\" = { list = [] }\n")
            .unwrap();
    let rules = config.rule_configs().unwrap();
    assert!(review("SELECT 1", &rules, &ReviewContext::default()).is_err());
}

#[test]
fn test_yaml_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("advisor.yaml");
    fs::write(&path, "rules:\n  severity:\n    naming.table: off\n").unwrap();
    let rules = Config::from_file(&path).unwrap().rule_configs().unwrap();
    let naming = rules
        .iter()
        .find(|r| r.rule_type == RuleType::NamingTable.id())
        .unwrap();
    assert_eq!(naming.level, RuleLevel::Disabled);
}

#[test]
fn test_invalid_toml_is_error() {
    assert!(Config::from_toml("[rules\ndisabled = 1").is_err());
}
