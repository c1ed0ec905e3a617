// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::{io::Write, sync::Arc};

use serde_json::json;
use sql_advisor::{
    catalog::{Schema, Snapshots, walk_through},
    diagnostic::{Code, Diagnostic},
    query::{SqlDialect, parse_script},
    review::{ReviewContext, review},
    rules::{RuleConfig, RuleLevel, RuleType}
};
use tempfile::Builder;

const SCHEMA: &str = r#"
CREATE TABLE orders (
    id INT PRIMARY KEY,
    email VARCHAR(255) NOT NULL,
    note TEXT
) ENGINE=InnoDB;
CREATE INDEX idx_email ON orders (email);
"#;

fn context() -> ReviewContext {
    let schema = Schema::parse(SCHEMA, SqlDialect::MySQL).unwrap();
    ReviewContext::new(SqlDialect::MySQL).with_catalog(Arc::new(schema))
}

fn codes(sql: &str, rules: &[RuleConfig], context: &ReviewContext) -> Vec<Code> {
    review(sql, rules, context)
        .unwrap()
        .into_iter()
        .map(|d| d.code)
        .collect()
}

#[test]
fn test_schema_parse_builds_tables_and_indexes() {
    let schema = Schema::parse(SCHEMA, SqlDialect::MySQL).unwrap();
    let orders = schema.table("Orders").unwrap();
    assert_eq!(orders.columns.len(), 3);
    assert!(orders.primary_key().is_some());
    assert_eq!(orders.indexes_on("email").count(), 1);
}

#[test]
fn test_schema_parse_rejects_invalid_ddl() {
    assert!(Schema::parse("CREATE TABLE (", SqlDialect::MySQL).is_err());
    assert!(Schema::parse("ALTER TABLE missing ADD COLUMN a INT", SqlDialect::MySQL).is_err());
}

#[test]
fn test_metadata_file_by_extension() {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "database: shop\ntables:\n  - name: orders\n    row_count: 20000000\n    columns:\n      \
         - name: id\n        type: INT\n        nullable: false"
    )
    .unwrap();
    let schema = Schema::load_metadata(file.path()).unwrap();
    assert_eq!(schema.database.as_deref(), Some("shop"));
    assert_eq!(schema.table("orders").unwrap().row_count, 20_000_000);
}

#[test]
fn test_walk_through_produces_final_state() {
    let origin = Schema::parse(SCHEMA, SqlDialect::MySQL).unwrap();
    let script = parse_script(
        "ALTER TABLE orders ADD COLUMN status INT;\nCREATE TABLE items (id INT PRIMARY KEY);",
        SqlDialect::MySQL
    )
    .unwrap();
    let final_state = walk_through(&origin, &script).unwrap();
    assert!(final_state.table("orders").unwrap().column("status").is_some());
    assert!(final_state.contains("items"));
    assert!(!origin.contains("items"));

    let snapshots = Snapshots::new(Arc::new(origin), final_state);
    assert!(snapshots.origin_table("items").is_none());
    assert!(snapshots.final_table("items").is_some());
}

#[test]
fn test_walk_through_failure_replaces_rule_output() {
    let rules = RuleType::template();
    let diagnostics = review("ALTER TABLE missing ADD COLUMN a INT", &rules, &context()).unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, Code::TABLE_NOT_EXISTS);
}

#[test]
fn test_change_type_against_origin() {
    let rules = [RuleConfig::new(RuleType::ColumnDisallowChangeType, RuleLevel::Warning)];
    assert_eq!(
        codes("ALTER TABLE orders MODIFY COLUMN id BIGINT", &rules, &context()),
        [Code::CHANGE_COLUMN_TYPE]
    );
    assert_eq!(
        codes("ALTER TABLE orders MODIFY COLUMN id INT", &rules, &context()),
        [Code::OK]
    );
}

#[test]
fn test_drop_indexed_column() {
    let rules = [RuleConfig::new(RuleType::ColumnDisallowDropInIndex, RuleLevel::Warning)];
    assert_eq!(
        codes("ALTER TABLE orders DROP COLUMN email", &rules, &context()),
        [Code::DROP_INDEX_COLUMN]
    );
    assert_eq!(
        codes("ALTER TABLE orders DROP COLUMN note", &rules, &context()),
        [Code::OK]
    );
}

#[test]
fn test_table_size_limit_uses_row_count() {
    let metadata = json!({
        "database": "shop",
        "tables": [{
            "name": "orders",
            "row_count": 500,
            "columns": [{ "name": "id", "type": "INT" }]
        }]
    });
    let schema = Schema::from_metadata(&metadata.to_string(), false).unwrap();
    let context = ReviewContext::new(SqlDialect::MySQL).with_catalog(Arc::new(schema));
    let rules = [RuleConfig::new(RuleType::TableLimitSize, RuleLevel::Error)
        .with_payload(json!({ "number": 100 }))];
    let diagnostics = review("ALTER TABLE orders ADD COLUMN a INT", &rules, &context).unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, Code::TABLE_EXCEED_LIMIT_SIZE);
    assert!(diagnostics[0].message.contains("500"));
}

#[test]
fn test_index_total_prefers_final_snapshot() {
    // origin already has PRIMARY and idx_email
    let rules = [RuleConfig::new(RuleType::IndexTotalNumberLimit, RuleLevel::Warning)
        .with_payload(json!({ "number": 2 }))];
    let diagnostics: Vec<Diagnostic> =
        review("ALTER TABLE orders ADD INDEX idx_note (note);", &rules, &context()).unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, Code::INDEX_COUNT_EXCEEDS_LIMIT);
    assert!(diagnostics[0].message.ends_with("found 3"));
}
