//! Index rules.
//!
//! Indexes come from three places: inline `PRIMARY KEY` / `UNIQUE` column
//! options, table constraints (in CREATE TABLE or `ALTER TABLE ... ADD`) and
//! `CREATE INDEX`. All of them are normalized to an
//! [`IndexDef`](crate::walk::names::IndexDef) by `node_index` before a rule
//! looks at them.

use std::{collections::HashMap, sync::Arc};

use compact_str::CompactString;
use indexmap::IndexMap;
use sqlparser::ast::{AlterTableOperation, Statement};

use super::{Findings, Rule, RuleContext, RuleEnv, RuleRegistry, RuleType, ddl_table, node_index};
use crate::{
    catalog::Snapshots,
    diagnostic::Code,
    error::AppResult,
    walk::{
        Node, NodeKind,
        names::{IndexDef, IndexKind, base_type_name, is_blob_name, table_key, type_name}
    }
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::IndexNoDuplicateColumn, |ctx, _| {
        Ok(Box::new(NoDuplicateColumn::new(ctx)))
    });
    registry.register(RuleType::IndexKeyNumberLimit, |ctx, _| {
        Ok(Box::new(KeyNumberLimit::new(ctx)))
    });
    registry.register(RuleType::IndexPkTypeLimit, |ctx, env| {
        Ok(Box::new(ColumnTypeCheck::primary_key(ctx, env)))
    });
    registry.register(RuleType::IndexTypeNoBlob, |ctx, env| {
        Ok(Box::new(ColumnTypeCheck::no_blob(ctx, env)))
    });
    registry.register(RuleType::IndexTotalNumberLimit, |ctx, env| {
        Ok(Box::new(TotalNumberLimit::new(ctx, env)))
    });
    registry.register(RuleType::IndexTypeAllowList, |ctx, _| {
        Ok(Box::new(TypeAllowList::new(ctx)))
    });
}

fn describe(index: &IndexDef) -> String {
    let label = match index.kind {
        IndexKind::Primary => "PRIMARY KEY",
        IndexKind::Unique => "UNIQUE KEY",
        IndexKind::Plain => "INDEX",
        IndexKind::FullText => "FULLTEXT INDEX",
        IndexKind::Foreign => "FOREIGN KEY"
    };
    match &index.name {
        Some(name) => format!("{} `{}`", label, name),
        None => label.to_string()
    }
}

/// Table the current statement works on, with the column types it declares.
#[derive(Default)]
struct TableScope {
    table:    String,
    declared: HashMap<CompactString, String>
}

impl TableScope {
    fn enter(&mut self, statement: &Statement) {
        self.table = ddl_table(statement).unwrap_or_default();
        self.declared.clear();
        match statement {
            Statement::CreateTable(create) => {
                for column in &create.columns {
                    self.declared
                        .insert(table_key(&column.name.value), type_name(&column.data_type));
                }
            }
            Statement::AlterTable(alter) => {
                for operation in &alter.operations {
                    let (name, data_type) = match operation {
                        AlterTableOperation::AddColumn { column_def, .. } => {
                            (&column_def.name, &column_def.data_type)
                        }
                        AlterTableOperation::ChangeColumn {
                            new_name,
                            data_type,
                            ..
                        } => (new_name, data_type),
                        AlterTableOperation::ModifyColumn {
                            col_name,
                            data_type,
                            ..
                        } => (col_name, data_type),
                        _ => continue
                    };
                    self.declared
                        .insert(table_key(&name.value), type_name(data_type));
                }
            }
            _ => {}
        }
    }

    /// Base type of a column: declared by the statement, else from the
    /// final catalog, else from the origin catalog.
    fn column_type(&self, snapshots: Option<&Snapshots>, column: &str) -> Option<String> {
        if let Some(declared) = self.declared.get(&table_key(column)) {
            return Some(declared.clone());
        }
        let snapshots = snapshots?;
        snapshots
            .final_table(&self.table)
            .or_else(|| snapshots.origin_table(&self.table))
            .and_then(|table| table.column(column))
            .map(|column| base_type_name(&column.data_type))
    }
}

pub struct NoDuplicateColumn {
    findings: Findings,
    table:    String
}

impl NoDuplicateColumn {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            table:    String::new()
        }
    }
}

impl Rule for NoDuplicateColumn {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        }
        let Some(index) = node_index(node) else {
            return Ok(());
        };
        let mut seen: Vec<CompactString> = Vec::with_capacity(index.columns.len());
        for column in &index.columns {
            let key = table_key(column);
            if seen.contains(&key) {
                let message = format!(
                    "{} in table `{}` has duplicate column `{}`",
                    describe(&index),
                    self.table,
                    column
                );
                self.findings
                    .report(Code::DUPLICATE_COLUMN_IN_INDEX, message, node.span());
                break;
            }
            seen.push(key);
        }
        Ok(())
    }
}

pub struct KeyNumberLimit {
    findings: Findings,
    maximum:  usize,
    table:    String
}

impl KeyNumberLimit {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            maximum:  ctx.payload.number().unwrap_or_default().max(0) as usize,
            table:    String::new()
        }
    }
}

impl Rule for KeyNumberLimit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        }
        if self.maximum == 0 {
            return Ok(());
        }
        if let Some(index) = node_index(node)
            && index.kind != IndexKind::Foreign
            && index.columns.len() > self.maximum
        {
            let message = format!(
                "The number of keys of {} in table `{}` should be not greater than {}",
                describe(&index),
                self.table,
                self.maximum
            );
            self.findings
                .report(Code::INDEX_KEY_NUMBER_EXCEEDS_LIMIT, message, node.span());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum TypeCheck {
    /// Primary key columns must be INT or BIGINT
    PrimaryKey,
    /// No index may cover a BLOB or TEXT column
    NoBlob
}

pub struct ColumnTypeCheck {
    findings:  Findings,
    check:     TypeCheck,
    snapshots: Option<Arc<Snapshots>>,
    scope:     TableScope
}

impl ColumnTypeCheck {
    pub fn primary_key(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self::new(ctx, env, TypeCheck::PrimaryKey)
    }

    pub fn no_blob(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self::new(ctx, env, TypeCheck::NoBlob)
    }

    fn new(ctx: &RuleContext, env: &RuleEnv, check: TypeCheck) -> Self {
        Self {
            findings: Findings::new(ctx),
            check,
            snapshots: env.snapshots.clone(),
            scope: TableScope::default()
        }
    }

    fn violation(
        &self,
        index: &IndexDef,
        column: &str,
        column_type: &str
    ) -> Option<(Code, String)> {
        match self.check {
            TypeCheck::PrimaryKey
                if index.kind == IndexKind::Primary
                    && !matches!(column_type, "INT" | "INTEGER" | "BIGINT") =>
            {
                Some((
                    Code::INDEX_PK_TYPE,
                    format!(
                        "Columns in primary key must be INT/BIGINT but `{}`.`{}` is {}",
                        self.scope.table, column, column_type
                    )
                ))
            }
            TypeCheck::NoBlob if index.kind != IndexKind::FullText && is_blob_name(column_type) => {
                Some((
                    Code::INDEX_TYPE_NO_BLOB,
                    format!(
                        "Columns in index must not be BLOB or TEXT but `{}`.`{}` is {}",
                        self.scope.table, column, column_type
                    )
                ))
            }
            _ => None
        }
    }
}

impl Rule for ColumnTypeCheck {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.scope.enter(statement);
        }
        let Some(index) = node_index(node) else {
            return Ok(());
        };
        for column in &index.columns {
            let column_type = match node {
                Node::ColumnDefinition(definition) => Some(type_name(&definition.data_type)),
                _ => self.scope.column_type(self.snapshots.as_deref(), column)
            };
            if let Some(column_type) = column_type
                && let Some((code, message)) = self.violation(&index, column, &column_type)
            {
                self.findings.report(code, message, node.span());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexTally {
    added: usize,
    line:  u64
}

/// Index count per table, reported once per table after the script.
///
/// With a catalog the count is taken from the final snapshot; without one
/// it is the number of indexes the script creates.
pub struct TotalNumberLimit {
    findings:  Findings,
    maximum:   usize,
    snapshots: Option<Arc<Snapshots>>,
    table:     String,
    tally:     IndexMap<CompactString, (String, IndexTally)>
}

impl TotalNumberLimit {
    pub fn new(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self {
            findings:  Findings::new(ctx),
            maximum:   ctx.payload.number().unwrap_or_default().max(0) as usize,
            snapshots: env.snapshots.clone(),
            table:     String::new(),
            tally:     IndexMap::new()
        }
    }
}

impl Rule for TotalNumberLimit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        }
        if node_index(node).is_none() || self.table.is_empty() {
            return Ok(());
        }
        let line = self.findings.line_of(node.span());
        let entry = self
            .tally
            .entry(table_key(&self.table))
            .or_insert_with(|| {
                (
                    self.table.clone(),
                    IndexTally {
                        added: 0,
                        line
                    }
                )
            });
        entry.1.added += 1;
        entry.1.line = line;
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        if self.maximum == 0 {
            return Ok(());
        }
        let tally = std::mem::take(&mut self.tally);
        for (table, counted) in tally.into_values() {
            let total = self
                .snapshots
                .as_ref()
                .and_then(|s| s.final_table(&table))
                .map(|t| t.indexes.len())
                .unwrap_or(counted.added);
            if total > self.maximum {
                let message = format!(
                    "The count of index in table `{}` should be no more than {}, but found {}",
                    table, self.maximum, total
                );
                self.findings
                    .report_at_line(Code::INDEX_COUNT_EXCEEDS_LIMIT, message, counted.line);
            }
        }
        Ok(())
    }
}

pub struct TypeAllowList {
    findings: Findings,
    allowed:  Vec<String>,
    table:    String
}

impl TypeAllowList {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            allowed:  ctx.payload.upper_list(),
            table:    String::new()
        }
    }
}

impl Rule for TypeAllowList {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        }
        let Some(index) = node_index(node) else {
            return Ok(());
        };
        let index_type = match (&index.index_type, index.kind) {
            (Some(index_type), _) => index_type.clone(),
            (None, IndexKind::FullText) => "FULLTEXT".to_string(),
            (None, _) => return Ok(())
        };
        if !self.allowed.contains(&index_type) {
            let message = format!(
                "Index type `{}` is not allowed, but {} in table `{}` uses it",
                index_type,
                describe(&index),
                self.table
            );
            self.findings
                .report(Code::INDEX_TYPE_NOT_ALLOWED, message, node.span());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        catalog::Schema,
        dispatcher::Dispatcher,
        query::{SqlDialect, parse_script},
        rules::{RuleConfig, RuleLevel}
    };

    fn run_with(
        rule_type: RuleType,
        payload: Option<serde_json::Value>,
        env: &RuleEnv,
        sql: &str
    ) -> Vec<(Code, String, u64)> {
        let mut config = RuleConfig::new(rule_type, RuleLevel::Warning);
        config.payload = payload.or_else(|| rule_type.default_payload());
        let rules = RuleRegistry::builtin().build_all(&[config], env).unwrap();
        let mut dispatcher = Dispatcher::new(rules);
        for statement in parse_script(sql, SqlDialect::MySQL).unwrap() {
            dispatcher.set_base_line(statement.base_line);
            dispatcher.walk(&statement.tree);
        }
        dispatcher.finalize();
        dispatcher
            .collect_diagnostics()
            .into_iter()
            .map(|d| (d.code, d.message, d.position.line))
            .collect()
    }

    fn run(
        rule_type: RuleType,
        payload: Option<serde_json::Value>,
        sql: &str
    ) -> Vec<(Code, String, u64)> {
        run_with(rule_type, payload, &RuleEnv::default(), sql)
    }

    #[test]
    fn test_duplicate_column() {
        let found =
            run(RuleType::IndexNoDuplicateColumn, None, "CREATE INDEX idx_a ON t (a, b, A)");
        assert_eq!(found.len(), 1);
        assert!(found[0].1.contains("INDEX `idx_a`"));
    }

    #[test]
    fn test_key_number_limit() {
        let found = run(
            RuleType::IndexKeyNumberLimit,
            Some(json!({ "number": 2 })),
            "CREATE TABLE t (a INT, b INT, c INT, INDEX idx_abc (a, b, c), INDEX idx_ab (a, b))"
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].1.contains("idx_abc"));
    }

    #[test]
    fn test_pk_type_from_create_table() {
        let sql = "CREATE TABLE t (id VARCHAR(20), n BIGINT, PRIMARY KEY (id, n))";
        let found = run(RuleType::IndexPkTypeLimit, None, sql);
        assert_eq!(found.len(), 1);
        assert!(found[0].1.ends_with("is VARCHAR"));
    }

    #[test]
    fn test_blob_from_catalog() {
        let origin =
            Schema::parse("CREATE TABLE t (id INT, body TEXT)", SqlDialect::MySQL).unwrap();
        let env = RuleEnv {
            snapshots: Some(Arc::new(Snapshots::new(Arc::new(origin.clone()), origin))),
            ..RuleEnv::default()
        };
        let found =
            run_with(RuleType::IndexTypeNoBlob, None, &env, "CREATE INDEX idx_body ON t (body)");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Code::INDEX_TYPE_NO_BLOB);
    }

    #[test]
    fn test_total_number_reported_once_per_table() {
        let sql = "CREATE INDEX i1 ON t (a);\nCREATE INDEX i2 ON t (b);\n\
                   CREATE INDEX i3 ON t (c);\nCREATE INDEX i4 ON u (c);";
        let found = run(RuleType::IndexTotalNumberLimit, Some(json!({ "number": 2 })), sql);
        assert_eq!(found.len(), 1);
        assert!(found[0].1.ends_with("found 3"));
        assert_eq!(found[0].2, 3);
    }

    #[test]
    fn test_type_allow_list() {
        let payload = Some(json!({ "list": ["btree"] }));
        let found = run(
            RuleType::IndexTypeAllowList,
            payload.clone(),
            "CREATE TABLE t (a INT, INDEX idx_a USING HASH (a))"
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].1.starts_with("Index type `HASH`"));
        assert!(
            run(RuleType::IndexTypeAllowList, payload, "CREATE INDEX idx_a ON t (a)").is_empty()
        );
    }
}
