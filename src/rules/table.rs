//! Table, engine and database rules.

use std::sync::Arc;

use sqlparser::ast::{
    AlterTableOperation, ColumnOption, Expr, HiveDistributionStyle, ObjectName, ObjectType, Set,
    Statement, TableConstraint
};

use super::{
    CommentConvention, Findings, Rule, RuleContext, RuleEnv, RulePayload, RuleRegistry, RuleType,
    comment_violations, ddl_table,
    naming::{NamingIssue, NamingPattern}
};
use crate::{
    catalog::Snapshots,
    diagnostic::Code,
    error::AppResult,
    query::RoutineKind,
    walk::{
        Node, NodeKind,
        names::{
            TableOptionKind, create_table_option, expr_text, object_name, statement_tables,
            table_option
        }
    }
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::TableRequirePk, |ctx, _| Ok(Box::new(RequirePk::new(ctx))));
    registry.register(RuleType::TableNoForeignKey, |ctx, _| {
        Ok(Box::new(NoForeignKey::new(ctx)))
    });
    registry.register(RuleType::TableDropNamingConvention, |ctx, _| {
        Ok(Box::new(DropNaming::new(ctx)?))
    });
    registry.register(RuleType::TableDisallowPartition, |ctx, _| {
        Ok(Box::new(DisallowPartition::new(ctx)))
    });
    registry.register(RuleType::TableDisallowTrigger, |ctx, _| {
        Ok(Box::new(DisallowTrigger::new(ctx)))
    });
    registry.register(RuleType::TableDisallowSetCharset, |ctx, _| {
        Ok(Box::new(DisallowSetCharset::new(ctx)))
    });
    registry.register(RuleType::TableDisallowDdl, |ctx, _| {
        Ok(Box::new(ProtectedTables::ddl(ctx)))
    });
    registry.register(RuleType::TableDisallowDml, |ctx, _| {
        Ok(Box::new(ProtectedTables::dml(ctx)))
    });
    registry.register(RuleType::TableLimitSize, |ctx, env| Ok(Box::new(LimitSize::new(ctx, env))));
    registry.register(RuleType::TableRequireCharset, |ctx, _| {
        Ok(Box::new(RequireOption::charset(ctx)))
    });
    registry.register(RuleType::TableRequireCollation, |ctx, _| {
        Ok(Box::new(RequireOption::collation(ctx)))
    });
    registry.register(RuleType::TableComment, |ctx, env| {
        Ok(Box::new(TableComment::new(ctx, env)))
    });
    registry.register(RuleType::EngineMysqlUseInnodb, |ctx, _| {
        Ok(Box::new(UseInnodb::new(ctx)))
    });
    registry.register(RuleType::DatabaseDropEmptyDatabase, |ctx, env| {
        Ok(Box::new(DropEmptyDatabase::new(ctx, env)))
    });
}

/// CREATE TABLE needs a primary key; ALTER TABLE must not drop it.
pub struct RequirePk {
    findings: Findings
}

impl RequirePk {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for RequirePk {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement) = node else {
            return Ok(());
        };
        let table = ddl_table(statement).unwrap_or_default();
        match statement {
            Statement::CreateTable(create) if create.query.is_none() && create.like.is_none() => {
                let inline = create.columns.iter().any(|column| {
                    column
                        .options
                        .iter()
                        .any(|o| matches!(o.option, ColumnOption::PrimaryKey(_)))
                });
                let constraint = create
                    .constraints
                    .iter()
                    .any(|c| matches!(c, TableConstraint::PrimaryKey(_)));
                if !inline && !constraint {
                    self.findings.report(
                        Code::TABLE_NO_PK,
                        format!("Table `{}` requires PRIMARY KEY", table),
                        node.span()
                    );
                }
            }
            Statement::AlterTable(alter)
                if alter
                    .operations
                    .iter()
                    .any(|op| matches!(op, AlterTableOperation::DropPrimaryKey { .. })) =>
            {
                self.findings.report(
                    Code::TABLE_NO_PK,
                    format!("Table `{}` requires PRIMARY KEY", table),
                    node.span()
                );
            }
            _ => {}
        }
        Ok(())
    }
}

pub struct NoForeignKey {
    findings: Findings,
    table:    String
}

impl NoForeignKey {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            table:    String::new()
        }
    }

    fn report(&mut self, node: Node<'_>) {
        let message = format!("FOREIGN KEY is not allowed in the table `{}`", self.table);
        self.findings.report(Code::TABLE_HAS_FK, message, node.span());
    }
}

impl Rule for NoForeignKey {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.table = ddl_table(statement).unwrap_or_default(),
            Node::TableConstraint(TableConstraint::ForeignKey(_)) => self.report(node),
            Node::ColumnDefinition(column)
                if column
                    .options
                    .iter()
                    .any(|o| matches!(o.option, ColumnOption::ForeignKey(_))) =>
            {
                self.report(node)
            }
            _ => {}
        }
        Ok(())
    }
}

/// Only tables whose names match the convention may be dropped.
pub struct DropNaming {
    findings: Findings,
    pattern:  NamingPattern
}

impl DropNaming {
    pub fn new(ctx: &RuleContext) -> AppResult<Self> {
        Ok(Self {
            findings: Findings::new(ctx),
            pattern:  NamingPattern::from_context(ctx)?
        })
    }
}

impl Rule for DropNaming {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(Statement::Drop {
            object_type: ObjectType::Table,
            names,
            ..
        }) = node
        else {
            return Ok(());
        };
        for name in names {
            let table = object_name(name);
            if self.pattern.check(&table) == Some(NamingIssue::Format) {
                let message = format!(
                    "`{}` mismatches drop table naming convention, naming format should be \"{}\"",
                    table, self.pattern.format
                );
                self.findings.report(
                    Code::TABLE_DROP_NAMING_CONVENTION_MISMATCH,
                    message,
                    node.span()
                );
            }
        }
        Ok(())
    }
}

pub struct DisallowPartition {
    findings:  Findings,
    statement: String
}

impl DisallowPartition {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }

    fn report(&mut self, node: Node<'_>) {
        let message = format!("Table partition is forbidden, but \"{}\" creates", self.statement);
        self.findings
            .report(Code::CREATE_TABLE_PARTITION, message, node.span());
    }
}

impl Rule for DisallowPartition {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => {
                self.statement = statement.to_string();
                if let Statement::CreateTable(create) = statement
                    && (create.partition_by.is_some()
                        || matches!(
                            create.hive_distribution,
                            HiveDistributionStyle::PARTITIONED { .. }
                        ))
                {
                    self.report(node);
                }
            }
            Node::AlterOperation(
                AlterTableOperation::AddPartitions { .. }
                | AlterTableOperation::AttachPartition { .. }
            ) => self.report(node),
            _ => {}
        }
        Ok(())
    }
}

/// CREATE TRIGGER, parsed or recognized from a routine header.
pub struct DisallowTrigger {
    findings: Findings
}

impl DisallowTrigger {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for DisallowTrigger {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        if kind != NodeKind::CreateTrigger {
            return Ok(());
        }
        let subject = match node {
            Node::Routine(routine) if routine.kind == RoutineKind::Trigger => {
                format!("CREATE TRIGGER {}", routine.name)
            }
            Node::Statement(statement) => statement.to_string(),
            _ => return Ok(())
        };
        let message = format!("Trigger is forbidden, but \"{}\" creates", subject);
        self.findings
            .report(Code::CREATE_TABLE_TRIGGER, message, node.span());
        Ok(())
    }
}

pub struct DisallowSetCharset {
    findings:  Findings,
    statement: String
}

impl DisallowSetCharset {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }
}

impl Rule for DisallowSetCharset {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::TableOption(option)
                if matches!(table_option(option), Some((TableOptionKind::Charset, _))) =>
            {
                let message = format!("\"{}\" sets table charset", self.statement);
                self.findings
                    .report(Code::DISALLOW_SET_CHARSET, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Protection {
    Ddl,
    Dml
}

/// DDL or DML against tables listed in the payload.
pub struct ProtectedTables {
    findings:   Findings,
    protection: Protection,
    tables:     Vec<String>
}

impl ProtectedTables {
    pub fn ddl(ctx: &RuleContext) -> Self {
        Self::new(ctx, Protection::Ddl)
    }

    pub fn dml(ctx: &RuleContext) -> Self {
        Self::new(ctx, Protection::Dml)
    }

    fn new(ctx: &RuleContext, protection: Protection) -> Self {
        Self {
            findings: Findings::new(ctx),
            protection,
            tables: ctx.payload.lower_list()
        }
    }

    fn applies(&self, kind: NodeKind) -> bool {
        match self.protection {
            Protection::Ddl => matches!(
                kind,
                NodeKind::CreateTable
                    | NodeKind::AlterTable
                    | NodeKind::CreateIndex
                    | NodeKind::Drop
                    | NodeKind::Truncate
                    | NodeKind::RenameTable
            ),
            Protection::Dml => matches!(
                kind,
                NodeKind::InsertStatement | NodeKind::UpdateStatement | NodeKind::DeleteStatement
            )
        }
    }
}

impl Rule for ProtectedTables {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        if self.tables.is_empty() || !self.applies(kind) {
            return Ok(());
        }
        let Node::Statement(statement) = node else {
            return Ok(());
        };
        let (code, what) = match self.protection {
            Protection::Ddl => (Code::TABLE_DISALLOW_DDL, "DDL"),
            Protection::Dml => (Code::TABLE_DISALLOW_DML, "DML")
        };
        for table in statement_tables(statement) {
            if self.tables.contains(&table.to_lowercase()) {
                let message = format!("{} is disallowed on table `{}`", what, table);
                self.findings.report(code, message, node.span());
            }
        }
        Ok(())
    }
}

/// DDL against a table whose catalog row count exceeds the limit.
pub struct LimitSize {
    findings:  Findings,
    snapshots: Option<Arc<Snapshots>>,
    maximum:   u64
}

impl LimitSize {
    pub fn new(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self {
            findings:  Findings::new(ctx),
            snapshots: env.snapshots.clone(),
            maximum:   ctx.payload.number().unwrap_or_default().max(0) as u64
        }
    }
}

impl Rule for LimitSize {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        let Some(snapshots) = self.snapshots.clone() else {
            return Ok(());
        };
        let Node::Statement(statement) = node else {
            return Ok(());
        };
        if !matches!(
            kind,
            NodeKind::AlterTable
                | NodeKind::CreateIndex
                | NodeKind::Drop
                | NodeKind::Truncate
                | NodeKind::RenameTable
        ) {
            return Ok(());
        }
        for table in statement_tables(statement) {
            if let Some(info) = snapshots.origin_table(&table)
                && info.row_count > self.maximum
            {
                let message = format!(
                    "\"{}\" operates on table `{}` with {} rows. The count exceeds {}.",
                    statement, table, info.row_count, self.maximum
                );
                self.findings
                    .report(Code::TABLE_EXCEED_LIMIT_SIZE, message, node.span());
            }
        }
        Ok(())
    }
}

/// CREATE TABLE must declare a charset or a collation.
pub struct RequireOption {
    findings: Findings,
    kind:     TableOptionKind
}

impl RequireOption {
    pub fn charset(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            kind:     TableOptionKind::Charset
        }
    }

    pub fn collation(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            kind:     TableOptionKind::Collation
        }
    }
}

impl Rule for RequireOption {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(Statement::CreateTable(create)) = node else {
            return Ok(());
        };
        if create.like.is_some() || create_table_option(create, self.kind).is_some() {
            return Ok(());
        }
        let table = object_name(&create.name);
        let (code, message) = match self.kind {
            TableOptionKind::Collation => {
                let message = format!("Table `{}` does not have a collation specified", table);
                (Code::NO_COLLATION, message)
            }
            _ => {
                let message = format!("Table `{}` does not have a character set specified", table);
                (Code::NO_CHARSET, message)
            }
        };
        self.findings.report(code, message, node.span());
        Ok(())
    }
}

pub struct TableComment {
    findings:       Findings,
    convention:     CommentConvention,
    classification: Vec<String>
}

impl TableComment {
    pub fn new(ctx: &RuleContext, env: &RuleEnv) -> Self {
        let convention = match &ctx.payload {
            RulePayload::CommentConvention(convention) => convention.clone(),
            _ => CommentConvention {
                required:                true,
                max_length:              0,
                required_classification: false
            }
        };
        Self {
            findings: Findings::new(ctx),
            convention,
            classification: env.classification.clone()
        }
    }
}

impl Rule for TableComment {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(Statement::CreateTable(create)) = node else {
            return Ok(());
        };
        let subject = format!("Table `{}`", object_name(&create.name));
        let comment = create_table_option(create, TableOptionKind::Comment);
        for (code, message) in comment_violations(
            &self.convention,
            &self.classification,
            &subject,
            comment.as_deref()
        ) {
            self.findings.report(code, message, node.span());
        }
        Ok(())
    }
}

const STORAGE_ENGINE_VARIABLES: &[&str] = &["default_storage_engine", "storage_engine"];

/// Tables must use InnoDB, and the session default engine must stay InnoDB.
pub struct UseInnodb {
    findings:  Findings,
    statement: String
}

impl UseInnodb {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }

    fn check(&mut self, engine: &str, node: Node<'_>) {
        if !engine.trim_matches(['\'', '"', '`']).eq_ignore_ascii_case("innodb") {
            let message = format!("\"{}\" doesn't use InnoDB engine", self.statement);
            self.findings
                .report(Code::NOT_INNODB_ENGINE, message, node.span());
        }
    }

    fn check_assignment(&mut self, variable: &ObjectName, value: Option<&Expr>, node: Node<'_>) {
        let name = object_name(variable).to_lowercase();
        let name = name.trim_start_matches('@');
        if STORAGE_ENGINE_VARIABLES.contains(&name)
            && let Some(value) = value
        {
            self.check(&expr_text(value), node);
        }
    }
}

impl Rule for UseInnodb {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => {
                self.statement = statement.to_string();
                match statement {
                    Statement::Set(Set::SingleAssignment {
                        variable, values, ..
                    }) => self.check_assignment(variable, values.first(), node),
                    Statement::Set(Set::MultipleAssignments { assignments }) => {
                        for assignment in assignments {
                            self.check_assignment(&assignment.name, Some(&assignment.value), node);
                        }
                    }
                    _ => {}
                }
            }
            Node::TableOption(option) => {
                if let Some((TableOptionKind::Engine, engine)) = table_option(option) {
                    self.check(&engine, node);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// DROP DATABASE of the reviewed database while it still has tables.
pub struct DropEmptyDatabase {
    findings:  Findings,
    snapshots: Option<Arc<Snapshots>>
}

impl DropEmptyDatabase {
    pub fn new(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self {
            findings:  Findings::new(ctx),
            snapshots: env.snapshots.clone()
        }
    }
}

impl Rule for DropEmptyDatabase {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(Statement::Drop {
            object_type: ObjectType::Database | ObjectType::Schema,
            names,
            ..
        }) = node
        else {
            return Ok(());
        };
        let Some(snapshots) = &self.snapshots else {
            return Ok(());
        };
        let tables = snapshots.origin().table_count();
        for name in names {
            let database = object_name(name);
            let current = snapshots
                .database_name()
                .is_some_and(|current| current.eq_ignore_ascii_case(&database));
            if current && tables > 0 {
                let message = format!(
                    "Database `{}` is not allowed to drop if not empty, it has {} tables",
                    database, tables
                );
                self.findings
                    .report(Code::DATABASE_NOT_EMPTY, message, node.span());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        catalog::{Schema, TableInfo},
        dispatcher::Dispatcher,
        query::{SqlDialect, parse_script},
        rules::{RuleConfig, RuleLevel}
    };

    fn run_with(
        rule_type: RuleType,
        payload: Option<serde_json::Value>,
        env: &RuleEnv,
        sql: &str
    ) -> Vec<(Code, String)> {
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
            .map(|d| (d.code, d.message))
            .collect()
    }

    fn run(
        rule_type: RuleType,
        payload: Option<serde_json::Value>,
        sql: &str
    ) -> Vec<(Code, String)> {
        run_with(rule_type, payload, &RuleEnv::default(), sql)
    }

    fn env_with(schema: Schema) -> RuleEnv {
        let snapshots = Snapshots::new(Arc::new(schema.clone()), schema);
        RuleEnv {
            snapshots: Some(Arc::new(snapshots)),
            ..RuleEnv::default()
        }
    }

    #[test]
    fn test_require_pk() {
        assert_eq!(run(RuleType::TableRequirePk, None, "CREATE TABLE t (a INT)").len(), 1);
        for sql in [
            "CREATE TABLE t (a INT PRIMARY KEY)",
            "CREATE TABLE t (a INT, PRIMARY KEY (a))"
        ] {
            assert!(run(RuleType::TableRequirePk, None, sql).is_empty(), "{}", sql);
        }
        assert_eq!(run(RuleType::TableRequirePk, None, "ALTER TABLE t DROP PRIMARY KEY").len(), 1);
    }

    #[test]
    fn test_no_foreign_key() {
        let sql = "CREATE TABLE t (a INT, b INT, FOREIGN KEY (b) REFERENCES u (id))";
        let found = run(RuleType::TableNoForeignKey, None, sql);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Code::TABLE_HAS_FK);
    }

    #[test]
    fn test_drop_naming() {
        let found = run(RuleType::TableDropNamingConvention, None, "DROP TABLE orders, orders_del");
        assert_eq!(found.len(), 1);
        assert!(found[0].1.starts_with("`orders`"));
    }

    #[test]
    fn test_disallow_dml_on_listed_table() {
        let payload = Some(json!({ "list": ["audit_log"] }));
        let found =
            run(RuleType::TableDisallowDml, payload.clone(), "DELETE FROM AUDIT_LOG WHERE id = 1");
        assert_eq!(found.len(), 1);
        assert!(
            run(RuleType::TableDisallowDml, payload.clone(), "DELETE FROM t WHERE id = 1")
                .is_empty()
        );
        assert!(
            run(RuleType::TableDisallowDdl, payload, "DELETE FROM audit_log WHERE id = 1")
                .is_empty()
        );
    }

    #[test]
    fn test_limit_size_uses_catalog_rows() {
        let mut schema = Schema::default();
        let mut table = TableInfo::new("big");
        table.row_count = 50;
        schema.insert(table);
        let env = env_with(schema);
        let payload = Some(json!({ "number": 10 }));
        let found = run_with(
            RuleType::TableLimitSize,
            payload.clone(),
            &env,
            "ALTER TABLE big ADD COLUMN c INT"
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].1.contains("50 rows"));
        assert!(
            run_with(RuleType::TableLimitSize, payload, &env, "ALTER TABLE small ADD COLUMN c INT")
                .is_empty()
        );
    }

    #[test]
    fn test_require_charset_and_collation() {
        let sql = "CREATE TABLE t (id INT) DEFAULT CHARSET = utf8mb4";
        assert!(run(RuleType::TableRequireCharset, None, sql).is_empty());
        assert_eq!(run(RuleType::TableRequireCollation, None, sql)[0].0, Code::NO_COLLATION);
    }

    #[test]
    fn test_engine_must_be_innodb() {
        assert_eq!(
            run(RuleType::EngineMysqlUseInnodb, None, "CREATE TABLE t (id INT) ENGINE = MyISAM")
                .len(),
            1
        );
        assert!(
            run(RuleType::EngineMysqlUseInnodb, None, "CREATE TABLE t (id INT) ENGINE = InnoDB")
                .is_empty()
        );
        assert_eq!(
            run(RuleType::EngineMysqlUseInnodb, None, "SET default_storage_engine = MyISAM").len(),
            1
        );
    }

    #[test]
    fn test_table_comment() {
        let found = run(RuleType::TableComment, None, "CREATE TABLE t (id INT)");
        assert_eq!(found[0].0, Code::COMMENT_EMPTY);
        assert!(
            run(RuleType::TableComment, None, "CREATE TABLE t (id INT) COMMENT 'orders'").is_empty()
        );
    }

    #[test]
    fn test_drop_non_empty_database() {
        let mut schema = Schema::new(Some("shop".into()));
        schema.insert(TableInfo::new("orders"));
        let env = env_with(schema);
        let found = run_with(RuleType::DatabaseDropEmptyDatabase, None, &env, "DROP DATABASE shop");
        assert_eq!(found.len(), 1);
        assert!(
            run_with(RuleType::DatabaseDropEmptyDatabase, None, &env, "DROP DATABASE other")
                .is_empty()
        );
    }
}
