//! Naming convention rules for tables, columns and indexes.
//!
//! A convention is a regular expression plus a maximum length. Index
//! conventions may be templates: `{{table}}`, `{{column_list}}`,
//! `{{referencing_table}}`, `{{referencing_column}}`, `{{referenced_table}}`
//! and `{{referenced_column}}` are replaced with the (escaped) names of the
//! index being checked before the expression is compiled.

use regex::Regex;
use sqlparser::ast::{AlterTableOperation, RenameTableNameKind, Statement};

use super::{
    ColumnView, Findings, Rule, RuleContext, RulePayload, RuleRegistry, RuleType, ddl_table,
    node_index
};
use crate::{
    diagnostic::Code,
    error::{AppResult, payload_error, rule_failure},
    walk::{
        Node, NodeKind,
        names::{IndexDef, IndexKind, is_auto_increment, object_name}
    }
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::NamingTable, |ctx, _| Ok(Box::new(TableNaming::new(ctx)?)));
    registry.register(RuleType::NamingColumn, |ctx, _| {
        Ok(Box::new(ColumnNaming::new(ctx, false)?))
    });
    registry.register(RuleType::NamingColumnAutoIncrement, |ctx, _| {
        Ok(Box::new(ColumnNaming::new(ctx, true)?))
    });
    registry.register(RuleType::NamingIndexIdx, |ctx, _| {
        Ok(Box::new(IndexNaming::new(ctx, IndexKind::Plain)?))
    });
    registry.register(RuleType::NamingIndexUk, |ctx, _| {
        Ok(Box::new(IndexNaming::new(ctx, IndexKind::Unique)?))
    });
    registry.register(RuleType::NamingIndexFk, |ctx, _| {
        Ok(Box::new(IndexNaming::new(ctx, IndexKind::Foreign)?))
    });
}

/// Why a name does not follow its convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingIssue {
    Format,
    Length
}

/// Compiled naming convention.
#[derive(Debug, Clone)]
pub struct NamingPattern {
    pub format:     String,
    pub max_length: usize,
    regex:          Regex
}

impl NamingPattern {
    /// Compile the naming payload of a rule.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if the payload is not a naming payload or
    /// its format is not a valid regular expression.
    pub fn from_context(ctx: &RuleContext) -> AppResult<Self> {
        let RulePayload::Naming { format, max_length } = &ctx.payload else {
            return Err(payload_error(ctx.rule_type.id(), "naming payload expected"));
        };
        let regex = Regex::new(format).map_err(|e| payload_error(ctx.rule_type.id(), e))?;
        Ok(Self {
            format: format.clone(),
            max_length: *max_length,
            regex
        })
    }

    pub fn check(&self, name: &str) -> Option<NamingIssue> {
        if !self.regex.is_match(name) {
            Some(NamingIssue::Format)
        } else if name.chars().count() > self.max_length {
            Some(NamingIssue::Length)
        } else {
            None
        }
    }
}

pub struct TableNaming {
    findings: Findings,
    pattern:  NamingPattern
}

impl TableNaming {
    pub fn new(ctx: &RuleContext) -> AppResult<Self> {
        Ok(Self {
            findings: Findings::new(ctx),
            pattern:  NamingPattern::from_context(ctx)?
        })
    }

    fn check(&mut self, name: &str, node: Node<'_>) {
        let message = match self.pattern.check(name) {
            None => return,
            Some(NamingIssue::Format) => format!(
                "`{}` mismatches table naming convention, naming format should be \"{}\"",
                name, self.pattern.format
            ),
            Some(NamingIssue::Length) => format!(
                "`{}` mismatches table naming convention, its length should be within {} characters",
                name, self.pattern.max_length
            )
        };
        self.findings
            .report(Code::NAMING_TABLE_CONVENTION_MISMATCH, message, node.span());
    }
}

impl Rule for TableNaming {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(Statement::CreateTable(create)) => {
                self.check(&object_name(&create.name), node)
            }
            Node::Statement(Statement::RenameTable(renames)) => {
                for rename in renames {
                    self.check(&object_name(&rename.new_name), node);
                }
            }
            Node::AlterOperation(AlterTableOperation::RenameTable {
                table_name: RenameTableNameKind::As(name) | RenameTableNameKind::To(name)
            }) => self.check(&object_name(name), node),
            _ => {}
        }
        Ok(())
    }
}

/// Column naming; with `auto_increment` set, only auto-increment columns
/// are checked.
pub struct ColumnNaming {
    findings:       Findings,
    pattern:        NamingPattern,
    auto_increment: bool,
    table:          String
}

impl ColumnNaming {
    pub fn new(ctx: &RuleContext, auto_increment: bool) -> AppResult<Self> {
        Ok(Self {
            findings: Findings::new(ctx),
            pattern: NamingPattern::from_context(ctx)?,
            auto_increment,
            table: String::new()
        })
    }

    fn check(&mut self, column: &str, node: Node<'_>) {
        let (code, what) = if self.auto_increment {
            (
                Code::NAMING_AUTO_INCREMENT_COLUMN_CONVENTION_MISMATCH,
                "auto_increment column naming convention"
            )
        } else {
            (Code::NAMING_COLUMN_CONVENTION_MISMATCH, "column naming convention")
        };
        let message = match self.pattern.check(column) {
            None => return,
            Some(NamingIssue::Format) => format!(
                "`{}`.`{}` mismatches {}, naming format should be \"{}\"",
                self.table, column, what, self.pattern.format
            ),
            Some(NamingIssue::Length) => format!(
                "`{}`.`{}` mismatches {}, its length should be within {} characters",
                self.table, column, what, self.pattern.max_length
            )
        };
        self.findings.report(code, message, node.span());
    }
}

impl Rule for ColumnNaming {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
            return Ok(());
        }
        if let Some(column) = ColumnView::from_node(node) {
            if !self.auto_increment || is_auto_increment(&column.options) {
                self.check(&column.name.value, node);
            }
        } else if let Node::AlterOperation(AlterTableOperation::RenameColumn {
            new_column_name, ..
        }) = node
            && !self.auto_increment
        {
            self.check(&new_column_name.value, node);
        }
        Ok(())
    }
}

/// Index, unique key or foreign key naming, with template expansion.
pub struct IndexNaming {
    findings: Findings,
    kind:     IndexKind,
    format:   String,
    maximum:  usize,
    table:    String
}

impl IndexNaming {
    pub fn new(ctx: &RuleContext, kind: IndexKind) -> AppResult<Self> {
        let RulePayload::Naming { format, max_length } = &ctx.payload else {
            return Err(payload_error(ctx.rule_type.id(), "naming payload expected"));
        };
        Ok(Self {
            findings: Findings::new(ctx),
            kind,
            format: format.clone(),
            maximum: *max_length,
            table: String::new()
        })
    }

    /// Expand the template for one index.
    fn expected(&self, index: &IndexDef) -> String {
        let columns = regex::escape(&index.columns.join("_"));
        let table = regex::escape(&self.table);
        self.format
            .replace("{{table}}", &table)
            .replace("{{column_list}}", &columns)
            .replace("{{referencing_table}}", &table)
            .replace("{{referencing_column}}", &columns)
            .replace(
                "{{referenced_table}}",
                &regex::escape(index.referenced_table.as_deref().unwrap_or_default())
            )
            .replace(
                "{{referenced_column}}",
                &regex::escape(&index.referenced_columns.join("_"))
            )
    }

    fn subject(&self) -> &'static str {
        match self.kind {
            IndexKind::Unique => "Unique key",
            IndexKind::Foreign => "Foreign key",
            _ => "Index"
        }
    }

    fn code(&self) -> Code {
        match self.kind {
            IndexKind::Unique => Code::NAMING_UK_CONVENTION_MISMATCH,
            IndexKind::Foreign => Code::NAMING_FK_CONVENTION_MISMATCH,
            _ => Code::NAMING_INDEX_CONVENTION_MISMATCH
        }
    }
}

impl Rule for IndexNaming {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        }
        let Some(index) = node_index(node).filter(|i| i.kind == self.kind) else {
            return Ok(());
        };
        let name = index.name.clone().unwrap_or_default();
        let expected = self.expected(&index);
        let regex = Regex::new(&expected)
            .map_err(|e| rule_failure(self.findings.rule_type().id(), e))?;
        let message = if !regex.is_match(&name) {
            format!(
                "{} in table `{}` mismatches the naming convention, expect \"{}\" but found `{}`",
                self.subject(),
                self.table,
                expected,
                name
            )
        } else if name.chars().count() > self.maximum {
            format!(
                "{} `{}` in table `{}` mismatches the naming convention, its length should be within {} characters",
                self.subject(),
                name,
                self.table,
                self.maximum
            )
        } else {
            return Ok(());
        };
        let code = self.code();
        self.findings.report(code, message, node.span());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        dispatcher::Dispatcher,
        query::{SqlDialect, parse_script},
        rules::{RuleConfig, RuleEnv, RuleLevel}
    };

    fn run(rule_type: RuleType, payload: serde_json::Value, sql: &str) -> Vec<String> {
        let config = RuleConfig::new(rule_type, RuleLevel::Warning).with_payload(payload);
        let rules = RuleRegistry::builtin()
            .build_all(&[config], &RuleEnv::default())
            .unwrap();
        let mut dispatcher = Dispatcher::new(rules);
        for statement in parse_script(sql, SqlDialect::MySQL).unwrap() {
            dispatcher.set_base_line(statement.base_line);
            dispatcher.walk(&statement.tree);
        }
        dispatcher
            .collect_diagnostics()
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    #[test]
    fn test_table_naming_format_and_length() {
        let payload = json!({ "format": "^[a-z_]+$", "maxLength": 5 });
        let messages = run(
            RuleType::NamingTable,
            payload,
            "CREATE TABLE TechBook (id INT);\nCREATE TABLE long_name (id INT);\nCREATE TABLE ok (id INT);"
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("naming format"));
        assert!(messages[1].contains("within 5 characters"));
    }

    #[test]
    fn test_rename_table_is_checked() {
        let payload = json!({ "format": "^[a-z]+$" });
        assert_eq!(
            run(RuleType::NamingTable, payload, "ALTER TABLE t RENAME TO Bad_Name").len(),
            1
        );
    }

    #[test]
    fn test_column_naming_includes_table() {
        let payload = json!({ "format": "^[a-z]+(_[a-z]+)*$" });
        let messages = run(
            RuleType::NamingColumn,
            payload,
            "ALTER TABLE book ADD COLUMN createdAt INT"
        );
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("`book`.`createdAt`"));
    }

    #[test]
    fn test_index_template() {
        let payload = json!({ "format": "^idx_{{table}}_{{column_list}}$" });
        let sql = "CREATE TABLE book (id INT, name TEXT, \
                   INDEX idx_book_id_name (id, name), INDEX i2 (name))";
        let messages = run(RuleType::NamingIndexIdx, payload, sql);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("^idx_book_name$"));
    }

    #[test]
    fn test_foreign_key_template() {
        let payload = json!({
            "format": "^fk_{{referencing_table}}_{{referencing_column}}_{{referenced_table}}_{{referenced_column}}$"
        });
        let sql = "CREATE TABLE book (id INT, author_id INT, \
                   CONSTRAINT fk_book_author_id_author_id \
                   FOREIGN KEY (author_id) REFERENCES author (id))";
        assert!(run(RuleType::NamingIndexFk, payload, sql).is_empty());
    }

    #[test]
    fn test_invalid_regex_is_payload_error() {
        let config = RuleConfig::new(RuleType::NamingTable, RuleLevel::Warning)
            .with_payload(json!({ "format": "([a-z" }));
        assert!(RuleRegistry::builtin().build_all(&[config], &RuleEnv::default()).is_err());
    }
}
