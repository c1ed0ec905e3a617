//! Rule engine: the [`Rule`] contract, the shared [`Findings`] accumulator
//! and the [`RuleRegistry`] that turns configuration into rule instances.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ RuleConfig  │────▶│ RuleRegistry │────▶│ Box<dyn Rule>│
//! └─────────────┘     └──────────────┘     └──────┬───────┘
//!                            ▲                    │ on_enter / on_exit
//!                     ┌──────┴──────┐      ┌──────┴───────┐
//!                     │   RuleEnv   │      │  Dispatcher  │
//!                     └─────────────┘      └──────────────┘
//! ```
//!
//! A rule is a small state machine. It receives `on_enter` / `on_exit` for
//! every node of every statement in document order, then `finalize` once
//! after the last statement. Findings are reported through [`Findings`],
//! which converts statement-local spans into script lines.
//!
//! # Rule Families
//!
//! - **statement** - WHERE, LIMIT, ORDER BY, DML shape and `EXPLAIN` checks
//! - **naming** - Table, column and index naming conventions
//! - **column** - Column definitions and column changes
//! - **table** - Table definitions, protected tables, engine and database
//! - **index** - Index shape and per-table index budget
//! - **system** - Charsets, collations, comments, functions and routines
//!
//! # Implementing Custom Rules
//!
//! ```
//! use sql_advisor::{
//!     diagnostic::Code,
//!     error::AppResult,
//!     rules::{Findings, Rule, RuleContext, RuleLevel, RuleRegistry, RuleType},
//!     walk::{Node, NodeKind}
//! };
//!
//! struct NoTruncate {
//!     findings: Findings
//! }
//!
//! impl Rule for NoTruncate {
//!     fn findings(&self) -> &Findings {
//!         &self.findings
//!     }
//!
//!     fn findings_mut(&mut self) -> &mut Findings {
//!         &mut self.findings
//!     }
//!
//!     fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
//!         if kind == NodeKind::Truncate {
//!             self.findings.report(Code::TABLE_DISALLOW_DDL, "TRUNCATE is disallowed", node.span());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = RuleRegistry::new();
//! registry.register(RuleType::TableDisallowDdl, |ctx, _env| {
//!     Ok(Box::new(NoTruncate {
//!         findings: Findings::new(ctx)
//!     }))
//! });
//! assert!(registry.contains(RuleType::TableDisallowDdl));
//! ```

/// Implements the `findings` accessors for a rule struct with a
/// `findings: Findings` field.
macro_rules! findings_accessors {
    () => {
        fn findings(&self) -> &$crate::rules::Findings {
            &self.findings
        }

        fn findings_mut(&mut self) -> &mut $crate::rules::Findings {
            &mut self.findings
        }
    };
}

mod column;
mod explain;
mod index;
mod naming;
mod statement;
mod system;
mod table;
mod types;

use std::{collections::HashMap, sync::Arc};

use sqlparser::{
    ast::{AlterTableOperation, ColumnOption, DataType, Ident, Statement},
    tokenizer::Span
};
pub use types::{
    CommentConvention, DEFAULT_NAME_MAX_LENGTH, PayloadKind, RuleConfig, RuleContext, RuleLevel,
    RulePayload, RuleType
};

use crate::{
    catalog::Snapshots,
    diagnostic::{Code, Diagnostic, Severity},
    error::AppResult,
    executor::{ExecContext, QueryExecutor},
    query::SqlDialect,
    walk::{
        Node, NodeKind,
        names::{
            IndexDef, column_index, column_options, constraint_index, create_index_def,
            object_name
        }
    }
};

/// Stateful check driven by the dispatcher.
///
/// Rule instances are created per review and are never shared, so they
/// only need to be `Send`. Callbacks return `Err` for internal failures;
/// the dispatcher logs them and keeps going.
pub trait Rule: Send {
    fn findings(&self) -> &Findings;

    fn findings_mut(&mut self) -> &mut Findings;

    /// Rule identifier, as used in configuration.
    fn name(&self) -> &str {
        self.findings().rule_type().id()
    }

    /// Called before the node's children are visited.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot evaluate the node.
    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        let _ = (node, kind);
        Ok(())
    }

    /// Called after all of the node's children are visited.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot evaluate the node.
    fn on_exit(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        let _ = (node, kind);
        Ok(())
    }

    /// Called once after the last statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the accumulated state is inconsistent.
    fn finalize(&mut self) -> AppResult<()> {
        Ok(())
    }

    fn set_base_line(&mut self, base_line: u64) {
        self.set_offsets(base_line, 0);
    }

    /// Position of the statement about to be walked.
    fn set_offsets(&mut self, base_line: u64, column_offset: u64) {
        self.findings_mut().set_offsets(base_line, column_offset);
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        self.findings().diagnostics()
    }
}

/// Per-rule diagnostic accumulator.
///
/// Holds the rule's severity and title and the offsets of the statement
/// being walked, so rules only deal with statement-local spans.
#[derive(Debug, Clone)]
pub struct Findings {
    rule_type:     RuleType,
    title:         String,
    severity:      Severity,
    base_line:     u64,
    column_offset: u64,
    diagnostics:   Vec<Diagnostic>
}

impl Findings {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            rule_type:     ctx.rule_type,
            title:         ctx.title.clone(),
            severity:      ctx.severity(),
            base_line:     0,
            column_offset: 0,
            diagnostics:   Vec::new()
        }
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn base_line(&self) -> u64 {
        self.base_line
    }

    pub fn set_offsets(&mut self, base_line: u64, column_offset: u64) {
        self.base_line = base_line;
        self.column_offset = column_offset;
    }

    /// Script line of a statement-local span. An empty span maps to the
    /// statement's first line.
    pub fn line_of(&self, span: Span) -> u64 {
        self.base_line + span.start.line.max(1)
    }

    fn column_of(&self, span: Span) -> Option<u64> {
        if span == Span::empty() {
            return None;
        }
        let column = span.start.column.max(1);
        Some(if span.start.line <= 1 {
            column + self.column_offset
        } else {
            column
        })
    }

    /// Record a finding at a node's position.
    pub fn report(&mut self, code: Code, message: impl Into<String>, span: Span) {
        let diagnostic = Diagnostic::new(self.severity, code, self.title.clone(), message)
            .at(self.line_of(span), self.column_of(span));
        self.diagnostics.push(diagnostic);
    }

    /// Record a finding at an absolute script line, for aggregated results.
    pub fn report_at_line(&mut self, code: Code, message: impl Into<String>, line: u64) {
        let diagnostic =
            Diagnostic::new(self.severity, code, self.title.clone(), message).at(line, None);
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Collaborators available to rule factories.
#[derive(Clone, Default)]
pub struct RuleEnv {
    /// Origin and final catalog snapshots, when reviewing against a catalog
    pub snapshots:      Option<Arc<Snapshots>>,
    pub executor:       Option<Arc<dyn QueryExecutor>>,
    pub exec_context:   ExecContext,
    /// Accepted comment classification ids
    pub classification: Vec<String>,
    pub dialect:        SqlDialect
}

/// Builds a rule instance from its configuration.
pub type RuleFactory = fn(&RuleContext, &RuleEnv) -> AppResult<Box<dyn Rule>>;

/// Map from rule type to factory.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    factories: HashMap<RuleType, RuleFactory>
}

impl RuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in rule.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        statement::register(&mut registry);
        explain::register(&mut registry);
        naming::register(&mut registry);
        column::register(&mut registry);
        table::register(&mut registry);
        index::register(&mut registry);
        system::register(&mut registry);
        registry
    }

    pub fn register(&mut self, rule_type: RuleType, factory: RuleFactory) {
        self.factories.insert(rule_type, factory);
    }

    pub fn contains(&self, rule_type: RuleType) -> bool {
        self.factories.contains_key(&rule_type)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build one rule. Returns `Ok(None)` when the rule cannot run in this
    /// environment: it is disabled, has no factory, or needs an executor
    /// that is not configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory rejects the configuration.
    pub fn build(&self, ctx: &RuleContext, env: &RuleEnv) -> AppResult<Option<Box<dyn Rule>>> {
        if ctx.level == RuleLevel::Disabled {
            return Ok(None);
        }
        if ctx.rule_type.needs_executor() && env.executor.is_none() {
            log::debug!("skipping rule {}: no query executor configured", ctx.rule_type);
            return Ok(None);
        }
        let Some(factory) = self.factories.get(&ctx.rule_type) else {
            log::warn!("no factory registered for rule {}", ctx.rule_type);
            return Ok(None);
        };
        factory(ctx, env).map(Some)
    }

    /// Build rule instances for a configuration list, in list order.
    ///
    /// Disabled entries are skipped before their payload is decoded and
    /// unknown rule types are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if a payload does not decode.
    pub fn build_all(
        &self,
        configs: &[RuleConfig],
        env: &RuleEnv
    ) -> AppResult<Vec<Box<dyn Rule>>> {
        let mut rules = Vec::with_capacity(configs.len());
        for config in configs {
            if config.level == RuleLevel::Disabled {
                continue;
            }
            let Some(ctx) = RuleContext::from_config(config)? else {
                log::warn!("unknown rule type: {}", config.rule_type);
                continue;
            };
            if let Some(rule) = self.build(&ctx, env)? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }
}

/// Column as declared by a column definition or by `CHANGE` / `MODIFY
/// COLUMN`.
pub(crate) struct ColumnView<'a> {
    pub name:      &'a Ident,
    pub data_type: &'a DataType,
    pub options:   Vec<&'a ColumnOption>
}

impl<'a> ColumnView<'a> {
    pub fn from_node(node: Node<'a>) -> Option<Self> {
        match node {
            Node::ColumnDefinition(column) => Some(Self {
                name:      &column.name,
                data_type: &column.data_type,
                options:   column_options(column)
            }),
            Node::AlterOperation(AlterTableOperation::ChangeColumn {
                new_name,
                data_type,
                options,
                ..
            }) => Some(Self {
                name: new_name,
                data_type,
                options: options.iter().collect()
            }),
            Node::AlterOperation(AlterTableOperation::ModifyColumn {
                col_name,
                data_type,
                options,
                ..
            }) => Some(Self {
                name: col_name,
                data_type,
                options: options.iter().collect()
            }),
            _ => None
        }
    }
}

/// Index created by a node: an inline column key, a table constraint or a
/// `CREATE INDEX` statement.
pub(crate) fn node_index(node: Node<'_>) -> Option<IndexDef> {
    match node {
        Node::ColumnDefinition(column) => column_index(column),
        Node::TableConstraint(constraint) => constraint_index(constraint),
        Node::Statement(Statement::CreateIndex(index)) => Some(create_index_def(index)),
        _ => None
    }
}

/// Table a DDL statement defines or changes.
pub(crate) fn ddl_table(statement: &Statement) -> Option<String> {
    match statement {
        Statement::CreateTable(create) => Some(object_name(&create.name)),
        Statement::AlterTable(alter) => Some(object_name(&alter.name)),
        Statement::CreateIndex(index) => Some(object_name(&index.table_name)),
        _ => None
    }
}

/// Check a table or column comment against a convention.
///
/// `subject` names the commented object in messages, e.g. `` Table `t` ``.
pub(crate) fn comment_violations(
    convention: &CommentConvention,
    classification: &[String],
    subject: &str,
    comment: Option<&str>
) -> Vec<(Code, String)> {
    let mut violations = Vec::new();
    let comment = comment.unwrap_or_default();
    if comment.is_empty() {
        if convention.required {
            violations.push((Code::COMMENT_EMPTY, format!("{} requires comments", subject)));
        }
        return violations;
    }
    let length = comment.chars().count() as i64;
    if convention.max_length > 0 && length > convention.max_length {
        violations.push((
            Code::COMMENT_TOO_LONG,
            format!(
                "The length of {} comment should be within {} characters",
                subject.to_lowercase(),
                convention.max_length
            )
        ));
    }
    if convention.required_classification
        && !classification.is_empty()
        && !has_classification(comment, classification)
    {
        violations.push((
            Code::COMMENT_MISSING_CLASSIFICATION,
            format!("{} comment requires classification", subject)
        ));
    }
    violations
}

/// Whether a comment starts with a classification id followed by `-` or the
/// end of the comment.
fn has_classification(comment: &str, classification: &[String]) -> bool {
    classification.iter().any(|id| {
        comment
            .strip_prefix(id.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
    })
}
