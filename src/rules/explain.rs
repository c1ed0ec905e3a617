//! Rules that ask the database for the statement's plan.
//!
//! Each rule reformulates the statement as `EXPLAIN <statement>` and runs it
//! through the configured [`QueryExecutor`]. A failed call, or a context
//! that is cancelled or past its deadline, becomes a single diagnostic for
//! that statement.

use std::sync::Arc;

use sqlparser::ast::{SetExpr, Statement};

use super::{Findings, Rule, RuleContext, RuleEnv, RuleRegistry, RuleType};
use crate::{
    diagnostic::Code,
    error::{AppResult, contract_error},
    executor::{ExecContext, ExplainRow, QueryExecutor, explain},
    walk::{Node, NodeKind}
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::StatementSelectFullTableScan, |ctx, env| {
        Ok(Box::new(SelectFullTableScan::new(ctx, Explainer::from_env(env)?)))
    });
    registry.register(RuleType::StatementDisallowUsingFilesort, |ctx, env| {
        Ok(Box::new(PlanExtra::filesort(ctx, Explainer::from_env(env)?)))
    });
    registry.register(RuleType::StatementDisallowUsingTemporary, |ctx, env| {
        Ok(Box::new(PlanExtra::temporary(ctx, Explainer::from_env(env)?)))
    });
    registry.register(RuleType::StatementAffectedRowLimit, |ctx, env| {
        Ok(Box::new(AffectedRowLimit::new(ctx, Explainer::from_env(env)?)))
    });
}

/// Executor handle shared by the plan rules.
pub struct Explainer {
    executor: Arc<dyn QueryExecutor>,
    context:  ExecContext
}

impl Explainer {
    pub fn new(executor: Arc<dyn QueryExecutor>, context: ExecContext) -> Self {
        Self {
            executor,
            context
        }
    }

    fn from_env(env: &RuleEnv) -> AppResult<Self> {
        let executor = env
            .executor
            .clone()
            .ok_or_else(|| contract_error("rule requires a query executor"))?;
        Ok(Self::new(executor, env.exec_context.clone()))
    }

    fn plan(&self, statement: &Statement) -> AppResult<Vec<ExplainRow>> {
        explain(self.executor.as_ref(), &self.context, &statement.to_string())
    }
}

/// A constant SELECT such as `SELECT 1` reads no table and has no plan worth
/// checking.
fn reads_tables(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => {
            !matches!(query.body.as_ref(), SetExpr::Select(select) if select.from.is_empty())
        }
        _ => true
    }
}

/// `type = ALL` in the plan of a SELECT.
pub struct SelectFullTableScan {
    findings:  Findings,
    explainer: Explainer
}

impl SelectFullTableScan {
    pub fn new(ctx: &RuleContext, explainer: Explainer) -> Self {
        Self {
            findings: Findings::new(ctx),
            explainer
        }
    }
}

impl Rule for SelectFullTableScan {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement @ Statement::Query(_)) = node else {
            return Ok(());
        };
        if !reads_tables(statement) {
            return Ok(());
        }
        match self.explainer.plan(statement) {
            Err(e) => self.findings.report(
                Code::STATEMENT_CHECK_FULL_TABLE_SCAN_FAILED,
                format!(
                    "Failed to check full table scan: {}, related statement: \"{}\"",
                    e, statement
                ),
                node.span()
            ),
            Ok(rows) => {
                for row in rows.iter().filter(|r| r.is_full_scan()) {
                    let message = format!(
                        "Full table scan detected on table `{}`, related statement: \"{}\"",
                        row.table.as_deref().unwrap_or("?"),
                        statement
                    );
                    self.findings
                        .report(Code::STATEMENT_HAS_TABLE_FULL_SCAN, message, node.span());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Extra {
    Filesort,
    Temporary
}

/// `Using filesort` / `Using temporary` in the plan of a SELECT.
pub struct PlanExtra {
    findings:  Findings,
    explainer: Explainer,
    extra:     Extra
}

impl PlanExtra {
    pub fn filesort(ctx: &RuleContext, explainer: Explainer) -> Self {
        Self {
            findings: Findings::new(ctx),
            explainer,
            extra: Extra::Filesort
        }
    }

    pub fn temporary(ctx: &RuleContext, explainer: Explainer) -> Self {
        Self {
            findings: Findings::new(ctx),
            explainer,
            extra: Extra::Temporary
        }
    }
}

impl Rule for PlanExtra {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement @ Statement::Query(_)) = node else {
            return Ok(());
        };
        if !reads_tables(statement) {
            return Ok(());
        }
        let rows = match self.explainer.plan(statement) {
            Ok(rows) => rows,
            Err(e) => {
                self.findings.report(
                    Code::STATEMENT_EXPLAIN_QUERY_FAILED,
                    format!("Failed to explain query: {}, related statement: \"{}\"", e, statement),
                    node.span()
                );
                return Ok(());
            }
        };
        let (found, code, what) = match self.extra {
            Extra::Filesort => (
                rows.iter().any(ExplainRow::uses_filesort),
                Code::STATEMENT_HAS_USING_FILESORT,
                "filesort"
            ),
            Extra::Temporary => (
                rows.iter().any(ExplainRow::uses_temporary),
                Code::STATEMENT_HAS_USING_TEMPORARY,
                "temporary"
            )
        };
        if found {
            self.findings
                .report(code, format!("\"{}\" uses {}", statement, what), node.span());
        }
        Ok(())
    }
}

/// Estimated rows touched by UPDATE / DELETE above the limit.
pub struct AffectedRowLimit {
    findings:  Findings,
    explainer: Explainer,
    maximum:   i64
}

impl AffectedRowLimit {
    pub fn new(ctx: &RuleContext, explainer: Explainer) -> Self {
        Self {
            findings: Findings::new(ctx),
            explainer,
            maximum: ctx.payload.number().unwrap_or_default()
        }
    }
}

impl Rule for AffectedRowLimit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement @ (Statement::Update(_) | Statement::Delete(_))) = node else {
            return Ok(());
        };
        match self.explainer.plan(statement) {
            Err(e) => self.findings.report(
                Code::STATEMENT_EXPLAIN_QUERY_FAILED,
                format!("Failed to explain query: {}, related statement: \"{}\"", e, statement),
                node.span()
            ),
            Ok(rows) => {
                let affected = rows.iter().map(|r| r.rows).max().unwrap_or_default();
                if affected > self.maximum {
                    let message = format!(
                        "\"{}\" affected {} rows (estimated). The count exceeds {}.",
                        statement, affected, self.maximum
                    );
                    self.findings
                        .report(Code::STATEMENT_AFFECTED_ROW_EXCEEDS_LIMIT, message, node.span());
                }
            }
        }
        Ok(())
    }
}
