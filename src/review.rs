//! Review driver.
//!
//! One call reviews one script end to end:
//!
//! ```text
//! script ──► parse_script ──► walk_through (with catalog) ──► build rules
//!                │                    │                           │
//!          syntax error         catalog error                run_rules
//!                │                    │                           │
//!                ▼                    ▼                           ▼
//!          [201 diagnostic]    [single diagnostic]      sorted diagnostics
//! ```
//!
//! Only contract violations such as undecodable payloads are returned as
//! `Err`. Everything else is a diagnostic.
//!
//! # Example
//!
//! ```
//! use sql_advisor::{
//!     diagnostic::Code,
//!     review::{ReviewContext, review},
//!     rules::{RuleConfig, RuleLevel, RuleType}
//! };
//!
//! let rules = [RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Error)];
//! let diagnostics = review("SELECT * FROM t", &rules, &ReviewContext::default()).unwrap();
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].code, Code::STATEMENT_NO_WHERE);
//! assert_eq!(diagnostics[0].position.line, 1);
//! ```

use std::sync::Arc;

use crate::{
    catalog::{Catalog, Snapshots, walk_through},
    diagnostic::Diagnostic,
    dispatcher::Dispatcher,
    error::AppResult,
    executor::{ExecContext, QueryExecutor},
    query::{ParsedStatement, SqlDialect, parse_script},
    rules::{Rule, RuleConfig, RuleEnv, RuleRegistry}
};

/// Collaborators and settings of a review.
#[derive(Clone, Default)]
pub struct ReviewContext {
    pub dialect:        SqlDialect,
    /// Origin catalog; enables the walk-through and catalog-aware rules
    pub catalog:        Option<Arc<dyn Catalog>>,
    /// Enables the EXPLAIN-based rules
    pub executor:       Option<Arc<dyn QueryExecutor>>,
    pub exec_context:   ExecContext,
    /// Classification ids accepted at the start of comments
    pub classification: Vec<String>
}

impl ReviewContext {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_classification(mut self, ids: Vec<String>) -> Self {
        self.classification = ids;
        self
    }
}

impl std::fmt::Debug for ReviewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewContext")
            .field("dialect", &self.dialect)
            .field("catalog", &self.catalog.is_some())
            .field("executor", &self.executor.is_some())
            .field("classification", &self.classification)
            .finish()
    }
}

/// Walk every statement through the rules, finalize them and collect their
/// diagnostics. Returns a single OK diagnostic when nothing fired.
pub fn run_rules(statements: &[ParsedStatement], rules: Vec<Box<dyn Rule>>) -> Vec<Diagnostic> {
    let mut dispatcher = Dispatcher::new(rules);
    for statement in statements {
        log::debug!(
            "walking statement at line {} with {} rules",
            statement.base_line + 1,
            dispatcher.rule_count()
        );
        dispatcher.set_offsets(statement.base_line, statement.column_offset);
        dispatcher.walk(&statement.tree);
    }
    dispatcher.finalize();
    let diagnostics = dispatcher.collect_diagnostics();
    if diagnostics.is_empty() {
        vec![Diagnostic::ok()]
    } else {
        diagnostics
    }
}

/// Review one script against a rule configuration.
///
/// # Errors
///
/// Returns a bad-request error when a rule payload does not decode.
pub fn review(
    script: &str,
    configs: &[RuleConfig],
    context: &ReviewContext
) -> AppResult<Vec<Diagnostic>> {
    review_with(&RuleRegistry::builtin(), script, configs, context)
}

/// [`review`] with a caller-supplied registry, e.g. one extended with
/// custom rules.
///
/// # Errors
///
/// Returns a bad-request error when a rule payload does not decode.
pub fn review_with(
    registry: &RuleRegistry,
    script: &str,
    configs: &[RuleConfig],
    context: &ReviewContext
) -> AppResult<Vec<Diagnostic>> {
    let statements = match parse_script(script, context.dialect) {
        Ok(statements) => statements,
        Err(e) => return Ok(vec![e.into_diagnostic()])
    };

    let snapshots = match &context.catalog {
        Some(catalog) => match walk_through(catalog.schema(), &statements) {
            Ok(final_state) => Some(Arc::new(Snapshots::new(catalog.clone(), final_state))),
            Err(diagnostic) => return Ok(vec![diagnostic])
        },
        None => None
    };

    let env = RuleEnv {
        snapshots,
        executor: context.executor.clone(),
        exec_context: context.exec_context.clone(),
        classification: context.classification.clone(),
        dialect: context.dialect
    };
    let rules = registry.build_all(configs, &env)?;
    log::debug!("reviewing {} statements with {} rules", statements.len(), rules.len());

    let mut diagnostics = run_rules(&statements, rules);
    diagnostics.sort_by(|a, b| b.severity.cmp(&a.severity));
    Ok(diagnostics)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        catalog::Schema,
        diagnostic::{Code, Severity},
        rules::{RuleLevel, RuleType}
    };

    #[test]
    fn test_clean_script_yields_ok() {
        let rules = [RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Error)];
        let diagnostics =
            review("SELECT a FROM t WHERE id = 1", &rules, &ReviewContext::default()).unwrap();
        assert_eq!(diagnostics, vec![Diagnostic::ok()]);
    }

    #[test]
    fn test_syntax_error_is_single_diagnostic() {
        let rules = RuleType::template();
        let diagnostics =
            review("SELECT 1;\n\nSELEC broken", &rules, &ReviewContext::default()).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, Code::STATEMENT_SYNTAX_ERROR);
        assert_eq!(diagnostics[0].position.line, 3);
    }

    #[test]
    fn test_walk_through_failure_is_single_diagnostic() {
        let catalog = Schema::parse("CREATE TABLE t (id INT)", SqlDialect::MySQL).unwrap();
        let context = ReviewContext::new(SqlDialect::MySQL).with_catalog(Arc::new(catalog));
        let rules = RuleType::template();
        let diagnostics = review("CREATE TABLE t (id INT)", &rules, &context).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, Code::TABLE_EXISTS);
    }

    #[test]
    fn test_errors_sorted_before_warnings() {
        let rules = [
            RuleConfig::new(RuleType::StatementNoSelectAll, RuleLevel::Warning),
            RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Error)
        ];
        let diagnostics = review("SELECT * FROM t", &rules, &ReviewContext::default()).unwrap();
        let severities: Vec<_> = diagnostics.iter().map(|d| d.severity).collect();
        assert_eq!(severities, [Severity::Error, Severity::Warning]);
    }

    #[test]
    fn test_bad_payload_is_error() {
        let rules = [RuleConfig::new(RuleType::StatementInsertRowLimit, RuleLevel::Warning)
            .with_payload(json!({ "list": [] }))];
        assert!(review("SELECT 1", &rules, &ReviewContext::default()).is_err());
    }
}
