//! Fans walk events out to every registered rule.
//!
//! The dispatcher is the only [`Visitor`] in the engine. For each node it
//! computes the [`NodeKind`] once and calls `on_enter` / `on_exit` on every
//! rule in registration order. A failing rule callback is logged and the
//! walk continues with the remaining rules and nodes.
//!
//! # Example
//!
//! ```
//! use sql_advisor::{
//!     dispatcher::Dispatcher,
//!     query::{SqlDialect, parse_script},
//!     rules::{RuleConfig, RuleEnv, RuleLevel, RuleRegistry, RuleType}
//! };
//!
//! let configs = [RuleConfig::new(RuleType::StatementRequireWhere, RuleLevel::Error)];
//! let rules = RuleRegistry::builtin()
//!     .build_all(&configs, &RuleEnv::default())
//!     .unwrap();
//!
//! let mut dispatcher = Dispatcher::new(rules);
//! for statement in parse_script("SELECT 1;\nDELETE FROM t;", SqlDialect::MySQL).unwrap() {
//!     dispatcher.set_base_line(statement.base_line);
//!     dispatcher.walk(&statement.tree);
//! }
//! dispatcher.finalize();
//!
//! let diagnostics = dispatcher.collect_diagnostics();
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].position.line, 2);
//! ```

use crate::{
    diagnostic::Diagnostic,
    query::SqlTree,
    rules::Rule,
    walk::{Node, NodeKind, Visitor, walk}
};

/// Drives registered rules through statement walks.
#[derive(Default)]
pub struct Dispatcher {
    rules:     Vec<Box<dyn Rule>>,
    base_line: u64
}

impl Dispatcher {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self {
            rules,
            base_line: 0
        }
    }

    /// Append rules after the ones already registered.
    pub fn register(&mut self, rules: impl IntoIterator<Item = Box<dyn Rule>>) {
        self.rules.extend(rules);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn base_line(&self) -> u64 {
        self.base_line
    }

    /// Set the base line of the next statement on every rule.
    pub fn set_base_line(&mut self, base_line: u64) {
        self.set_offsets(base_line, 0);
    }

    /// Set the base line and first-line column offset of the next statement.
    pub fn set_offsets(&mut self, base_line: u64, column_offset: u64) {
        self.base_line = base_line;
        for rule in &mut self.rules {
            rule.set_offsets(base_line, column_offset);
        }
    }

    /// Walk one statement, dispatching every event to every rule.
    pub fn walk(&mut self, tree: &SqlTree) {
        walk(tree, self);
    }

    /// Run every rule's `finalize`. Failures are logged.
    pub fn finalize(&mut self) {
        for rule in &mut self.rules {
            if let Err(e) = rule.finalize() {
                log::warn!("rule {} failed to finalize: {}", rule.name(), e);
            }
        }
    }

    /// Diagnostics of all rules: rules in registration order, each rule's
    /// diagnostics in the order it reported them.
    pub fn collect_diagnostics(&self) -> Vec<Diagnostic> {
        self.rules
            .iter()
            .flat_map(|rule| rule.diagnostics().iter().cloned())
            .collect()
    }

    /// Give the rules back, e.g. to inspect them after a review.
    pub fn into_rules(self) -> Vec<Box<dyn Rule>> {
        self.rules
    }
}

impl Visitor for Dispatcher {
    fn enter(&mut self, node: Node<'_>, kind: NodeKind) {
        for rule in &mut self.rules {
            if let Err(e) = rule.on_enter(node, kind) {
                log::warn!("rule {} failed on {:?}: {}", rule.name(), kind, e);
            }
        }
    }

    fn exit(&mut self, node: Node<'_>, kind: NodeKind) {
        for rule in &mut self.rules {
            if let Err(e) = rule.on_exit(node, kind) {
                log::warn!("rule {} failed on {:?}: {}", rule.name(), kind, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostic::Code,
        error::{AppResult, rule_failure},
        query::{SqlDialect, parse_script},
        rules::{Findings, RuleConfig, RuleContext, RuleLevel, RuleType}
    };

    struct Failing {
        findings: Findings
    }

    impl Rule for Failing {
        fn findings(&self) -> &Findings {
            &self.findings
        }

        fn findings_mut(&mut self) -> &mut Findings {
            &mut self.findings
        }

        fn on_enter(&mut self, _node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
            Err(rule_failure("failing", "always"))
        }
    }

    struct CountStatements {
        findings: Findings
    }

    impl Rule for CountStatements {
        fn findings(&self) -> &Findings {
            &self.findings
        }

        fn findings_mut(&mut self) -> &mut Findings {
            &mut self.findings
        }

        fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
            if kind.is_statement() {
                self.findings.report(Code::NOT_FOUND, "statement", node.span());
            }
            Ok(())
        }
    }

    fn ctx() -> RuleContext {
        let config = RuleConfig::new(RuleType::StatementDisallowCommit, RuleLevel::Warning);
        RuleContext::from_config(&config).unwrap().unwrap()
    }

    #[test]
    fn test_failing_rule_does_not_stop_siblings() {
        let mut dispatcher = Dispatcher::new(vec![
            Box::new(Failing {
                findings: Findings::new(&ctx())
            }),
            Box::new(CountStatements {
                findings: Findings::new(&ctx())
            }),
        ]);
        for statement in parse_script("SELECT 1;\n\nSELECT 2;", SqlDialect::MySQL).unwrap() {
            dispatcher.set_base_line(statement.base_line);
            dispatcher.walk(&statement.tree);
        }
        dispatcher.finalize();
        let lines: Vec<u64> = dispatcher
            .collect_diagnostics()
            .iter()
            .map(|d| d.position.line)
            .collect();
        assert_eq!(lines, [1, 3]);
    }

    #[test]
    fn test_register_appends() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.register([Box::new(CountStatements {
            findings: Findings::new(&ctx())
        }) as Box<dyn Rule>]);
        assert_eq!(dispatcher.rule_count(), 1);
        dispatcher.set_base_line(5);
        assert_eq!(dispatcher.base_line(), 5);
    }
}
