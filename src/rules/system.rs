//! System-wide rules: charsets, collations, comments, functions and the
//! object kinds a script may create.

use sqlparser::ast::Expr;

use super::{ColumnView, Findings, Rule, RuleContext, RuleRegistry, RuleType, ddl_table};
use crate::{
    diagnostic::Code,
    error::AppResult,
    walk::{
        Node, NodeKind,
        names::{
            TableOptionKind, column_charset, column_collation, column_comment, function_name,
            table_option
        }
    }
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::SystemCharsetAllowlist, |ctx, _| {
        Ok(Box::new(Allowlist::charset(ctx)))
    });
    registry.register(RuleType::SystemCollationAllowlist, |ctx, _| {
        Ok(Box::new(Allowlist::collation(ctx)))
    });
    registry.register(RuleType::SystemCommentLength, |ctx, _| {
        Ok(Box::new(CommentLength::new(ctx)))
    });
    registry.register(RuleType::SystemFunctionDisallowedList, |ctx, _| {
        Ok(Box::new(FunctionDisallowedList::new(ctx)))
    });
    registry.register(RuleType::SystemProcedureDisallowCreate, |ctx, _| {
        Ok(Box::new(DisallowCreate::new(ctx, ObjectKind::Procedure)))
    });
    registry.register(RuleType::SystemEventDisallowCreate, |ctx, _| {
        Ok(Box::new(DisallowCreate::new(ctx, ObjectKind::Event)))
    });
    registry.register(RuleType::SystemViewDisallowCreate, |ctx, _| {
        Ok(Box::new(DisallowCreate::new(ctx, ObjectKind::View)))
    });
    registry.register(RuleType::SystemFunctionDisallowCreate, |ctx, _| {
        Ok(Box::new(DisallowCreate::new(ctx, ObjectKind::Function)))
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Setting {
    Charset,
    Collation
}

/// Table and column charsets (or collations) must be in the payload list.
pub struct Allowlist {
    findings:  Findings,
    setting:   Setting,
    allowed:   Vec<String>,
    statement: String
}

impl Allowlist {
    pub fn charset(ctx: &RuleContext) -> Self {
        Self::new(ctx, Setting::Charset)
    }

    pub fn collation(ctx: &RuleContext) -> Self {
        Self::new(ctx, Setting::Collation)
    }

    fn new(ctx: &RuleContext, setting: Setting) -> Self {
        Self {
            findings: Findings::new(ctx),
            setting,
            allowed: ctx.payload.lower_list(),
            statement: String::new()
        }
    }

    fn check(&mut self, value: &str, node: Node<'_>) {
        let value = value.trim_matches(['\'', '"', '`']);
        if self.allowed.contains(&value.to_lowercase()) {
            return;
        }
        let (code, what) = match self.setting {
            Setting::Charset => (Code::DISABLED_CHARSET, "charset"),
            Setting::Collation => (Code::DISABLED_COLLATION, "collation")
        };
        let message = format!("\"{}\" used disabled {} '{}'", self.statement, what, value);
        self.findings.report(code, message, node.span());
    }
}

impl Rule for Allowlist {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.statement = statement.to_string();
            return Ok(());
        }
        if let Node::TableOption(option) = node {
            let wanted = match self.setting {
                Setting::Charset => TableOptionKind::Charset,
                Setting::Collation => TableOptionKind::Collation
            };
            if let Some((kind, value)) = table_option(option)
                && kind == wanted
            {
                self.check(&value, node);
            }
            return Ok(());
        }
        if let Some(column) = ColumnView::from_node(node) {
            let value = match self.setting {
                Setting::Charset => column_charset(&column.options),
                Setting::Collation => column_collation(&column.options)
            };
            if let Some(value) = value {
                self.check(&value, node);
            }
        }
        Ok(())
    }
}

/// Table and column comments must fit the configured length.
pub struct CommentLength {
    findings: Findings,
    maximum:  i64,
    table:    String
}

impl CommentLength {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            maximum:  ctx.payload.number().unwrap_or_default(),
            table:    String::new()
        }
    }

    fn check(&mut self, subject: String, comment: &str, node: Node<'_>) {
        if self.maximum > 0 && comment.chars().count() as i64 > self.maximum {
            let message = format!(
                "The length of {} comment should be within {} characters",
                subject, self.maximum
            );
            self.findings
                .report(Code::COMMENT_TOO_LONG, message, node.span());
        }
    }
}

impl Rule for CommentLength {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Node::TableOption(option) = node {
            if let Some((TableOptionKind::Comment, comment)) = table_option(option) {
                self.check(format!("table `{}`", self.table), &comment, node);
            }
        } else if let Some(column) = ColumnView::from_node(node)
            && let Some(comment) = column_comment(&column.options)
        {
            let subject = format!("column `{}`.`{}`", self.table, column.name.value);
            self.check(subject, &comment, node);
        }
        Ok(())
    }
}

/// Calls to functions on the deny list, matched case-insensitively.
pub struct FunctionDisallowedList {
    findings:   Findings,
    disallowed: Vec<String>,
    statement:  String
}

impl FunctionDisallowedList {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:   Findings::new(ctx),
            disallowed: ctx.payload.upper_list(),
            statement:  String::new()
        }
    }
}

impl Rule for FunctionDisallowedList {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::Expression(Expr::Function(function)) => {
                let name = function_name(function).to_uppercase();
                if self.disallowed.contains(&name) {
                    let message = format!(
                        "Function \"{}\" is disallowed, but \"{}\" uses it",
                        name, self.statement
                    );
                    self.findings
                        .report(Code::DISABLED_FUNCTION, message, node.span());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Procedure,
    Event,
    View,
    Function
}

impl ObjectKind {
    fn node_kind(self) -> NodeKind {
        match self {
            Self::Procedure => NodeKind::CreateProcedure,
            Self::Event => NodeKind::CreateEvent,
            Self::View => NodeKind::CreateView,
            Self::Function => NodeKind::CreateFunction
        }
    }

    fn code(self) -> Code {
        match self {
            Self::Procedure => Code::DISALLOW_CREATE_PROCEDURE,
            Self::Event => Code::DISALLOW_CREATE_EVENT,
            Self::View => Code::DISALLOW_CREATE_VIEW,
            Self::Function => Code::DISALLOW_CREATE_FUNCTION
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Procedure => "Procedure",
            Self::Event => "Event",
            Self::View => "View",
            Self::Function => "Function"
        }
    }
}

/// CREATE of a forbidden object kind, parsed or recognized from a routine
/// header.
pub struct DisallowCreate {
    findings: Findings,
    kind:     ObjectKind
}

impl DisallowCreate {
    fn new(ctx: &RuleContext, kind: ObjectKind) -> Self {
        Self {
            findings: Findings::new(ctx),
            kind
        }
    }
}

impl Rule for DisallowCreate {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        if kind != self.kind.node_kind() {
            return Ok(());
        }
        let subject = match node {
            Node::Routine(routine) => format!(
                "CREATE {} {}",
                self.kind.label().to_uppercase(),
                routine.name
            ),
            Node::Statement(statement) => statement.to_string(),
            _ => return Ok(())
        };
        let message = format!("{} is forbidden, but \"{}\" creates", self.kind.label(), subject);
        self.findings.report(self.kind.code(), message, node.span());
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

    fn run(
        rule_type: RuleType,
        payload: Option<serde_json::Value>,
        sql: &str
    ) -> Vec<(Code, String)> {
        let mut config = RuleConfig::new(rule_type, RuleLevel::Warning);
        config.payload = payload.or_else(|| rule_type.default_payload());
        let rules = RuleRegistry::builtin()
            .build_all(&[config], &RuleEnv::default())
            .unwrap();
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

    #[test]
    fn test_charset_allowlist_covers_table_and_column() {
        let sql = "CREATE TABLE t (a VARCHAR(10) CHARACTER SET latin1) DEFAULT CHARSET = UTF8MB4";
        let found = run(RuleType::SystemCharsetAllowlist, None, sql);
        assert_eq!(found.len(), 1);
        assert!(found[0].1.ends_with("'latin1'"));
    }

    #[test]
    fn test_comment_length() {
        let found = run(
            RuleType::SystemCommentLength,
            Some(json!({ "number": 4 })),
            "CREATE TABLE t (a INT COMMENT 'abcdef') COMMENT 'ok'"
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].1.contains("column `t`.`a`"));
    }

    #[test]
    fn test_disallowed_function() {
        let found = run(
            RuleType::SystemFunctionDisallowedList,
            None,
            "SELECT id FROM t WHERE id = rand()"
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].1.starts_with("Function \"RAND\" is disallowed"));
    }

    #[test]
    fn test_disallow_create_view() {
        let found = run(RuleType::SystemViewDisallowCreate, None, "CREATE VIEW v AS SELECT 1");
        assert_eq!(found[0].0, Code::DISALLOW_CREATE_VIEW);
        assert!(
            run(RuleType::SystemProcedureDisallowCreate, None, "CREATE VIEW v AS SELECT 1")
                .is_empty()
        );
    }

    #[test]
    fn test_disallow_create_procedure_from_routine() {
        let sql = "CREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\nEND;";
        let found = run(RuleType::SystemProcedureDisallowCreate, None, sql);
        assert_eq!(found.len(), 1);
        assert!(found[0].1.contains("CREATE PROCEDURE p"));
    }
}
