//! Statement-shape rules: WHERE, LIMIT, ORDER BY, DML and ALTER checks.

use compact_str::CompactString;
use indexmap::IndexMap;
use sqlparser::ast::{
    AlterTableOperation, BinaryOperator, Expr, OrderByKind, SelectItem, SetExpr, Statement,
    UnaryOperator, Value
};

use super::{Findings, Rule, RuleContext, RuleRegistry, RuleType};
use crate::{
    diagnostic::Code,
    error::{AppResult, rule_failure},
    walk::{
        Node, NodeKind,
        names::{function_name, literal_number, literal_string, object_name, table_key}
    }
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::StatementRequireWhere, |ctx, _| {
        Ok(Box::new(RequireWhere::new(ctx)))
    });
    registry.register(RuleType::StatementNoSelectAll, |ctx, _| {
        Ok(Box::new(NoSelectAll::new(ctx)))
    });
    registry.register(RuleType::StatementNoLeadingWildcardLike, |ctx, _| {
        Ok(Box::new(NoLeadingWildcardLike::new(ctx)))
    });
    registry.register(RuleType::StatementDisallowCommit, |ctx, _| {
        Ok(Box::new(DisallowCommit::new(ctx)))
    });
    registry.register(RuleType::StatementDisallowCreateTableAs, |ctx, _| {
        Ok(Box::new(DisallowCreateTableAs::new(ctx)))
    });
    registry.register(RuleType::StatementDisallowLimit, |ctx, _| {
        Ok(Box::new(DisallowLimit::new(ctx)))
    });
    registry.register(RuleType::StatementDisallowOrderBy, |ctx, _| {
        Ok(Box::new(DisallowOrderBy::new(ctx)))
    });
    registry.register(RuleType::StatementMergeAlterTable, |ctx, _| {
        Ok(Box::new(MergeAlterTable::new(ctx)))
    });
    registry.register(RuleType::StatementInsertRowLimit, |ctx, _| {
        Ok(Box::new(InsertRowLimit::new(ctx)))
    });
    registry.register(RuleType::StatementInsertMustSpecifyColumn, |ctx, _| {
        Ok(Box::new(InsertMustSpecifyColumn::new(ctx)))
    });
    registry.register(RuleType::StatementInsertDisallowOrderByRand, |ctx, _| {
        Ok(Box::new(InsertDisallowOrderByRand::new(ctx)))
    });
    registry.register(RuleType::StatementWhereNoEqualNull, |ctx, _| {
        Ok(Box::new(WhereNoEqualNull::new(ctx)))
    });
    registry.register(RuleType::StatementMaximumLimitValue, |ctx, _| {
        Ok(Box::new(MaximumLimitValue::new(ctx)))
    });
    registry.register(RuleType::StatementMaximumJoinTableCount, |ctx, _| {
        Ok(Box::new(MaximumJoinTableCount::new(ctx)))
    });
    registry.register(RuleType::StatementWhereMaximumLogicalOperatorCount, |ctx, _| {
        Ok(Box::new(MaximumLogicalOperatorCount::new(ctx)))
    });
    registry.register(RuleType::StatementDisallowMixInDml, |ctx, _| {
        Ok(Box::new(DisallowMixInDml::new(ctx)))
    });
    registry.register(RuleType::StatementAddColumnWithoutPosition, |ctx, _| {
        Ok(Box::new(AddColumnWithoutPosition::new(ctx)))
    });
    registry.register(RuleType::StatementWhereDisallowFunctionsAndCalculations, |ctx, _| {
        Ok(Box::new(FunctionsInWhere::new(ctx)))
    });
}

/// UPDATE / DELETE without WHERE, and SELECT reading a table without WHERE.
///
/// A SELECT without FROM (`SELECT 1`, `SELECT NOW()`) is exempt.
pub struct RequireWhere {
    findings:  Findings,
    statement: String
}

impl RequireWhere {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }

    fn report(&mut self, node: Node<'_>) {
        let message = format!("\"{}\" requires WHERE clause", self.statement);
        self.findings
            .report(Code::STATEMENT_NO_WHERE, message, node.span());
    }
}

impl Rule for RequireWhere {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => {
                self.statement = statement.to_string();
                let missing = match statement {
                    Statement::Update(update) => update.selection.is_none(),
                    Statement::Delete(delete) => delete.selection.is_none(),
                    _ => false
                };
                if missing {
                    self.report(node);
                }
            }
            Node::Select(select) if !select.from.is_empty() && select.selection.is_none() => {
                self.report(node);
            }
            _ => {}
        }
        Ok(())
    }
}

/// `*` or `t.*` in a select list.
pub struct NoSelectAll {
    findings:  Findings,
    statement: String
}

impl NoSelectAll {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }
}

impl Rule for NoSelectAll {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::SelectItem(SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)) => {
                let message = format!("\"{}\" uses SELECT all", self.statement);
                self.findings
                    .report(Code::STATEMENT_SELECT_ALL, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }
}

/// LIKE pattern starting with `%`. Reported once per statement.
pub struct NoLeadingWildcardLike {
    findings:  Findings,
    statement: String,
    reported:  bool
}

impl NoLeadingWildcardLike {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new(),
            reported:  false
        }
    }
}

impl Rule for NoLeadingWildcardLike {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => {
                self.statement = statement.to_string();
                self.reported = false;
            }
            Node::Expression(Expr::Like { pattern, .. } | Expr::ILike { pattern, .. })
                if !self.reported
                    && literal_string(pattern).is_some_and(|p| p.starts_with('%')) =>
            {
                self.reported = true;
                let message = format!("\"{}\" uses leading wildcard LIKE", self.statement);
                self.findings
                    .report(Code::STATEMENT_LEADING_WILDCARD_LIKE, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }
}

pub struct DisallowCommit {
    findings: Findings
}

impl DisallowCommit {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for DisallowCommit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        if kind == NodeKind::Commit
            && let Some(statement) = node.statement()
        {
            let message = format!("Commit is not allowed, related statement: \"{}\"", statement);
            self.findings
                .report(Code::STATEMENT_DISALLOW_COMMIT, message, node.span());
        }
        Ok(())
    }
}

pub struct DisallowCreateTableAs {
    findings: Findings
}

impl DisallowCreateTableAs {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for DisallowCreateTableAs {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(Statement::CreateTable(create)) = node
            && create.query.is_some()
        {
            let message = format!(
                "Table `{}` is created from a query result with CREATE TABLE ... AS",
                object_name(&create.name)
            );
            self.findings
                .report(Code::STATEMENT_CREATE_TABLE_AS, message, node.span());
        }
        Ok(())
    }
}

/// LIMIT on UPDATE, DELETE and INSERT ... SELECT.
pub struct DisallowLimit {
    findings: Findings
}

impl DisallowLimit {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for DisallowLimit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement) = node else {
            return Ok(());
        };
        let (code, verb) = match statement {
            Statement::Update(update) if update.limit.is_some() => {
                (Code::UPDATE_USE_LIMIT, "UPDATE")
            }
            Statement::Delete(delete) if delete.limit.is_some() => {
                (Code::DELETE_USE_LIMIT, "DELETE")
            }
            Statement::Insert(insert)
                if insert
                    .source
                    .as_ref()
                    .is_some_and(|q| q.limit_clause.is_some()) =>
            {
                (Code::INSERT_USE_LIMIT, "INSERT")
            }
            _ => return Ok(())
        };
        let message = format!("LIMIT clause in {} statement: \"{}\"", verb, statement);
        self.findings.report(code, message, node.span());
        Ok(())
    }
}

/// ORDER BY on DELETE.
pub struct DisallowOrderBy {
    findings: Findings
}

impl DisallowOrderBy {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for DisallowOrderBy {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement @ Statement::Delete(delete)) = node
            && !delete.order_by.is_empty()
        {
            let message = format!("ORDER BY clause in DELETE statement: \"{}\"", statement);
            self.findings
                .report(Code::DELETE_USE_ORDER_BY, message, node.span());
        }
        Ok(())
    }
}

struct AlterTally {
    name:  String,
    count: usize,
    line:  u64
}

/// Several ALTER TABLE statements on the same table. Reported from
/// `finalize`, once per table, at the last ALTER.
pub struct MergeAlterTable {
    findings: Findings,
    tables:   IndexMap<CompactString, AlterTally>
}

impl MergeAlterTable {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            tables:   IndexMap::new()
        }
    }
}

impl Rule for MergeAlterTable {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(Statement::AlterTable(alter)) = node {
            let name = object_name(&alter.name);
            let line = self.findings.line_of(node.span());
            let tally = self
                .tables
                .entry(table_key(&name))
                .or_insert_with(|| AlterTally {
                    name,
                    count: 0,
                    line
                });
            tally.count += 1;
            tally.line = line;
        }
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        for tally in self.tables.values().filter(|t| t.count > 1) {
            self.findings.report_at_line(
                Code::STATEMENT_REDUNDANT_ALTER_TABLE,
                format!(
                    "There are {} statements to modify table `{}`",
                    tally.count, tally.name
                ),
                tally.line
            );
        }
        Ok(())
    }
}

/// INSERT ... VALUES with more rows than the configured limit.
pub struct InsertRowLimit {
    findings: Findings,
    limit:    i64
}

impl InsertRowLimit {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            limit:    ctx.payload.number().unwrap_or_default()
        }
    }
}

impl Rule for InsertRowLimit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement @ Statement::Insert(insert)) = node
            && let Some(source) = &insert.source
            && let SetExpr::Values(values) = source.body.as_ref()
            && values.rows.len() as i64 > self.limit
        {
            let message = format!(
                "\"{}\" inserts {} rows. The count exceeds {}.",
                statement,
                values.rows.len(),
                self.limit
            );
            self.findings
                .report(Code::INSERT_TOO_MANY_ROWS, message, node.span());
        }
        Ok(())
    }
}

pub struct InsertMustSpecifyColumn {
    findings: Findings
}

impl InsertMustSpecifyColumn {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for InsertMustSpecifyColumn {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement @ Statement::Insert(insert)) = node
            && insert.columns.is_empty()
            && insert.assignments.is_empty()
        {
            let message = format!(
                "The INSERT statement must specify columns but \"{}\" does not",
                statement
            );
            self.findings
                .report(Code::INSERT_NOT_SPECIFY_COLUMN, message, node.span());
        }
        Ok(())
    }
}

pub struct InsertDisallowOrderByRand {
    findings: Findings
}

impl InsertDisallowOrderByRand {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx)
        }
    }
}

impl Rule for InsertDisallowOrderByRand {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement @ Statement::Insert(insert)) = node else {
            return Ok(());
        };
        let Some(OrderByKind::Expressions(items)) = insert
            .source
            .as_ref()
            .and_then(|q| q.order_by.as_ref())
            .map(|o| &o.kind)
        else {
            return Ok(());
        };
        let by_rand = items.iter().any(|item| {
            matches!(&item.expr, Expr::Function(f) if function_name(f).eq_ignore_ascii_case("RAND"))
        });
        if by_rand {
            let message = format!("\"{}\" uses ORDER BY RAND in the INSERT statement", statement);
            self.findings
                .report(Code::INSERT_USE_ORDER_BY_RAND, message, node.span());
        }
        Ok(())
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(expr, Expr::Value(v) if v.value == Value::Null)
}

/// `= NULL` / `<> NULL` inside a WHERE clause.
pub struct WhereNoEqualNull {
    findings:    Findings,
    where_depth: usize
}

impl WhereNoEqualNull {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:    Findings::new(ctx),
            where_depth: 0
        }
    }
}

impl Rule for WhereNoEqualNull {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        match node {
            _ if kind == NodeKind::WhereClause => self.where_depth += 1,
            Node::Expression(
                expr @ Expr::BinaryOp {
                    left,
                    op: BinaryOperator::Eq | BinaryOperator::NotEq,
                    right
                }
            ) if self.where_depth > 0 && (is_null(left) || is_null(right)) => {
                let message = format!("WHERE clause contains equal null: {}", expr);
                self.findings
                    .report(Code::STATEMENT_WHERE_NO_EQUAL_NULL, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }

    fn on_exit(&mut self, _node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        if kind == NodeKind::WhereClause {
            self.where_depth = self.where_depth.saturating_sub(1);
        }
        Ok(())
    }
}

pub struct MaximumLimitValue {
    findings: Findings,
    maximum:  i64
}

impl MaximumLimitValue {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            maximum:  ctx.payload.number().unwrap_or_default()
        }
    }
}

impl Rule for MaximumLimitValue {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Limit(expr) = node
            && let Some(value) = literal_number(expr)
            && value > self.maximum
        {
            let message = format!(
                "The limit value {} exceeds the maximum allowed value {}",
                value, self.maximum
            );
            self.findings
                .report(Code::STATEMENT_EXCEED_MAXIMUM_LIMIT_VALUE, message, node.span());
        }
        Ok(())
    }
}

/// Too many joins in a single SELECT.
pub struct MaximumJoinTableCount {
    findings:  Findings,
    maximum:   i64,
    statement: String
}

impl MaximumJoinTableCount {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            maximum:   ctx.payload.number().unwrap_or_default(),
            statement: String::new()
        }
    }
}

impl Rule for MaximumJoinTableCount {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::Select(select) => {
                let joins: usize = select.from.iter().map(|t| t.joins.len()).sum();
                if joins as i64 > self.maximum {
                    let message = format!(
                        "\"{}\" exceeds the maximum number of joins {}",
                        self.statement, self.maximum
                    );
                    self.findings
                        .report(Code::STATEMENT_MAXIMUM_JOIN_TABLE_COUNT, message, node.span());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct LogicalCounts {
    operators:       usize,
    longest_in_list: usize
}

impl LogicalCounts {
    fn collect(&mut self, expr: &Expr) {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And | BinaryOperator::Or,
                right
            } => {
                self.operators += 1;
                self.collect(left);
                self.collect(right);
            }
            Expr::BinaryOp { left, right, .. } => {
                self.collect(left);
                self.collect(right);
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr
            }
            | Expr::Nested(expr) => self.collect(expr),
            Expr::InList { list, .. } => {
                self.longest_in_list = self.longest_in_list.max(list.len());
            }
            _ => {}
        }
    }
}

/// Too many AND/OR operators in one WHERE clause, or an IN list longer than
/// the limit.
pub struct MaximumLogicalOperatorCount {
    findings:  Findings,
    maximum:   i64,
    statement: String
}

impl MaximumLogicalOperatorCount {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            maximum:   ctx.payload.number().unwrap_or_default(),
            statement: String::new()
        }
    }
}

impl Rule for MaximumLogicalOperatorCount {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::Where(expr) => {
                let mut counts = LogicalCounts::default();
                counts.collect(expr);
                if counts.operators as i64 > self.maximum {
                    let message = format!(
                        "Number of tokens ({}) in the OR/AND predicate operation exceeds limit ({}) in statement \"{}\"",
                        counts.operators, self.maximum, self.statement
                    );
                    self.findings.report(
                        Code::STATEMENT_WHERE_MAXIMUM_LOGICAL_OPERATOR_COUNT,
                        message,
                        node.span()
                    );
                }
                if counts.longest_in_list as i64 > self.maximum {
                    let message = format!(
                        "Number of tokens ({}) in IN predicate operation exceeds limit ({}) in statement \"{}\"",
                        counts.longest_in_list, self.maximum, self.statement
                    );
                    self.findings.report(
                        Code::STATEMENT_WHERE_MAXIMUM_LOGICAL_OPERATOR_COUNT,
                        message,
                        node.span()
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn dml_verb(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::InsertStatement => "INSERT",
        NodeKind::UpdateStatement => "UPDATE",
        _ => "DELETE"
    }
}

/// More than one kind of DML in a script. Reported once from `finalize` at
/// the line where the second kind first appeared.
pub struct DisallowMixInDml {
    findings:    Findings,
    kinds:       Vec<NodeKind>,
    second_line: Option<u64>
}

impl DisallowMixInDml {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:    Findings::new(ctx),
            kinds:       Vec::new(),
            second_line: None
        }
    }
}

impl Rule for DisallowMixInDml {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        let is_dml = matches!(
            kind,
            NodeKind::InsertStatement | NodeKind::UpdateStatement | NodeKind::DeleteStatement
        );
        if is_dml && !self.kinds.contains(&kind) {
            self.kinds.push(kind);
            if self.kinds.len() == 2 {
                self.second_line = Some(self.findings.line_of(node.span()));
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        if let Some(line) = self.second_line {
            let verbs: Vec<&str> = self.kinds.iter().map(|k| dml_verb(*k)).collect();
            self.findings.report_at_line(
                Code::STATEMENT_DISALLOW_MIX_DML,
                format!(
                    "Mixing {} statements in one script is not allowed",
                    verbs.join(", ")
                ),
                line
            );
        }
        Ok(())
    }
}

/// ADD COLUMN with FIRST / AFTER.
pub struct AddColumnWithoutPosition {
    findings:  Findings,
    statement: String
}

impl AddColumnWithoutPosition {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }
}

impl Rule for AddColumnWithoutPosition {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::AlterOperation(AlterTableOperation::AddColumn {
                column_position: Some(_),
                ..
            }) => {
                let message = format!("\"{}\" specifies column position", self.statement);
                self.findings
                    .report(Code::STATEMENT_ADD_COLUMN_WITH_POSITION, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct SelectFrame {
    where_depth: usize
}

/// Function calls and arithmetic inside the WHERE clause of a SELECT.
///
/// Each SELECT pushes a frame; only the innermost frame decides. A function
/// in the select list of a subquery inside WHERE is therefore not flagged.
pub struct FunctionsInWhere {
    findings: Findings,
    frames:   Vec<SelectFrame>
}

impl FunctionsInWhere {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            frames:   Vec::new()
        }
    }

    fn inside_where(&self) -> bool {
        self.frames.last().is_some_and(|f| f.where_depth > 0)
    }
}

impl Rule for FunctionsInWhere {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        match (kind, node) {
            (NodeKind::Select, _) => self.frames.push(SelectFrame::default()),
            (NodeKind::WhereClause, _) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.where_depth += 1;
                }
            }
            (NodeKind::FunctionCall, Node::Expression(Expr::Function(function)))
                if self.inside_where() =>
            {
                let message = format!(
                    "Calling function '{}' in WHERE clause is not allowed",
                    function_name(function)
                );
                self.findings.report(
                    Code::STATEMENT_DISALLOW_FUNCTIONS_AND_CALCULATIONS,
                    message,
                    node.span()
                );
            }
            (
                NodeKind::Expression,
                Node::Expression(Expr::BinaryOp {
                    op:
                        BinaryOperator::Plus
                        | BinaryOperator::Minus
                        | BinaryOperator::Multiply
                        | BinaryOperator::Divide
                        | BinaryOperator::Modulo,
                    ..
                })
            ) if self.inside_where() => {
                self.findings.report(
                    Code::STATEMENT_DISALLOW_FUNCTIONS_AND_CALCULATIONS,
                    "Performing calculations in WHERE clause is not allowed",
                    node.span()
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn on_exit(&mut self, _node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        match kind {
            NodeKind::Select => {
                if self.frames.pop().is_none() {
                    return Err(rule_failure(self.name(), "SELECT exit without matching enter"));
                }
            }
            NodeKind::WhereClause => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.where_depth = frame.where_depth.saturating_sub(1);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        if self.frames.is_empty() {
            Ok(())
        } else {
            let open = self.frames.len();
            self.frames.clear();
            Err(rule_failure(
                self.name(),
                format!("{} SELECT frame(s) still open after the walk", open)
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatcher::Dispatcher,
        query::{SqlDialect, parse_script},
        rules::{RuleConfig, RuleEnv, RuleLevel}
    };

    fn run(rule_type: RuleType, payload: Option<serde_json::Value>, sql: &str) -> Vec<Code> {
        let mut config = RuleConfig::new(rule_type, RuleLevel::Warning);
        config.payload = payload.or_else(|| rule_type.default_payload());
        let rules = RuleRegistry::builtin()
            .build_all(&[config], &RuleEnv::default())
            .unwrap();
        let statements = parse_script(sql, SqlDialect::MySQL).unwrap();
        let mut dispatcher = Dispatcher::new(rules);
        for statement in &statements {
            dispatcher.set_offsets(statement.base_line, statement.column_offset);
            dispatcher.walk(&statement.tree);
        }
        dispatcher.finalize();
        dispatcher
            .collect_diagnostics()
            .into_iter()
            .map(|d| d.code)
            .collect()
    }

    #[test]
    fn test_require_where() {
        assert_eq!(
            run(RuleType::StatementRequireWhere, None, "DELETE FROM t"),
            [Code::STATEMENT_NO_WHERE]
        );
        assert!(run(RuleType::StatementRequireWhere, None, "SELECT 1").is_empty());
        assert!(
            run(RuleType::StatementRequireWhere, None, "UPDATE t SET a = 1 WHERE id = 2").is_empty()
        );
    }

    #[test]
    fn test_leading_wildcard_reported_once_per_statement() {
        let codes = run(
            RuleType::StatementNoLeadingWildcardLike,
            None,
            "SELECT a FROM t WHERE a LIKE '%x' OR b LIKE '%y'"
        );
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn test_disallow_limit_codes() {
        assert_eq!(
            run(RuleType::StatementDisallowLimit, None, "UPDATE t SET a = 1 WHERE b = 2 LIMIT 10"),
            [Code::UPDATE_USE_LIMIT]
        );
        assert_eq!(
            run(RuleType::StatementDisallowLimit, None, "DELETE FROM t WHERE b = 2 LIMIT 10"),
            [Code::DELETE_USE_LIMIT]
        );
        assert_eq!(
            run(
                RuleType::StatementDisallowLimit,
                None,
                "INSERT INTO t (a) SELECT a FROM s LIMIT 10"
            ),
            [Code::INSERT_USE_LIMIT]
        );
    }

    #[test]
    fn test_merge_alter_table() {
        let sql = "ALTER TABLE t ADD COLUMN a INT;\nALTER TABLE u ADD COLUMN a INT;\n\
                   ALTER TABLE T ADD COLUMN b INT;";
        assert_eq!(
            run(RuleType::StatementMergeAlterTable, None, sql),
            [Code::STATEMENT_REDUNDANT_ALTER_TABLE]
        );
    }

    #[test]
    fn test_insert_row_limit() {
        let payload = serde_json::json!({ "number": 2 });
        assert_eq!(
            run(
                RuleType::StatementInsertRowLimit,
                Some(payload.clone()),
                "INSERT INTO t (a) VALUES (1), (2), (3)"
            ),
            [Code::INSERT_TOO_MANY_ROWS]
        );
        assert!(
            run(
                RuleType::StatementInsertRowLimit,
                Some(payload),
                "INSERT INTO t (a) VALUES (1), (2)"
            )
            .is_empty()
        );
    }

    #[test]
    fn test_equal_null_only_in_where() {
        assert_eq!(
            run(RuleType::StatementWhereNoEqualNull, None, "SELECT a FROM t WHERE a = NULL"),
            [Code::STATEMENT_WHERE_NO_EQUAL_NULL]
        );
        assert!(
            run(RuleType::StatementWhereNoEqualNull, None, "SELECT a = NULL FROM t").is_empty()
        );
    }

    #[test]
    fn test_logical_operator_count() {
        let payload = serde_json::json!({ "number": 2 });
        assert_eq!(
            run(
                RuleType::StatementWhereMaximumLogicalOperatorCount,
                Some(payload.clone()),
                "SELECT a FROM t WHERE a = 1 OR a = 2 OR a = 3 OR a = 4"
            )
            .len(),
            1
        );
        assert_eq!(
            run(
                RuleType::StatementWhereMaximumLogicalOperatorCount,
                Some(payload),
                "SELECT a FROM t WHERE a IN (1, 2, 3)"
            )
            .len(),
            1
        );
    }

    #[test]
    fn test_functions_in_where() {
        let sql = "SELECT NOW() FROM t WHERE a = 1";
        assert!(
            run(RuleType::StatementWhereDisallowFunctionsAndCalculations, None, sql).is_empty()
        );
        let sql = "SELECT a FROM t WHERE LOWER(b) = 'x' AND c + 1 > 2";
        assert_eq!(
            run(RuleType::StatementWhereDisallowFunctionsAndCalculations, None, sql).len(),
            2
        );
        let sql = "SELECT a FROM t WHERE b IN (SELECT MAX(b) FROM u)";
        assert!(
            run(RuleType::StatementWhereDisallowFunctionsAndCalculations, None, sql).is_empty()
        );
    }

    #[test]
    fn test_mix_dml() {
        let sql = "INSERT INTO t (a) VALUES (1);\nINSERT INTO t (a) VALUES (2);\n\
                   UPDATE t SET a = 1 WHERE a = 2;";
        assert_eq!(
            run(RuleType::StatementDisallowMixInDml, None, sql),
            [Code::STATEMENT_DISALLOW_MIX_DML]
        );
    }
}
