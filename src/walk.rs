//! Depth-first walk over one statement's syntax tree.
//!
//! The walker turns a [`SqlTree`] into an ordered stream of `enter` / `exit`
//! events. Every event carries a borrowed [`Node`] handle and its
//! [`NodeKind`], computed once by [`Node::kind`].
//!
//! ```text
//! CreateTable ─┬─ ColumnDefinition ── Expression (DEFAULT)
//!              ├─ TableConstraint
//!              ├─ TableOption
//!              └─ Query (CREATE TABLE ... AS)
//!
//! SelectStatement ── Query ─┬─ Select ─┬─ SelectItem ── Expression
//!                           │          ├─ TableReference ── Join
//!                           │          ├─ WhereClause ── Expression
//!                           │          └─ Having ── Expression
//!                           ├─ OrderByItem
//!                           └─ Limit
//! ```
//!
//! `enter` fires before a node's children and `exit` after all of them, in
//! document order. The walk only borrows the tree and never fails.
//!
//! # Example
//!
//! ```
//! use sql_advisor::{
//!     query::{SqlDialect, parse_script},
//!     walk::{Node, NodeKind, Visitor, walk}
//! };
//!
//! struct Kinds(Vec<NodeKind>);
//!
//! impl Visitor for Kinds {
//!     fn enter(&mut self, _node: Node<'_>, kind: NodeKind) {
//!         self.0.push(kind);
//!     }
//! }
//!
//! let statements = parse_script("DELETE FROM t WHERE id = 1", SqlDialect::MySQL).unwrap();
//! let mut kinds = Kinds(Vec::new());
//! walk(&statements[0].tree, &mut kinds);
//! assert_eq!(kinds.0[0], NodeKind::DeleteStatement);
//! assert!(kinds.0.contains(&NodeKind::WhereClause));
//! ```

pub mod names;

use serde::Serialize;
use sqlparser::{
    ast::{
        AlterTableOperation, Assignment, ColumnDef, ColumnOption, CreateTableOptions, Delete,
        Expr, FromTable, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Insert,
        Join, JoinConstraint, JoinOperator, LimitClause, OrderByExpr, OrderByKind,
        Query, Select, SelectItem, SetExpr, SqlOption, Statement, TableConstraint, TableFactor,
        TableWithJoins, Update, UpdateTableFromKind
    },
    tokenizer::Span
};

use crate::query::{RoutineDefinition, RoutineKind, SqlTree};

/// Closed set of node kinds seen by rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    SelectStatement,
    InsertStatement,
    UpdateStatement,
    DeleteStatement,
    CreateTable,
    AlterTable,
    CreateIndex,
    CreateView,
    CreateFunction,
    CreateProcedure,
    CreateTrigger,
    CreateEvent,
    CreateDatabase,
    Drop,
    Truncate,
    RenameTable,
    Commit,
    Set,
    Use,
    OtherStatement,
    Query,
    Select,
    SelectItem,
    TableReference,
    Join,
    WhereClause,
    Having,
    OrderByItem,
    Limit,
    Assignment,
    ColumnDefinition,
    TableConstraint,
    TableOption,
    AlterOperation,
    Expression,
    FunctionCall
}

impl NodeKind {
    /// Statement-level kinds are the roots of a walk.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::SelectStatement
                | Self::InsertStatement
                | Self::UpdateStatement
                | Self::DeleteStatement
                | Self::CreateTable
                | Self::AlterTable
                | Self::CreateIndex
                | Self::CreateView
                | Self::CreateFunction
                | Self::CreateProcedure
                | Self::CreateTrigger
                | Self::CreateEvent
                | Self::CreateDatabase
                | Self::Drop
                | Self::Truncate
                | Self::RenameTable
                | Self::Commit
                | Self::Set
                | Self::Use
                | Self::OtherStatement
        )
    }
}

/// Borrowed handle to a node of the tree being walked.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Statement(&'a Statement),
    Routine(&'a RoutineDefinition),
    Query(&'a Query),
    Select(&'a Select),
    SelectItem(&'a SelectItem),
    TableReference(&'a TableFactor),
    Join(&'a Join),
    Where(&'a Expr),
    Having(&'a Expr),
    OrderBy(&'a OrderByExpr),
    Limit(&'a Expr),
    Assignment(&'a Assignment),
    ColumnDefinition(&'a ColumnDef),
    TableConstraint(&'a TableConstraint),
    TableOption(&'a SqlOption),
    AlterOperation(&'a AlterTableOperation),
    Expression(&'a Expr)
}

impl<'a> Node<'a> {
    /// Classify the node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Statement(statement) => statement_kind(statement),
            Self::Routine(routine) => match routine.kind {
                RoutineKind::Procedure => NodeKind::CreateProcedure,
                RoutineKind::Function => NodeKind::CreateFunction,
                RoutineKind::Event => NodeKind::CreateEvent,
                RoutineKind::Trigger => NodeKind::CreateTrigger
            },
            Self::Query(_) => NodeKind::Query,
            Self::Select(_) => NodeKind::Select,
            Self::SelectItem(_) => NodeKind::SelectItem,
            Self::TableReference(_) => NodeKind::TableReference,
            Self::Join(_) => NodeKind::Join,
            Self::Where(_) => NodeKind::WhereClause,
            Self::Having(_) => NodeKind::Having,
            Self::OrderBy(_) => NodeKind::OrderByItem,
            Self::Limit(_) => NodeKind::Limit,
            Self::Assignment(_) => NodeKind::Assignment,
            Self::ColumnDefinition(_) => NodeKind::ColumnDefinition,
            Self::TableConstraint(_) => NodeKind::TableConstraint,
            Self::TableOption(_) => NodeKind::TableOption,
            Self::AlterOperation(_) => NodeKind::AlterOperation,
            Self::Expression(Expr::Function(_)) => NodeKind::FunctionCall,
            Self::Expression(_) => NodeKind::Expression
        }
    }

    /// Source span of the node, local to its statement. Empty when the
    /// parser does not track one.
    pub fn span(&self) -> Span {
        use sqlparser::ast::Spanned;
        match self {
            Self::Statement(statement) => statement.span(),
            Self::Routine(_) => Span::empty(),
            Self::Query(query) => query.span(),
            Self::Select(select) => select.span(),
            Self::SelectItem(item) => item.span(),
            Self::TableReference(table) => table.span(),
            Self::Join(join) => join.span(),
            Self::Where(expr) | Self::Having(expr) | Self::Limit(expr) | Self::Expression(expr) => {
                expr.span()
            }
            Self::OrderBy(item) => item.span(),
            Self::Assignment(assignment) => assignment.span(),
            Self::ColumnDefinition(column) => column.span(),
            Self::TableConstraint(constraint) => constraint.span(),
            Self::TableOption(option) => option.span(),
            Self::AlterOperation(operation) => operation.span()
        }
    }

    pub fn statement(&self) -> Option<&'a Statement> {
        match self {
            Self::Statement(statement) => Some(statement),
            _ => None
        }
    }

    pub fn expr(&self) -> Option<&'a Expr> {
        match self {
            Self::Where(expr)
            | Self::Having(expr)
            | Self::Limit(expr)
            | Self::Expression(expr) => Some(expr),
            _ => None
        }
    }
}

fn statement_kind(statement: &Statement) -> NodeKind {
    match statement {
        Statement::Query(_) => NodeKind::SelectStatement,
        Statement::Insert(_) => NodeKind::InsertStatement,
        Statement::Update(_) => NodeKind::UpdateStatement,
        Statement::Delete(_) => NodeKind::DeleteStatement,
        Statement::CreateTable(_) => NodeKind::CreateTable,
        Statement::AlterTable(_) => NodeKind::AlterTable,
        Statement::CreateIndex(_) => NodeKind::CreateIndex,
        Statement::CreateView(_) => NodeKind::CreateView,
        Statement::CreateFunction(_) => NodeKind::CreateFunction,
        Statement::CreateProcedure { .. } => NodeKind::CreateProcedure,
        Statement::CreateTrigger(_) => NodeKind::CreateTrigger,
        Statement::CreateDatabase { .. } => NodeKind::CreateDatabase,
        Statement::CreateSchema { .. } => NodeKind::CreateDatabase,
        Statement::Drop { .. } => NodeKind::Drop,
        Statement::Truncate(_) => NodeKind::Truncate,
        Statement::RenameTable(_) => NodeKind::RenameTable,
        Statement::Commit { .. } => NodeKind::Commit,
        Statement::Set(_) => NodeKind::Set,
        Statement::Use(_) => NodeKind::Use,
        _ => NodeKind::OtherStatement
    }
}

/// Receiver of walk events.
pub trait Visitor {
    fn enter(&mut self, node: Node<'_>, kind: NodeKind) {
        let _ = (node, kind);
    }

    fn exit(&mut self, node: Node<'_>, kind: NodeKind) {
        let _ = (node, kind);
    }
}

/// Walk one statement tree depth-first, left to right.
pub fn walk<V: Visitor + ?Sized>(tree: &SqlTree, visitor: &mut V) {
    let mut walker = Walker { visitor };
    match tree {
        SqlTree::Statement(statement) => walker.statement(statement),
        SqlTree::Routine(routine) => walker.leaf(Node::Routine(routine))
    }
}

struct Walker<'v, V: ?Sized> {
    visitor: &'v mut V
}

impl<V: Visitor + ?Sized> Walker<'_, V> {
    fn visit(&mut self, node: Node<'_>, children: impl FnOnce(&mut Self)) {
        let kind = node.kind();
        self.visitor.enter(node, kind);
        children(self);
        self.visitor.exit(node, kind);
    }

    fn leaf(&mut self, node: Node<'_>) {
        self.visit(node, |_| {});
    }

    fn statement(&mut self, statement: &Statement) {
        self.visit(Node::Statement(statement), |w| match statement {
            Statement::Query(query) => w.query(query),
            Statement::Insert(insert) => w.insert(insert),
            Statement::Update(update) => w.update(update),
            Statement::Delete(delete) => w.delete(delete),
            Statement::CreateTable(create) => {
                for column in &create.columns {
                    w.column(column);
                }
                for constraint in &create.constraints {
                    w.leaf(Node::TableConstraint(constraint));
                }
                for option in table_options(&create.table_options) {
                    w.leaf(Node::TableOption(option));
                }
                if let Some(query) = &create.query {
                    w.query(query);
                }
            }
            Statement::AlterTable(alter) => {
                for operation in &alter.operations {
                    w.alter_operation(operation);
                }
            }
            Statement::CreateIndex(index) => {
                for column in &index.columns {
                    w.expr(&column.column.expr);
                }
            }
            Statement::CreateView(view) => w.query(&view.query),
            _ => {}
        });
    }

    fn insert(&mut self, insert: &Insert) {
        for assignment in &insert.assignments {
            self.assignment(assignment);
        }
        if let Some(source) = &insert.source {
            self.query(source);
        }
    }

    fn update(&mut self, update: &Update) {
        self.table_with_joins(&update.table);
        for assignment in &update.assignments {
            self.assignment(assignment);
        }
        if let Some(from) = &update.from {
            let tables = match from {
                UpdateTableFromKind::BeforeSet(tables) | UpdateTableFromKind::AfterSet(tables) => {
                    tables
                }
            };
            for table in tables {
                self.table_with_joins(table);
            }
        }
        if let Some(selection) = &update.selection {
            self.where_clause(selection);
        }
        if let Some(limit) = &update.limit {
            self.limit(limit);
        }
    }

    fn delete(&mut self, delete: &Delete) {
        let from = match &delete.from {
            FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables
        };
        for table in from {
            self.table_with_joins(table);
        }
        for table in delete.using.iter().flatten() {
            self.table_with_joins(table);
        }
        if let Some(selection) = &delete.selection {
            self.where_clause(selection);
        }
        for item in &delete.order_by {
            self.order_by(item);
        }
        if let Some(limit) = &delete.limit {
            self.limit(limit);
        }
    }

    fn assignment(&mut self, assignment: &Assignment) {
        self.visit(Node::Assignment(assignment), |w| w.expr(&assignment.value));
    }

    fn column(&mut self, column: &ColumnDef) {
        self.visit(Node::ColumnDefinition(column), |w| {
            for option in &column.options {
                match &option.option {
                    ColumnOption::Default(expr) | ColumnOption::OnUpdate(expr) => w.expr(expr),
                    ColumnOption::Generated {
                        generation_expr: Some(expr),
                        ..
                    } => w.expr(expr),
                    _ => {}
                }
            }
        });
    }

    fn alter_operation(&mut self, operation: &AlterTableOperation) {
        self.visit(Node::AlterOperation(operation), |w| match operation {
            AlterTableOperation::AddColumn { column_def, .. } => w.column(column_def),
            AlterTableOperation::AddConstraint { constraint, .. } => {
                w.leaf(Node::TableConstraint(constraint))
            }
            _ => {}
        });
    }

    fn query(&mut self, query: &Query) {
        self.visit(Node::Query(query), |w| {
            if let Some(with) = &query.with {
                for cte in &with.cte_tables {
                    w.query(&cte.query);
                }
            }
            w.set_expr(&query.body);
            if let Some(order_by) = &query.order_by
                && let OrderByKind::Expressions(items) = &order_by.kind
            {
                for item in items {
                    w.order_by(item);
                }
            }
            match &query.limit_clause {
                Some(LimitClause::LimitOffset {
                    limit: Some(limit), ..
                }) => w.limit(limit),
                Some(LimitClause::OffsetCommaLimit { limit, .. }) => w.limit(limit),
                _ => {}
            }
        });
    }

    fn set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => self.select(select),
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left);
                self.set_expr(right);
            }
            SetExpr::Values(values) => {
                for expr in values.rows.iter().flatten() {
                    self.expr(expr);
                }
            }
            SetExpr::Insert(statement)
            | SetExpr::Update(statement)
            | SetExpr::Delete(statement)
            | SetExpr::Merge(statement) => self.statement(statement),
            SetExpr::Table(_) => {}
        }
    }

    fn select(&mut self, select: &Select) {
        self.visit(Node::Select(select), |w| {
            for item in &select.projection {
                w.visit(Node::SelectItem(item), |w| match item {
                    SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                        w.expr(expr)
                    }
                    _ => {}
                });
            }
            for table in &select.from {
                w.table_with_joins(table);
            }
            if let Some(selection) = &select.selection {
                w.where_clause(selection);
            }
            if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
                for expr in exprs {
                    w.expr(expr);
                }
            }
            if let Some(having) = &select.having {
                w.visit(Node::Having(having), |w| w.expr(having));
            }
        });
    }

    fn table_with_joins(&mut self, table: &TableWithJoins) {
        self.table_factor(&table.relation);
        for join in &table.joins {
            self.visit(Node::Join(join), |w| {
                w.table_factor(&join.relation);
                if let Some(JoinConstraint::On(expr)) = join_constraint(&join.join_operator) {
                    w.expr(expr);
                }
            });
        }
    }

    fn table_factor(&mut self, factor: &TableFactor) {
        self.visit(Node::TableReference(factor), |w| match factor {
            TableFactor::Derived { subquery, .. } => w.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => w.table_with_joins(table_with_joins),
            _ => {}
        });
    }

    fn where_clause(&mut self, expr: &Expr) {
        self.visit(Node::Where(expr), |w| w.expr(expr));
    }

    fn order_by(&mut self, item: &OrderByExpr) {
        self.visit(Node::OrderBy(item), |w| w.expr(&item.expr));
    }

    fn limit(&mut self, expr: &Expr) {
        self.visit(Node::Limit(expr), |w| w.expr(expr));
    }

    fn expr(&mut self, expr: &Expr) {
        self.visit(Node::Expression(expr), |w| w.expr_children(expr));
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    fn expr_children(&mut self, expr: &Expr) {
        match expr {
            Expr::IsFalse(e)
            | Expr::IsNotFalse(e)
            | Expr::IsTrue(e)
            | Expr::IsNotTrue(e)
            | Expr::IsNull(e)
            | Expr::IsNotNull(e)
            | Expr::IsUnknown(e)
            | Expr::IsNotUnknown(e)
            | Expr::Nested(e)
            | Expr::OuterJoin(e)
            | Expr::Prior(e)
            | Expr::UnaryOp { expr: e, .. }
            | Expr::Cast { expr: e, .. }
            | Expr::Convert { expr: e, .. }
            | Expr::Extract { expr: e, .. }
            | Expr::Ceil { expr: e, .. }
            | Expr::Floor { expr: e, .. }
            | Expr::Collate { expr: e, .. }
            | Expr::Named { expr: e, .. }
            | Expr::IsNormalized { expr: e, .. }
            | Expr::Prefixed { value: e, .. } => self.expr(e),
            Expr::IsDistinctFrom(a, b) | Expr::IsNotDistinctFrom(a, b) => {
                self.expr(a);
                self.expr(b);
            }
            Expr::BinaryOp { left, right, .. }
            | Expr::AnyOp { left, right, .. }
            | Expr::AllOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::InList { expr, list, .. } => {
                self.expr(expr);
                self.exprs(list);
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.expr(expr);
                self.query(subquery);
            }
            Expr::InUnnest {
                expr, array_expr, ..
            } => {
                self.expr(expr);
                self.expr(array_expr);
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.expr(expr);
                self.expr(low);
                self.expr(high);
            }
            Expr::Like { expr, pattern, .. }
            | Expr::ILike { expr, pattern, .. }
            | Expr::SimilarTo { expr, pattern, .. }
            | Expr::RLike { expr, pattern, .. } => {
                self.expr(expr);
                self.expr(pattern);
            }
            Expr::AtTimeZone {
                timestamp,
                time_zone
            } => {
                self.expr(timestamp);
                self.expr(time_zone);
            }
            Expr::Position { expr, r#in } => {
                self.expr(expr);
                self.expr(r#in);
            }
            Expr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                self.expr(expr);
                if let Some(from) = substring_from {
                    self.expr(from);
                }
                if let Some(length) = substring_for {
                    self.expr(length);
                }
            }
            Expr::Trim {
                expr, trim_what, ..
            } => {
                if let Some(what) = trim_what {
                    self.expr(what);
                }
                self.expr(expr);
            }
            Expr::Function(function) => {
                if let FunctionArguments::List(list) = &function.args {
                    for arg in &list.args {
                        let arg_expr = match arg {
                            FunctionArg::Named { arg, .. }
                            | FunctionArg::ExprNamed { arg, .. }
                            | FunctionArg::Unnamed(arg) => arg
                        };
                        if let FunctionArgExpr::Expr(e) = arg_expr {
                            self.expr(e);
                        }
                    }
                }
                if let FunctionArguments::Subquery(query) = &function.args {
                    self.query(query);
                }
                if let Some(filter) = &function.filter {
                    self.expr(filter);
                }
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.expr(operand);
                }
                for when in conditions {
                    self.expr(&when.condition);
                    self.expr(&when.result);
                }
                if let Some(else_result) = else_result {
                    self.expr(else_result);
                }
            }
            Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => self.query(subquery),
            Expr::Tuple(items) => self.exprs(items),
            Expr::GroupingSets(sets) | Expr::Cube(sets) | Expr::Rollup(sets) => {
                for set in sets {
                    self.exprs(set);
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn table_options(options: &CreateTableOptions) -> &[SqlOption] {
    match options {
        CreateTableOptions::None => &[],
        CreateTableOptions::With(options)
        | CreateTableOptions::Options(options)
        | CreateTableOptions::Plain(options)
        | CreateTableOptions::TableProperties(options) => options
    }
}

fn join_constraint(operator: &JoinOperator) -> Option<&JoinConstraint> {
    match operator {
        JoinOperator::Join(c)
        | JoinOperator::Inner(c)
        | JoinOperator::Left(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::Right(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::CrossJoin(c)
        | JoinOperator::Semi(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::Anti(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::RightAnti(c)
        | JoinOperator::StraightJoin(c) => Some(c),
        JoinOperator::AsOf { constraint, .. } => Some(constraint),
        JoinOperator::CrossApply | JoinOperator::OuterApply => None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SqlDialect, parse_script};

    #[derive(Default)]
    struct Trace(Vec<(bool, NodeKind)>);

    impl Visitor for Trace {
        fn enter(&mut self, _node: Node<'_>, kind: NodeKind) {
            self.0.push((true, kind));
        }

        fn exit(&mut self, _node: Node<'_>, kind: NodeKind) {
            self.0.push((false, kind));
        }
    }

    fn trace(sql: &str) -> Vec<(bool, NodeKind)> {
        let statements = parse_script(sql, SqlDialect::MySQL).unwrap();
        let mut trace = Trace::default();
        walk(&statements[0].tree, &mut trace);
        trace.0
    }

    #[test]
    fn test_enter_and_exit_are_balanced() {
        let events = trace("SELECT a, COUNT(*) FROM t JOIN u ON t.id = u.id WHERE a > 1");
        let mut stack = Vec::new();
        for (enter, kind) in events {
            if enter {
                stack.push(kind);
            } else {
                assert_eq!(stack.pop(), Some(kind));
            }
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_statement_is_first_and_last() {
        let events = trace("UPDATE t SET a = 1 WHERE id = 2 LIMIT 1");
        assert_eq!(events.first(), Some(&(true, NodeKind::UpdateStatement)));
        assert_eq!(events.last(), Some(&(false, NodeKind::UpdateStatement)));
        assert!(events.contains(&(true, NodeKind::Limit)));
        assert!(events.contains(&(true, NodeKind::Assignment)));
    }

    #[test]
    fn test_function_call_tagged() {
        let events = trace("SELECT id FROM t WHERE LOWER(name) = 'x'");
        assert!(events.contains(&(true, NodeKind::FunctionCall)));
    }

    #[test]
    fn test_create_table_children() {
        let events = trace("CREATE TABLE t (id INT, PRIMARY KEY (id)) ENGINE=InnoDB");
        let entered: Vec<NodeKind> = events.iter().filter(|e| e.0).map(|e| e.1).collect();
        assert_eq!(
            entered,
            vec![
                NodeKind::CreateTable,
                NodeKind::ColumnDefinition,
                NodeKind::TableConstraint,
                NodeKind::TableOption
            ]
        );
    }

    #[test]
    fn test_routine_is_single_node() {
        let events = trace("CREATE EVENT e ON SCHEDULE EVERY 1 DAY DO DELETE FROM t");
        assert_eq!(
            events,
            vec![(true, NodeKind::CreateEvent), (false, NodeKind::CreateEvent)]
        );
    }
}
