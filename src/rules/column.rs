//! Column rules: definitions in CREATE TABLE / ADD COLUMN and column changes
//! in ALTER TABLE.

use std::sync::Arc;

use sqlparser::ast::{
    AlterColumnOperation, AlterTableOperation, ColumnOption, Statement
};

use super::{
    ColumnView, CommentConvention, Findings, Rule, RuleContext, RuleEnv, RulePayload,
    RuleRegistry, RuleType, comment_violations, ddl_table
};
use crate::{
    catalog::Snapshots,
    diagnostic::Code,
    error::AppResult,
    walk::{
        Node, NodeKind,
        names::{
            TableOptionKind, char_length, column_comment, column_charset,
            default_value, is_auto_increment, is_char, is_current_time, is_integer, is_not_null,
            is_unsigned, is_varchar, table_option, type_name
        }
    }
};

pub(super) fn register(registry: &mut RuleRegistry) {
    registry.register(RuleType::ColumnRequired, |ctx, _| Ok(Box::new(RequiredColumns::new(ctx))));
    registry.register(RuleType::ColumnNoNull, |ctx, _| Ok(Box::new(NoNull::new(ctx))));
    registry.register(RuleType::ColumnDisallowChangeType, |ctx, env| {
        Ok(Box::new(DisallowChangeType::new(ctx, env)))
    });
    registry.register(RuleType::ColumnSetDefaultForNotNull, |ctx, _| {
        Ok(Box::new(DefaultForNotNull::new(ctx)))
    });
    registry.register(RuleType::ColumnDisallowChange, |ctx, _| {
        Ok(Box::new(DisallowChange::new(ctx)))
    });
    registry.register(RuleType::ColumnDisallowChangingOrder, |ctx, _| {
        Ok(Box::new(DisallowChangingOrder::new(ctx)))
    });
    registry.register(RuleType::ColumnAutoIncrementMustInteger, |ctx, _| {
        Ok(Box::new(AutoIncrementShape::integer(ctx)))
    });
    registry.register(RuleType::ColumnAutoIncrementMustUnsigned, |ctx, _| {
        Ok(Box::new(AutoIncrementShape::unsigned(ctx)))
    });
    registry.register(RuleType::ColumnTypeDisallowList, |ctx, _| {
        Ok(Box::new(TypeDisallowList::new(ctx)))
    });
    registry.register(RuleType::ColumnDisallowSetCharset, |ctx, _| {
        Ok(Box::new(DisallowSetCharset::new(ctx)))
    });
    registry.register(RuleType::ColumnMaximumCharacterLength, |ctx, _| {
        Ok(Box::new(MaximumLength::char(ctx)))
    });
    registry.register(RuleType::ColumnMaximumVarcharLength, |ctx, _| {
        Ok(Box::new(MaximumLength::varchar(ctx)))
    });
    registry.register(RuleType::ColumnAutoIncrementInitialValue, |ctx, _| {
        Ok(Box::new(AutoIncrementInitialValue::new(ctx)))
    });
    registry.register(RuleType::ColumnCurrentTimeCountLimit, |ctx, _| {
        Ok(Box::new(CurrentTimeCountLimit::new(ctx)))
    });
    registry.register(RuleType::ColumnRequireDefault, |ctx, _| {
        Ok(Box::new(RequireDefault::new(ctx)))
    });
    registry.register(RuleType::ColumnComment, |ctx, env| {
        Ok(Box::new(ColumnComment::new(ctx, env)))
    });
    registry.register(RuleType::ColumnDisallowDropInIndex, |ctx, env| {
        Ok(Box::new(DisallowDrop::in_index(ctx, env)))
    });
    registry.register(RuleType::ColumnDisallowDrop, |ctx, _| {
        Ok(Box::new(DisallowDrop::any(ctx)))
    });
}

/// Types that cannot carry a literal default in MySQL.
fn default_exempt(type_name: &str) -> bool {
    matches!(
        type_name,
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT"
            | "LONGTEXT" | "JSON" | "GEOMETRY" | "POINT" | "LINESTRING" | "POLYGON"
    )
}

fn is_primary_key(options: &[&ColumnOption]) -> bool {
    options
        .iter()
        .any(|o| matches!(o, ColumnOption::PrimaryKey(_)))
}

/// Columns listed in the payload must exist and must not be dropped or
/// renamed away.
pub struct RequiredColumns {
    findings: Findings,
    required: Vec<String>
}

impl RequiredColumns {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            required: ctx.payload.lower_list()
        }
    }

    fn is_required(&self, column: &str) -> bool {
        self.required.contains(&column.to_lowercase())
    }

    fn report(&mut self, table: &str, missing: &[&str], node: Node<'_>) {
        let message = format!(
            "Table `{}` requires columns: {}",
            table,
            missing.join(", ")
        );
        self.findings
            .report(Code::NO_REQUIRED_COLUMN, message, node.span());
    }
}

impl Rule for RequiredColumns {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let Node::Statement(statement) = node else {
            return Ok(());
        };
        let table = ddl_table(statement).unwrap_or_default();
        match statement {
            Statement::CreateTable(create) if create.query.is_none() && create.like.is_none() => {
                let missing: Vec<String> = self
                    .required
                    .iter()
                    .filter(|r| {
                        !create
                            .columns
                            .iter()
                            .any(|c| c.name.value.eq_ignore_ascii_case(r))
                    })
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    let missing: Vec<&str> = missing.iter().map(String::as_str).collect();
                    self.report(&table, &missing, node);
                }
            }
            Statement::AlterTable(alter) => {
                let mut removed = Vec::new();
                for operation in &alter.operations {
                    match operation {
                        AlterTableOperation::DropColumn { column_names, .. } => removed.extend(
                            column_names
                                .iter()
                                .filter(|c| self.is_required(&c.value))
                                .map(|c| c.value.clone())
                        ),
                        AlterTableOperation::RenameColumn {
                            old_column_name,
                            new_column_name
                        } if self.is_required(&old_column_name.value)
                            && !old_column_name
                                .value
                                .eq_ignore_ascii_case(&new_column_name.value) =>
                        {
                            removed.push(old_column_name.value.clone())
                        }
                        AlterTableOperation::ChangeColumn {
                            old_name, new_name, ..
                        } if self.is_required(&old_name.value)
                            && !old_name.value.eq_ignore_ascii_case(&new_name.value) =>
                        {
                            removed.push(old_name.value.clone())
                        }
                        _ => {}
                    }
                }
                if !removed.is_empty() {
                    let removed: Vec<&str> = removed.iter().map(String::as_str).collect();
                    self.report(&table, &removed, node);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Columns must be NOT NULL.
pub struct NoNull {
    findings: Findings,
    table:    String
}

impl NoNull {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            table:    String::new()
        }
    }
}

impl Rule for NoNull {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Some(column) = ColumnView::from_node(node)
            && !is_not_null(&column.options)
        {
            let message =
                format!("`{}`.`{}` cannot have NULL value", self.table, column.name.value);
            self.findings
                .report(Code::COLUMN_CANNOT_NULL, message, node.span());
        }
        Ok(())
    }
}

/// CHANGE / MODIFY / ALTER COLUMN ... TYPE to a type other than the one in
/// the origin catalog.
pub struct DisallowChangeType {
    findings:  Findings,
    snapshots: Option<Arc<Snapshots>>,
    table:     String,
    statement: String
}

impl DisallowChangeType {
    pub fn new(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self {
            findings:  Findings::new(ctx),
            snapshots: env.snapshots.clone(),
            table:     String::new(),
            statement: String::new()
        }
    }

    fn origin_type(&self, column: &str) -> Option<String> {
        let table = self.snapshots.as_ref()?.origin_table(&self.table)?;
        Some(table.column(column)?.data_type.clone())
    }
}

fn normalize_type(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

impl Rule for DisallowChangeType {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        let (column, new_type) = match node {
            Node::Statement(statement) => {
                self.table = ddl_table(statement).unwrap_or_default();
                self.statement = statement.to_string();
                return Ok(());
            }
            Node::AlterOperation(AlterTableOperation::ChangeColumn {
                old_name,
                data_type,
                ..
            }) => (old_name, data_type),
            Node::AlterOperation(AlterTableOperation::ModifyColumn {
                col_name,
                data_type,
                ..
            }) => (col_name, data_type),
            Node::AlterOperation(AlterTableOperation::AlterColumn {
                column_name,
                op: AlterColumnOperation::SetDataType { data_type, .. }
            }) => (column_name, data_type),
            _ => return Ok(())
        };
        if let Some(old_type) = self.origin_type(&column.value)
            && normalize_type(&old_type) != normalize_type(&new_type.to_string())
        {
            let message = format!("\"{}\" changes column type", self.statement);
            self.findings
                .report(Code::CHANGE_COLUMN_TYPE, message, node.span());
        }
        Ok(())
    }
}

/// NOT NULL columns need a DEFAULT, except keys, auto-increment columns and
/// types that cannot have one.
pub struct DefaultForNotNull {
    findings: Findings,
    table:    String
}

impl DefaultForNotNull {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            table:    String::new()
        }
    }
}

impl Rule for DefaultForNotNull {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Some(column) = ColumnView::from_node(node)
            && is_not_null(&column.options)
            && default_value(&column.options).is_none()
            && !is_primary_key(&column.options)
            && !is_auto_increment(&column.options)
            && !default_exempt(&type_name(column.data_type))
        {
            let message = format!(
                "Column `{}`.`{}` is NOT NULL but doesn't have DEFAULT",
                self.table, column.name.value
            );
            self.findings
                .report(Code::NOT_NULL_COLUMN_WITH_NO_DEFAULT, message, node.span());
        }
        Ok(())
    }
}

pub struct DisallowChange {
    findings:  Findings,
    statement: String
}

impl DisallowChange {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }
}

impl Rule for DisallowChange {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::AlterOperation(AlterTableOperation::ChangeColumn { .. }) => {
                let message = format!("\"{}\" contains CHANGE COLUMN statement", self.statement);
                self.findings
                    .report(Code::USE_CHANGE_COLUMN_STATEMENT, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }
}

/// FIRST / AFTER on ADD, CHANGE or MODIFY COLUMN.
pub struct DisallowChangingOrder {
    findings:  Findings,
    statement: String
}

impl DisallowChangingOrder {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            statement: String::new()
        }
    }
}

impl Rule for DisallowChangingOrder {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.statement = statement.to_string(),
            Node::AlterOperation(
                AlterTableOperation::AddColumn {
                    column_position: Some(_),
                    ..
                }
                | AlterTableOperation::ChangeColumn {
                    column_position: Some(_),
                    ..
                }
                | AlterTableOperation::ModifyColumn {
                    column_position: Some(_),
                    ..
                }
            ) => {
                let message = format!("\"{}\" changes column order", self.statement);
                self.findings
                    .report(Code::CHANGE_COLUMN_ORDER, message, node.span());
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum AutoIncrementCheck {
    Integer,
    Unsigned
}

/// Auto-increment columns must be integers, or unsigned.
pub struct AutoIncrementShape {
    findings: Findings,
    check:    AutoIncrementCheck,
    table:    String
}

impl AutoIncrementShape {
    pub fn integer(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            check:    AutoIncrementCheck::Integer,
            table:    String::new()
        }
    }

    pub fn unsigned(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            check:    AutoIncrementCheck::Unsigned,
            table:    String::new()
        }
    }
}

impl Rule for AutoIncrementShape {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
            return Ok(());
        }
        let Some(column) = ColumnView::from_node(node) else {
            return Ok(());
        };
        if !is_auto_increment(&column.options) {
            return Ok(());
        }
        let (code, message) = match self.check {
            AutoIncrementCheck::Integer if !is_integer(column.data_type) => (
                Code::AUTO_INCREMENT_COLUMN_NOT_INTEGER,
                format!(
                    "Auto-increment column `{}`.`{}` requires integer type",
                    self.table, column.name.value
                )
            ),
            AutoIncrementCheck::Unsigned if !is_unsigned(column.data_type) => (
                Code::AUTO_INCREMENT_COLUMN_SIGNED,
                format!(
                    "Auto-increment column `{}`.`{}` is not UNSIGNED type",
                    self.table, column.name.value
                )
            ),
            _ => return Ok(())
        };
        self.findings.report(code, message, node.span());
        Ok(())
    }
}

pub struct TypeDisallowList {
    findings:   Findings,
    disallowed: Vec<String>,
    table:      String
}

impl TypeDisallowList {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings:   Findings::new(ctx),
            disallowed: ctx.payload.upper_list(),
            table:      String::new()
        }
    }
}

impl Rule for TypeDisallowList {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Some(column) = ColumnView::from_node(node) {
            let name = type_name(column.data_type);
            if self.disallowed.contains(&name) {
                let message = format!(
                    "Disallow column type {} but column `{}`.`{}` is",
                    name, self.table, column.name.value
                );
                self.findings
                    .report(Code::DISABLED_COLUMN_TYPE, message, node.span());
            }
        }
        Ok(())
    }
}

pub struct DisallowSetCharset {
    findings: Findings,
    table:    String
}

impl DisallowSetCharset {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            table:    String::new()
        }
    }
}

impl Rule for DisallowSetCharset {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Some(column) = ColumnView::from_node(node)
            && let Some(charset) = column_charset(&column.options)
        {
            let message = format!(
                "Disallow set column charset but `{}`.`{}` sets charset {}",
                self.table, column.name.value, charset
            );
            self.findings
                .report(Code::SET_COLUMN_CHARSET, message, node.span());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum CharKind {
    Char,
    Varchar
}

/// Declared CHAR / VARCHAR length above the limit.
pub struct MaximumLength {
    findings: Findings,
    kind:     CharKind,
    maximum:  i64,
    table:    String
}

impl MaximumLength {
    pub fn char(ctx: &RuleContext) -> Self {
        Self::new(ctx, CharKind::Char)
    }

    pub fn varchar(ctx: &RuleContext) -> Self {
        Self::new(ctx, CharKind::Varchar)
    }

    fn new(ctx: &RuleContext, kind: CharKind) -> Self {
        Self {
            findings: Findings::new(ctx),
            kind,
            maximum: ctx.payload.number().unwrap_or_default(),
            table: String::new()
        }
    }
}

impl Rule for MaximumLength {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
            return Ok(());
        }
        let Some(column) = ColumnView::from_node(node) else {
            return Ok(());
        };
        let (matches, code, label) = match self.kind {
            CharKind::Char => (is_char(column.data_type), Code::CHAR_LENGTH_EXCEEDS_LIMIT, "CHAR"),
            CharKind::Varchar => (
                is_varchar(column.data_type),
                Code::VARCHAR_LENGTH_EXCEEDS_LIMIT,
                "VARCHAR"
            )
        };
        if self.maximum > 0
            && matches
            && let Some(length) = char_length(column.data_type)
            && length as i64 > self.maximum
        {
            let message = format!(
                "The length of the {} column `{}.{}` is {}, bigger than {}",
                label, self.table, column.name.value, length, self.maximum
            );
            self.findings.report(code, message, node.span());
        }
        Ok(())
    }
}

/// Table-level AUTO_INCREMENT initial value must equal the payload.
pub struct AutoIncrementInitialValue {
    findings: Findings,
    expected: i64,
    table:    String
}

impl AutoIncrementInitialValue {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            expected: ctx.payload.number().unwrap_or_default(),
            table:    String::new()
        }
    }

    fn check(&mut self, value: &str, node: Node<'_>) {
        if value.trim().parse::<i64>().ok() != Some(self.expected) {
            let message = format!(
                "The initial auto-increment value in table `{}` is {}, which doesn't equal {}",
                self.table,
                value.trim(),
                self.expected
            );
            self.findings.report(
                Code::AUTO_INCREMENT_COLUMN_INITIAL_VALUE_NOT_MATCH,
                message,
                node.span()
            );
        }
    }
}

impl Rule for AutoIncrementInitialValue {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.table = ddl_table(statement).unwrap_or_default(),
            Node::TableOption(option) => {
                if let Some((TableOptionKind::AutoIncrement, value)) = table_option(option) {
                    self.check(&value, node);
                }
            }
            Node::AlterOperation(AlterTableOperation::AutoIncrement { value, .. }) => {
                self.check(&value.to_string(), node);
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct CurrentTimeTally {
    defaults:  usize,
    on_update: usize
}

/// At most two columns per table statement may default to, or update on,
/// the current time.
pub struct CurrentTimeCountLimit {
    findings: Findings,
    tally:    CurrentTimeTally,
    table:    String
}

const CURRENT_TIME_COLUMN_LIMIT: usize = 2;

impl CurrentTimeCountLimit {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            tally:    CurrentTimeTally::default(),
            table:    String::new()
        }
    }
}

impl Rule for CurrentTimeCountLimit {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
            self.tally = CurrentTimeTally::default();
        } else if let Some(column) = ColumnView::from_node(node) {
            for option in &column.options {
                match option {
                    ColumnOption::Default(expr) if is_current_time(expr) => {
                        self.tally.defaults += 1
                    }
                    ColumnOption::OnUpdate(expr) if is_current_time(expr) => {
                        self.tally.on_update += 1
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn on_exit(&mut self, node: Node<'_>, kind: NodeKind) -> AppResult<()> {
        if !matches!(kind, NodeKind::CreateTable | NodeKind::AlterTable) {
            return Ok(());
        }
        if self.tally.defaults > CURRENT_TIME_COLUMN_LIMIT {
            let message = format!(
                "Table `{}` has {} DEFAULT CURRENT_TIMESTAMP() columns. The count greater than {}.",
                self.table, self.tally.defaults, CURRENT_TIME_COLUMN_LIMIT
            );
            self.findings.report(
                Code::DEFAULT_CURRENT_TIME_COLUMN_COUNT_EXCEEDS_LIMIT,
                message,
                node.span()
            );
        }
        if self.tally.on_update > CURRENT_TIME_COLUMN_LIMIT {
            let message = format!(
                "Table `{}` has {} ON UPDATE CURRENT_TIMESTAMP() columns. The count greater than {}.",
                self.table, self.tally.on_update, CURRENT_TIME_COLUMN_LIMIT
            );
            self.findings.report(
                Code::ON_UPDATE_CURRENT_TIME_COLUMN_COUNT_EXCEEDS_LIMIT,
                message,
                node.span()
            );
        }
        Ok(())
    }
}

/// Every column needs a DEFAULT, except keys, auto-increment columns and
/// types that cannot have one.
pub struct RequireDefault {
    findings: Findings,
    table:    String
}

impl RequireDefault {
    pub fn new(ctx: &RuleContext) -> Self {
        Self {
            findings: Findings::new(ctx),
            table:    String::new()
        }
    }
}

impl Rule for RequireDefault {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Some(column) = ColumnView::from_node(node)
            && default_value(&column.options).is_none()
            && !is_primary_key(&column.options)
            && !is_auto_increment(&column.options)
            && !default_exempt(&type_name(column.data_type))
        {
            let message = format!(
                "Column `{}`.`{}` doesn't have DEFAULT.",
                self.table, column.name.value
            );
            self.findings.report(Code::NO_DEFAULT, message, node.span());
        }
        Ok(())
    }
}

pub struct ColumnComment {
    findings:       Findings,
    convention:     CommentConvention,
    classification: Vec<String>,
    table:          String
}

impl ColumnComment {
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
            classification: env.classification.clone(),
            table: String::new()
        }
    }
}

impl Rule for ColumnComment {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        if let Node::Statement(statement) = node {
            self.table = ddl_table(statement).unwrap_or_default();
        } else if let Some(column) = ColumnView::from_node(node) {
            let subject = format!("Column `{}`.`{}`", self.table, column.name.value);
            let comment = column_comment(&column.options);
            for (code, message) in comment_violations(
                &self.convention,
                &self.classification,
                &subject,
                comment.as_deref()
            ) {
                self.findings.report(code, message, node.span());
            }
        }
        Ok(())
    }
}

/// DROP COLUMN; with `in_index` set, only columns covered by an index in
/// the origin catalog.
pub struct DisallowDrop {
    findings:  Findings,
    snapshots: Option<Arc<Snapshots>>,
    in_index:  bool,
    table:     String
}

impl DisallowDrop {
    pub fn any(ctx: &RuleContext) -> Self {
        Self {
            findings:  Findings::new(ctx),
            snapshots: None,
            in_index:  false,
            table:     String::new()
        }
    }

    pub fn in_index(ctx: &RuleContext, env: &RuleEnv) -> Self {
        Self {
            findings:  Findings::new(ctx),
            snapshots: env.snapshots.clone(),
            in_index:  true,
            table:     String::new()
        }
    }

    fn index_on(&self, column: &str) -> Option<String> {
        let table = self.snapshots.as_ref()?.origin_table(&self.table)?;
        table.indexes_on(column).next().map(|i| i.name.clone())
    }
}

impl Rule for DisallowDrop {
    findings_accessors!();

    fn on_enter(&mut self, node: Node<'_>, _kind: NodeKind) -> AppResult<()> {
        match node {
            Node::Statement(statement) => self.table = ddl_table(statement).unwrap_or_default(),
            Node::AlterOperation(AlterTableOperation::DropColumn { column_names, .. }) => {
                for column in column_names {
                    if !self.in_index {
                        let message = format!(
                            "Drops column `{}` of table `{}`",
                            column.value, self.table
                        );
                        self.findings.report(Code::DROP_COLUMN, message, node.span());
                    } else if let Some(index) = self.index_on(&column.value) {
                        let message = format!(
                            "`{}`.`{}` cannot drop index column, it is used by index `{}`",
                            self.table, column.value, index
                        );
                        self.findings
                            .report(Code::DROP_INDEX_COLUMN, message, node.span());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
