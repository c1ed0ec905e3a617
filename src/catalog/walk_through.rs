//! Apply a script's DDL to a catalog snapshot.
//!
//! Walking the script through the origin snapshot yields the final
//! snapshot. Statements that contradict the catalog (creating a table that
//! exists, dropping a column that does not) stop the walk with a
//! [`WalkThroughError`], which the review reports as its single diagnostic.

use std::fmt;

use smallvec::SmallVec;
use sqlparser::ast::{
    AlterTableOperation, ColumnDef, ColumnOption, CreateTable, CreateTableLikeKind,
    MySQLColumnPosition, ObjectType, RenameTableNameKind, Spanned, Statement
};

use super::{ColumnInfo, IndexInfo, Schema, TableInfo};
use crate::{
    diagnostic::{Code, Diagnostic, Severity},
    query::ParsedStatement,
    walk::names::{
        IndexDef, IndexKind, TableOptionKind, column_charset, column_collation, column_comment,
        column_index, column_options, constraint_index, create_index_def, create_table_option,
        default_value, expr_text, is_not_null, object_name, table_option
    }
};

/// Catalog contradiction found while applying DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkThroughError {
    pub code:    Code,
    pub title:   &'static str,
    pub message: String,
    pub line:    u64
}

impl WalkThroughError {
    fn new(code: Code, message: String) -> Self {
        let title = match code {
            Code::TABLE_EXISTS => "Table already exists",
            Code::TABLE_NOT_EXISTS => "Table does not exist",
            Code::COLUMN_EXISTS => "Column already exists",
            Code::COLUMN_NOT_EXISTS => "Column does not exist",
            Code::DROP_ALL_COLUMNS => "Drop all columns",
            Code::PRIMARY_KEY_EXISTS => "Primary key exists",
            Code::INDEX_EXISTS => "Index exists",
            Code::INDEX_NOT_EXISTS => "Index does not exist",
            _ => "Catalog walk-through failed"
        };
        Self {
            code,
            title,
            message,
            line: 0
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::new(Severity::Error, self.code, self.title, self.message).at(self.line, None)
    }
}

impl fmt::Display for WalkThroughError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

type WalkResult = Result<(), WalkThroughError>;

fn table_not_exists(name: &str) -> WalkThroughError {
    WalkThroughError::new(Code::TABLE_NOT_EXISTS, format!("Table `{}` does not exist", name))
}

fn column_not_exists(table: &str, column: &str) -> WalkThroughError {
    WalkThroughError::new(
        Code::COLUMN_NOT_EXISTS,
        format!("Column `{}` does not exist in table `{}`", column, table)
    )
}

fn column_exists(table: &str, column: &str) -> WalkThroughError {
    WalkThroughError::new(
        Code::COLUMN_EXISTS,
        format!("Column `{}` already exists in table `{}`", column, table)
    )
}

/// Apply every statement to a copy of `origin`.
///
/// # Errors
///
/// Returns the diagnostic for the first statement that contradicts the
/// catalog.
pub fn walk_through(origin: &Schema, statements: &[ParsedStatement]) -> Result<Schema, Diagnostic> {
    let mut state = origin.clone();
    for statement in statements {
        state.apply(statement).map_err(WalkThroughError::into_diagnostic)?;
    }
    Ok(state)
}

impl Schema {
    /// Apply one statement. Non-DDL statements are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WalkThroughError`] with the statement's absolute line when
    /// the statement contradicts the current state.
    pub fn apply(&mut self, statement: &ParsedStatement) -> WalkResult {
        let Some(ast) = statement.statement() else {
            return Ok(());
        };
        self.apply_statement(ast).map_err(|mut e| {
            e.line = statement.absolute_line(ast.span().start.line);
            e
        })
    }

    fn apply_statement(&mut self, statement: &Statement) -> WalkResult {
        match statement {
            Statement::CreateTable(create) => self.create_table(create),
            Statement::AlterTable(alter) => {
                let name = object_name(&alter.name);
                if !self.contains(&name) {
                    if alter.if_exists {
                        return Ok(());
                    }
                    return Err(table_not_exists(&name));
                }
                for operation in &alter.operations {
                    self.alter_table(&name, operation)?;
                }
                Ok(())
            }
            Statement::CreateIndex(index) => {
                let table = object_name(&index.table_name);
                let def = create_index_def(index);
                let Some(info) = self.table_mut(&table) else {
                    return Err(table_not_exists(&table));
                };
                if index.if_not_exists
                    && let Some(name) = &def.name
                    && info.index(name).is_some()
                {
                    return Ok(());
                }
                add_index(info, def)
            }
            Statement::Drop {
                object_type,
                if_exists,
                names,
                table,
                ..
            } => match object_type {
                ObjectType::Table => {
                    for name in names {
                        let name = object_name(name);
                        if self.remove(&name).is_none() && !if_exists {
                            return Err(table_not_exists(&name));
                        }
                    }
                    Ok(())
                }
                ObjectType::Index => {
                    let Some(table) = table else {
                        return Ok(());
                    };
                    let table = object_name(table);
                    let Some(info) = self.table_mut(&table) else {
                        return Err(table_not_exists(&table));
                    };
                    for name in names {
                        drop_index(info, &object_name(name), *if_exists)?;
                    }
                    Ok(())
                }
                _ => Ok(())
            },
            Statement::RenameTable(renames) => {
                for rename in renames {
                    self.rename_table(
                        &object_name(&rename.old_name),
                        &object_name(&rename.new_name)
                    )?;
                }
                Ok(())
            }
            _ => Ok(())
        }
    }

    fn create_table(&mut self, create: &CreateTable) -> WalkResult {
        let name = object_name(&create.name);
        if self.contains(&name) {
            if create.if_not_exists {
                return Ok(());
            }
            return Err(WalkThroughError::new(
                Code::TABLE_EXISTS,
                format!("Table `{}` already exists", name)
            ));
        }
        let mut table = TableInfo::new(name.clone());
        if let Some(like) = &create.like {
            let source = match like {
                CreateTableLikeKind::Parenthesized(like) | CreateTableLikeKind::Plain(like) => {
                    object_name(&like.name)
                }
            };
            let Some(source) = self.table(&source) else {
                return Err(table_not_exists(&source));
            };
            table.columns = source.columns.clone();
            table.indexes = source.indexes.clone();
        }
        for column in &create.columns {
            if table.column(&column.name.value).is_some() {
                return Err(column_exists(&name, &column.name.value));
            }
            table.columns.push(column_info(column));
            if let Some(def) = column_index(column) {
                add_index(&mut table, def)?;
            }
        }
        for constraint in &create.constraints {
            if let Some(def) = constraint_index(constraint) {
                add_index(&mut table, def)?;
            }
        }
        table.engine = create_table_option(create, TableOptionKind::Engine);
        table.charset = create_table_option(create, TableOptionKind::Charset);
        table.collation = create_table_option(create, TableOptionKind::Collation);
        table.comment = create_table_option(create, TableOptionKind::Comment);
        self.insert(table);
        Ok(())
    }

    fn rename_table(&mut self, old: &str, new: &str) -> WalkResult {
        if self.contains(new) {
            return Err(WalkThroughError::new(
                Code::TABLE_EXISTS,
                format!("Table `{}` already exists", new)
            ));
        }
        let Some(mut table) = self.remove(old) else {
            return Err(table_not_exists(old));
        };
        table.name = new.to_string();
        self.insert(table);
        Ok(())
    }

    fn alter_table(&mut self, name: &str, operation: &AlterTableOperation) -> WalkResult {
        if let AlterTableOperation::RenameTable { table_name } = operation {
            let new = match table_name {
                RenameTableNameKind::As(n) | RenameTableNameKind::To(n) => object_name(n)
            };
            return self.rename_table(name, &new);
        }
        let Some(table) = self.table_mut(name) else {
            return Err(table_not_exists(name));
        };
        match operation {
            AlterTableOperation::AddColumn {
                column_def,
                if_not_exists,
                column_position,
                ..
            } => {
                if table.column(&column_def.name.value).is_some() {
                    if *if_not_exists {
                        return Ok(());
                    }
                    return Err(column_exists(name, &column_def.name.value));
                }
                let at = position_index(table, column_position.as_ref())?;
                table.columns.insert(at, column_info(column_def));
                if let Some(def) = column_index(column_def) {
                    add_index(table, def)?;
                }
                Ok(())
            }
            AlterTableOperation::DropColumn {
                column_names,
                if_exists,
                ..
            } => {
                for column in column_names {
                    let Some(at) = table.column_position(&column.value) else {
                        if *if_exists {
                            continue;
                        }
                        return Err(column_not_exists(name, &column.value));
                    };
                    if table.columns.len() == 1 {
                        return Err(WalkThroughError::new(
                            Code::DROP_ALL_COLUMNS,
                            format!("Dropping all columns of table `{}` is not allowed", name)
                        ));
                    }
                    table.columns.remove(at);
                    for index in &mut table.indexes {
                        index.columns.retain(|c| !c.eq_ignore_ascii_case(&column.value));
                    }
                    table.indexes.retain(|i| !i.columns.is_empty());
                }
                Ok(())
            }
            AlterTableOperation::RenameColumn {
                old_column_name,
                new_column_name
            } => {
                let Some(at) = table.column_position(&old_column_name.value) else {
                    return Err(column_not_exists(name, &old_column_name.value));
                };
                if table.column(&new_column_name.value).is_some() {
                    return Err(column_exists(name, &new_column_name.value));
                }
                table.columns[at].name = new_column_name.value.clone();
                rename_in_indexes(table, &old_column_name.value, &new_column_name.value);
                Ok(())
            }
            AlterTableOperation::ChangeColumn {
                old_name,
                new_name,
                data_type,
                options,
                column_position
            } => {
                let Some(at) = table.column_position(&old_name.value) else {
                    return Err(column_not_exists(name, &old_name.value));
                };
                if !old_name.value.eq_ignore_ascii_case(&new_name.value)
                    && table.column(&new_name.value).is_some()
                {
                    return Err(column_exists(name, &new_name.value));
                }
                let column = changed_column(&new_name.value, data_type, options);
                table.columns.remove(at);
                let to = match column_position {
                    Some(_) => position_index(table, column_position.as_ref())?,
                    None => at
                };
                table.columns.insert(to, column);
                rename_in_indexes(table, &old_name.value, &new_name.value);
                Ok(())
            }
            AlterTableOperation::ModifyColumn {
                col_name,
                data_type,
                options,
                column_position
            } => {
                let Some(at) = table.column_position(&col_name.value) else {
                    return Err(column_not_exists(name, &col_name.value));
                };
                let column = changed_column(&col_name.value, data_type, options);
                table.columns.remove(at);
                let to = match column_position {
                    Some(_) => position_index(table, column_position.as_ref())?,
                    None => at
                };
                table.columns.insert(to, column);
                Ok(())
            }
            AlterTableOperation::AddConstraint { constraint, .. } => {
                match constraint_index(constraint) {
                    Some(def) => add_index(table, def),
                    None => Ok(())
                }
            }
            AlterTableOperation::DropPrimaryKey { .. } => {
                drop_index(table, IndexInfo::PRIMARY, false)
            }
            AlterTableOperation::DropIndex { name: index } => {
                drop_index(table, &index.value, false)
            }
            AlterTableOperation::DropForeignKey { name: fk, .. } => {
                table.indexes.retain(|i| !i.name.eq_ignore_ascii_case(&fk.value));
                Ok(())
            }
            AlterTableOperation::SetTblProperties { table_properties } => {
                for (kind, value) in table_properties.iter().filter_map(table_option) {
                    set_table_option(table, kind, value);
                }
                Ok(())
            }
            _ => Ok(())
        }
    }
}

fn set_table_option(table: &mut TableInfo, kind: TableOptionKind, value: String) {
    match kind {
        TableOptionKind::Engine => table.engine = Some(value),
        TableOptionKind::Charset => table.charset = Some(value),
        TableOptionKind::Collation => table.collation = Some(value),
        TableOptionKind::Comment => table.comment = Some(value),
        TableOptionKind::AutoIncrement => {}
    }
}

fn column_info(column: &ColumnDef) -> ColumnInfo {
    let options = column_options(column);
    ColumnInfo {
        name:      column.name.value.clone(),
        data_type: column.data_type.to_string(),
        nullable:  !is_not_null(&options),
        default:   default_value(&options).map(expr_text),
        charset:   column_charset(&options),
        collation: column_collation(&options),
        comment:   column_comment(&options)
    }
}

fn changed_column(
    name: &str,
    data_type: &sqlparser::ast::DataType,
    options: &[ColumnOption]
) -> ColumnInfo {
    let options: Vec<&ColumnOption> = options.iter().collect();
    ColumnInfo {
        name:      name.to_string(),
        data_type: data_type.to_string(),
        nullable:  !is_not_null(&options),
        default:   default_value(&options).map(expr_text),
        charset:   column_charset(&options),
        collation: column_collation(&options),
        comment:   column_comment(&options)
    }
}

fn position_index(
    table: &TableInfo,
    position: Option<&MySQLColumnPosition>
) -> Result<usize, WalkThroughError> {
    match position {
        None => Ok(table.columns.len()),
        Some(MySQLColumnPosition::First) => Ok(0),
        Some(MySQLColumnPosition::After(after)) => table
            .column_position(&after.value)
            .map(|i| i + 1)
            .ok_or_else(|| column_not_exists(&table.name, &after.value))
    }
}

fn rename_in_indexes(table: &mut TableInfo, old: &str, new: &str) {
    for index in &mut table.indexes {
        for column in index.columns.iter_mut() {
            if column.eq_ignore_ascii_case(old) {
                *column = new.to_string();
            }
        }
    }
}

fn add_index(table: &mut TableInfo, def: IndexDef) -> WalkResult {
    for column in &def.columns {
        if table.column(column).is_none() {
            return Err(column_not_exists(&table.name, column));
        }
    }
    let primary = def.kind == IndexKind::Primary;
    if primary && table.primary_key().is_some() {
        return Err(WalkThroughError::new(
            Code::PRIMARY_KEY_EXISTS,
            format!("Primary key exists in table `{}`", table.name)
        ));
    }
    let name = if primary {
        IndexInfo::PRIMARY.to_string()
    } else {
        def.name
            .clone()
            .unwrap_or_else(|| def.columns.first().cloned().unwrap_or_default())
    };
    if !primary && table.index(&name).is_some() {
        return Err(WalkThroughError::new(
            Code::INDEX_EXISTS,
            format!("Index `{}` already exists in table `{}`", name, table.name)
        ));
    }
    table.indexes.push(IndexInfo {
        name,
        columns: def.columns.into_iter().collect::<SmallVec<_>>(),
        unique: primary || def.kind == IndexKind::Unique,
        primary,
        index_type: def.index_type
    });
    Ok(())
}

fn drop_index(table: &mut TableInfo, name: &str, if_exists: bool) -> WalkResult {
    let before = table.indexes.len();
    table.indexes.retain(|i| !i.name.eq_ignore_ascii_case(name));
    if table.indexes.len() == before && !if_exists {
        return Err(WalkThroughError::new(
            Code::INDEX_NOT_EXISTS,
            format!("Index `{}` does not exist in table `{}`", name, table.name)
        ));
    }
    Ok(())
}
