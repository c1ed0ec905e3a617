//! Name and type helpers shared by rules and the catalog.

use compact_str::CompactString;
use sqlparser::ast::{
    CharacterLength, ColumnDef, ColumnOption, CommentDef, CreateIndex, CreateTable, DataType, Expr,
    FromTable, Function, IndexColumn, IndexOption, IndexType, ObjectName, ObjectNamePart,
    ObjectType, SqlOption, Statement, TableConstraint, TableFactor, TableObject, TableWithJoins,
    Value
};

/// Last identifier of a possibly qualified name, unquoted.
///
/// `db.orders` and `` `orders` `` both give `orders`.
pub fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            ObjectNamePart::Function(function) => function.name.value.clone()
        })
        .unwrap_or_default()
}

/// Case-insensitive key for per-table bookkeeping.
pub fn table_key(name: &str) -> CompactString {
    CompactString::from(name.to_lowercase())
}

/// Upper-cased base type name: `VARCHAR(20)` gives `VARCHAR`.
pub fn type_name(data_type: &DataType) -> String {
    if let DataType::Custom(name, _) = data_type {
        return object_name(name).to_uppercase();
    }
    base_type_name(&data_type.to_string())
}

/// Upper-cased base type name of a type written as text, as stored in
/// catalog metadata.
pub fn base_type_name(text: &str) -> String {
    let text = text.trim();
    let end = text
        .find(|c: char| c == '(' || c == ' ')
        .unwrap_or(text.len());
    text[..end].to_uppercase()
}

/// BLOB and TEXT family type names.
pub fn is_blob_name(name: &str) -> bool {
    matches!(
        name,
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT"
            | "LONGTEXT"
    )
}

/// Tables a statement reads or changes, in the order they are written.
pub fn statement_tables(statement: &Statement) -> Vec<String> {
    match statement {
        Statement::CreateTable(create) => vec![object_name(&create.name)],
        Statement::AlterTable(alter) => vec![object_name(&alter.name)],
        Statement::CreateIndex(index) => vec![object_name(&index.table_name)],
        Statement::Drop {
            object_type: ObjectType::Table,
            names,
            ..
        } => names.iter().map(object_name).collect(),
        Statement::Drop {
            object_type: ObjectType::Index,
            table: Some(table),
            ..
        } => vec![object_name(table)],
        Statement::Truncate(truncate) => truncate
            .table_names
            .iter()
            .map(|t| object_name(&t.name))
            .collect(),
        Statement::RenameTable(renames) => {
            renames.iter().map(|r| object_name(&r.old_name)).collect()
        }
        Statement::Insert(insert) => match &insert.table {
            TableObject::TableName(name) => vec![object_name(name)],
            _ => Vec::new()
        },
        Statement::Update(update) => relation_names(std::slice::from_ref(&update.table)),
        Statement::Delete(delete) => {
            let from = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables
            };
            let mut names = relation_names(from);
            if names.is_empty() {
                names = delete.tables.iter().map(object_name).collect();
            }
            names
        }
        _ => Vec::new()
    }
}

fn relation_names(tables: &[TableWithJoins]) -> Vec<String> {
    tables
        .iter()
        .flat_map(|t| std::iter::once(&t.relation).chain(t.joins.iter().map(|j| &j.relation)))
        .filter_map(|factor| match factor {
            TableFactor::Table { name, .. } => Some(object_name(name)),
            _ => None
        })
        .collect()
}

/// Declared length of a `CHAR` / `VARCHAR` column.
pub fn char_length(data_type: &DataType) -> Option<u64> {
    let length = match data_type {
        DataType::Char(length)
        | DataType::Character(length)
        | DataType::Varchar(length)
        | DataType::CharVarying(length)
        | DataType::CharacterVarying(length)
        | DataType::Nvarchar(length) => length.as_ref()?,
        _ => return None
    };
    match length {
        CharacterLength::IntegerLength { length, .. } => Some(*length),
        CharacterLength::Max => None
    }
}

pub fn is_varchar(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Varchar(_)
            | DataType::CharVarying(_)
            | DataType::CharacterVarying(_)
            | DataType::Nvarchar(_)
    )
}

pub fn is_char(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Char(_) | DataType::Character(_))
}

pub fn is_integer(data_type: &DataType) -> bool {
    matches!(
        type_name(data_type).as_str(),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4"
            | "INT8" | "SERIAL" | "BIGSERIAL"
    )
}

pub fn is_unsigned(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::TinyIntUnsigned(_)
            | DataType::SmallIntUnsigned(_)
            | DataType::MediumIntUnsigned(_)
            | DataType::IntUnsigned(_)
            | DataType::IntegerUnsigned(_)
            | DataType::Int2Unsigned(_)
            | DataType::Int4Unsigned(_)
            | DataType::Int8Unsigned(_)
            | DataType::BigIntUnsigned(_)
            | DataType::UTinyInt
            | DataType::USmallInt
            | DataType::UBigInt
    )
}

/// BLOB and TEXT family types.
pub fn is_blob(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Blob(_)
            | DataType::TinyBlob
            | DataType::MediumBlob
            | DataType::LongBlob
            | DataType::Text
            | DataType::TinyText
            | DataType::MediumText
            | DataType::LongText
    )
}

/// `AUTO_INCREMENT` marker in a column's options.
pub fn is_auto_increment(options: &[&ColumnOption]) -> bool {
    options.iter().any(|option| {
        if let ColumnOption::DialectSpecific(tokens) = option {
            tokens
                .iter()
                .any(|t| t.to_string().eq_ignore_ascii_case("AUTO_INCREMENT"))
        } else {
            false
        }
    })
}

pub fn function_name(function: &Function) -> String {
    object_name(&function.name)
}

/// `CURRENT_TIMESTAMP`, `NOW()` and their synonyms.
pub fn is_current_time(expr: &Expr) -> bool {
    let name = match expr {
        Expr::Function(function) => function_name(function),
        Expr::Identifier(ident) => ident.value.clone(),
        _ => return false
    };
    matches!(
        name.to_uppercase().as_str(),
        "CURRENT_TIMESTAMP" | "NOW" | "LOCALTIME" | "LOCALTIMESTAMP"
    )
}

/// Column names referenced by an index definition. Expression parts are
/// skipped.
pub fn index_columns(columns: &[IndexColumn]) -> Vec<String> {
    columns
        .iter()
        .filter_map(|column| match &column.column.expr {
            Expr::Identifier(ident) => Some(ident.value.clone()),
            Expr::CompoundIdentifier(parts) => parts.last().map(|p| p.value.clone()),
            Expr::Function(function) => Some(function_name(function)),
            _ => None
        })
        .collect()
}

/// Integer value of a numeric literal.
pub fn literal_number(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Value(value) => match &value.value {
            Value::Number(text, _) => text.parse().ok(),
            _ => None
        },
        _ => None
    }
}

/// String value of a quoted literal.
pub fn literal_string(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Value(value) => match &value.value {
            Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => Some(text),
            _ => None
        },
        _ => None
    }
}

/// Table option recognized in `CREATE TABLE` / `ALTER TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOptionKind {
    Engine,
    Charset,
    Collation,
    Comment,
    AutoIncrement
}

/// Classify a table option and extract its value.
pub fn table_option(option: &SqlOption) -> Option<(TableOptionKind, String)> {
    match option {
        SqlOption::NamedParenthesizedList(list)
            if list.key.value.eq_ignore_ascii_case("ENGINE") =>
        {
            Some((
                TableOptionKind::Engine,
                list.name.as_ref().map(|n| n.value.clone()).unwrap_or_default()
            ))
        }
        SqlOption::Comment(CommentDef::WithEq(text) | CommentDef::WithoutEq(text)) => {
            Some((TableOptionKind::Comment, text.clone()))
        }
        SqlOption::KeyValue { key, value } => {
            let kind = match key.value.to_uppercase().as_str() {
                "ENGINE" => TableOptionKind::Engine,
                "CHARSET" | "DEFAULT CHARSET" | "CHARACTER SET" | "DEFAULT CHARACTER SET" => {
                    TableOptionKind::Charset
                }
                "COLLATE" | "DEFAULT COLLATE" => TableOptionKind::Collation,
                "COMMENT" => TableOptionKind::Comment,
                "AUTO_INCREMENT" => TableOptionKind::AutoIncrement,
                _ => return None
            };
            Some((kind, expr_text(value)))
        }
        _ => None
    }
}

/// First option of the given kind declared by a `CREATE TABLE`.
pub fn create_table_option(create: &CreateTable, kind: TableOptionKind) -> Option<String> {
    let from_options = crate::walk::table_options(&create.table_options)
        .iter()
        .filter_map(table_option)
        .find(|(k, _)| *k == kind)
        .map(|(_, value)| value);
    match (from_options, kind, &create.comment) {
        (Some(value), ..) => Some(value),
        (
            None,
            TableOptionKind::Comment,
            Some(CommentDef::WithEq(text) | CommentDef::WithoutEq(text))
        ) => Some(text.clone()),
        _ => None
    }
}

/// Unquoted text of a literal or identifier, or the expression as written.
pub fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::Value(value) => match &value.value {
            Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => text.clone(),
            Value::Number(text, _) => text.clone(),
            other => other.to_string()
        },
        other => other.to_string()
    }
}

pub fn column_options(column: &ColumnDef) -> Vec<&ColumnOption> {
    column.options.iter().map(|o| &o.option).collect()
}

pub fn is_not_null(options: &[&ColumnOption]) -> bool {
    options.iter().any(|o| {
        matches!(o, ColumnOption::NotNull | ColumnOption::PrimaryKey(_))
    })
}

pub fn default_value<'a>(options: &[&'a ColumnOption]) -> Option<&'a Expr> {
    options.iter().find_map(|o| match o {
        ColumnOption::Default(expr) => Some(expr),
        _ => None
    })
}

pub fn column_charset(options: &[&ColumnOption]) -> Option<String> {
    options.iter().find_map(|o| match o {
        ColumnOption::CharacterSet(name) => Some(object_name(name)),
        _ => None
    })
}

pub fn column_collation(options: &[&ColumnOption]) -> Option<String> {
    options.iter().find_map(|o| match o {
        ColumnOption::Collation(name) => Some(object_name(name)),
        _ => None
    })
}

pub fn column_comment(options: &[&ColumnOption]) -> Option<String> {
    options.iter().find_map(|o| match o {
        ColumnOption::Comment(text) => Some(text.clone()),
        _ => None
    })
}

/// Kind of index a definition creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Primary,
    Unique,
    Plain,
    FullText,
    Foreign
}

/// Index-creating definition, normalized from table constraints, inline
/// column options and `CREATE INDEX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub kind:               IndexKind,
    pub name:               Option<String>,
    pub columns:            Vec<String>,
    pub index_type:         Option<String>,
    /// Referenced table of a foreign key
    pub referenced_table:   Option<String>,
    /// Referenced columns of a foreign key
    pub referenced_columns: Vec<String>
}

impl IndexDef {
    fn new(kind: IndexKind, name: Option<String>, columns: Vec<String>) -> Self {
        Self {
            kind,
            name,
            columns,
            index_type: None,
            referenced_table: None,
            referenced_columns: Vec::new()
        }
    }

    fn with_type(mut self, index_type: Option<&IndexType>, options: &[IndexOption]) -> Self {
        let from_options = options.iter().find_map(|o| match o {
            IndexOption::Using(t) => Some(t),
            _ => None
        });
        self.index_type = index_type.or(from_options).map(|t| t.to_string().to_uppercase());
        self
    }
}

/// Index created by a table constraint. `CHECK` constraints create none.
pub fn constraint_index(constraint: &TableConstraint) -> Option<IndexDef> {
    let ident = |i: &Option<sqlparser::ast::Ident>| i.as_ref().map(|i| i.value.clone());
    match constraint {
        TableConstraint::PrimaryKey(pk) => Some(
            IndexDef::new(IndexKind::Primary, None, index_columns(&pk.columns))
                .with_type(pk.index_type.as_ref(), &pk.index_options)
        ),
        TableConstraint::Unique(uk) => Some(
            IndexDef::new(
                IndexKind::Unique,
                ident(&uk.index_name).or_else(|| ident(&uk.name)),
                index_columns(&uk.columns)
            )
            .with_type(uk.index_type.as_ref(), &uk.index_options)
        ),
        TableConstraint::Index(index) => Some(
            IndexDef::new(IndexKind::Plain, ident(&index.name), index_columns(&index.columns))
                .with_type(index.index_type.as_ref(), &index.index_options)
        ),
        TableConstraint::FulltextOrSpatial(index) => Some(IndexDef::new(
            IndexKind::FullText,
            ident(&index.opt_index_name),
            index_columns(&index.columns)
        )),
        TableConstraint::ForeignKey(fk) => {
            let mut def = IndexDef::new(
                IndexKind::Foreign,
                ident(&fk.index_name).or_else(|| ident(&fk.name)),
                fk.columns.iter().map(|c| c.value.clone()).collect()
            );
            def.referenced_table = Some(object_name(&fk.foreign_table));
            def.referenced_columns = fk.referred_columns.iter().map(|c| c.value.clone()).collect();
            Some(def)
        }
        TableConstraint::Check(_) => None
    }
}

/// Index created inline by a column's `PRIMARY KEY` or `UNIQUE` option.
pub fn column_index(column: &ColumnDef) -> Option<IndexDef> {
    column.options.iter().find_map(|o| match &o.option {
        ColumnOption::PrimaryKey(_) => Some(IndexDef::new(
            IndexKind::Primary,
            None,
            vec![column.name.value.clone()]
        )),
        ColumnOption::Unique(_) => Some(IndexDef::new(
            IndexKind::Unique,
            None,
            vec![column.name.value.clone()]
        )),
        _ => None
    })
}

pub fn create_index_def(index: &CreateIndex) -> IndexDef {
    let kind = if index.unique {
        IndexKind::Unique
    } else {
        IndexKind::Plain
    };
    IndexDef::new(kind, index.name.as_ref().map(object_name), index_columns(&index.columns))
        .with_type(index.using.as_ref(), &index.index_options)
}
