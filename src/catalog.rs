//! Read-only schema catalog.
//!
//! The catalog describes the database a script is reviewed against. It is
//! loaded from a DDL file or from a metadata file (JSON or YAML) and
//! exposed to rules as two snapshots:
//!
//! - **origin** - the state before the script runs
//! - **final** - the origin with the script's DDL applied (see
//!   [`walk_through`])
//!
//! # Example
//!
//! ```
//! use sql_advisor::{catalog::Schema, query::SqlDialect};
//!
//! let sql = r#"
//!     CREATE TABLE users (
//!         id INT PRIMARY KEY,
//!         email VARCHAR(255) NOT NULL
//!     ) ENGINE=InnoDB;
//!     CREATE INDEX idx_email ON users(email);
//! "#;
//!
//! let schema = Schema::parse(sql, SqlDialect::MySQL).unwrap();
//!
//! let users = schema.table("USERS").unwrap();
//! assert_eq!(users.columns.len(), 2);
//! assert_eq!(users.indexes.len(), 2);
//! assert_eq!(users.engine.as_deref(), Some("InnoDB"));
//! ```

pub mod walk_through;

pub use walk_through::walk_through;

use std::{fs, path::Path, sync::Arc};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    error::{AppResult, config_error, file_read_error, schema_parse_error},
    query::{SqlDialect, parse_script},
    walk::names::table_key
};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name:      String,
    /// Declared type as written, e.g. `VARCHAR(255)`
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable:  bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment:   Option<String>
}

fn default_true() -> bool {
    true
}

/// Index metadata. The primary key is an index named `PRIMARY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name:       String,
    pub columns:    SmallVec<[String; 4]>,
    #[serde(default)]
    pub unique:     bool,
    #[serde(default)]
    pub primary:    bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>
}

impl IndexInfo {
    pub const PRIMARY: &'static str = "PRIMARY";

    pub fn contains_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableInfo {
    pub name:      String,
    #[serde(default)]
    pub columns:   Vec<ColumnInfo>,
    #[serde(default)]
    pub indexes:   Vec<IndexInfo>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine:    Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment:   Option<String>
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.primary)
    }

    /// Indexes that cover the given column.
    pub fn indexes_on(&self, column: &str) -> impl Iterator<Item = &IndexInfo> {
        self.indexes
            .iter()
            .filter(move |i| i.contains_column(column))
    }
}

/// One catalog snapshot: a database and its tables, keyed case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub database: Option<String>,
    tables:       IndexMap<CompactString, TableInfo>
}

#[derive(Deserialize)]
struct MetadataFile {
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    tables:   Vec<TableInfo>
}

impl Schema {
    pub fn new(database: Option<String>) -> Self {
        Self {
            database,
            tables: IndexMap::new()
        }
    }

    /// Build a schema by applying DDL statements to an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns error if the DDL does not parse or does not apply cleanly
    /// (for example an index on a missing table).
    pub fn parse(sql: &str, dialect: SqlDialect) -> AppResult<Self> {
        let statements = parse_script(sql, dialect).map_err(|e| {
            schema_parse_error(format!(
                "{} at Line: {}, Column: {}",
                e.message,
                e.line,
                e.column.unwrap_or(1)
            ))
        })?;
        let mut schema = Self::default();
        for statement in &statements {
            schema
                .apply(statement)
                .map_err(|e| schema_parse_error(e.to_string()))?;
        }
        Ok(schema)
    }

    /// Parse a JSON or YAML metadata document.
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed.
    pub fn from_metadata(content: &str, yaml: bool) -> AppResult<Self> {
        let file: MetadataFile = if yaml {
            serde_yaml::from_str(content)
                .map_err(|e| config_error(format!("Invalid metadata: {}", e)))?
        } else {
            serde_json::from_str(content)
                .map_err(|e| config_error(format!("Invalid metadata: {}", e)))?
        };
        let mut schema = Self::new(file.database);
        for table in file.tables {
            schema.insert(table);
        }
        Ok(schema)
    }

    /// Load a metadata file, choosing the format by extension.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load_metadata(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| file_read_error(&path.display().to_string(), e))?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        Self::from_metadata(&content, yaml)
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(&table_key(name))
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableInfo> {
        self.tables.get_mut(&table_key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&table_key(name))
    }

    pub fn insert(&mut self, table: TableInfo) {
        self.tables.insert(table_key(&table.name), table);
    }

    pub fn remove(&mut self, name: &str) -> Option<TableInfo> {
        self.tables.shift_remove(&table_key(name))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Source of the origin snapshot.
///
/// Implementations are shared across parallel reviews and must not change
/// while a review runs.
pub trait Catalog: Send + Sync {
    fn schema(&self) -> &Schema;
}

impl Catalog for Schema {
    fn schema(&self) -> &Schema {
        self
    }
}

/// Origin and final snapshots seen by rules during one review.
#[derive(Clone)]
pub struct Snapshots {
    origin:      Arc<dyn Catalog>,
    final_state: Schema
}

impl std::fmt::Debug for Snapshots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshots")
            .field("origin", self.origin.schema())
            .field("final_state", &self.final_state)
            .finish()
    }
}

impl Snapshots {
    pub fn new(origin: Arc<dyn Catalog>, final_state: Schema) -> Self {
        Self {
            origin,
            final_state
        }
    }

    pub fn origin(&self) -> &Schema {
        self.origin.schema()
    }

    pub fn final_state(&self) -> &Schema {
        &self.final_state
    }

    pub fn origin_table(&self, name: &str) -> Option<&TableInfo> {
        self.origin().table(name)
    }

    pub fn final_table(&self, name: &str) -> Option<&TableInfo> {
        self.final_state.table(name)
    }

    pub fn database_name(&self) -> Option<&str> {
        self.origin().database.as_deref()
    }
}
