//! Script splitting and per-statement parsing.
//!
//! A review script is tokenized once, split on top-level semicolons and every
//! statement is parsed on its own. Each [`ParsedStatement`] remembers its
//! `base_line`, the number of script lines before its first token, so that
//! node positions (local to the statement) translate to script positions by
//! simple addition.
//!
//! ```text
//! script ──▶ tokenizer ──▶ split on `;` ──▶ chunk ──▶ sqlparser ──▶ ParsedStatement
//!                                   │                                  (tree, base_line)
//!                                   └─▶ routine header ──▶ RoutineDefinition
//! ```
//!
//! Routine definitions (`CREATE PROCEDURE`, `FUNCTION`, `EVENT`,
//! `TRIGGER`) are recognized from their header tokens and kept as
//! [`RoutineDefinition`] because their bodies are outside what the parser
//! understands. Semicolons inside a `BEGIN ... END` body do not split the
//! routine.
//!
//! # Example
//!
//! ```
//! use sql_advisor::query::{SqlDialect, parse_script};
//!
//! let script = "SELECT 1;\n\nSELECT id\nFROM t;";
//! let statements = parse_script(script, SqlDialect::MySQL).unwrap();
//! assert_eq!(statements.len(), 2);
//! assert_eq!(statements[0].base_line, 0);
//! assert_eq!(statements[1].base_line, 2);
//! ```

mod split;

use rayon::prelude::*;
use sqlparser::{
    ast::Statement,
    dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect},
    parser::Parser
};
pub use split::{LineIndex, RoutineDefinition, RoutineKind};

use crate::{
    diagnostic::{Code, Diagnostic, Severity},
    error::{extract_position, strip_position}
};

/// Title of the diagnostic produced for unparsable input.
pub const SYNTAX_ERROR_TITLE: &str = "Syntax error";

/// SQL dialect for parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum SqlDialect {
    Generic,
    #[default]
    MySQL,
    PostgreSQL,
    SQLite
}

impl SqlDialect {
    /// Convert to sqlparser dialect for parsing
    pub fn into_parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::MySQL => Box::new(MySqlDialect {}),
            Self::PostgreSQL => Box::new(PostgreSqlDialect {}),
            Self::SQLite => Box::new(SQLiteDialect {})
        }
    }

    /// Parse a dialect name as used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "generic" => Some(Self::Generic),
            "mysql" | "mariadb" | "tidb" => Some(Self::MySQL),
            "postgresql" | "postgres" | "pg" => Some(Self::PostgreSQL),
            "sqlite" => Some(Self::SQLite),
            _ => None
        }
    }
}

/// Syntax tree of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlTree {
    /// Statement understood by the SQL parser
    Statement(Box<Statement>),
    /// Stored routine, event or trigger recognized from its header
    Routine(RoutineDefinition)
}

/// One statement of a script with the offset needed to translate its
/// positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    /// Syntax tree, positions are local to [`text`](Self::text)
    pub tree:          SqlTree,
    /// Lines of the script preceding the statement's first token
    pub base_line:     u64,
    /// Columns preceding the statement's first token on its first line
    pub column_offset: u64,
    /// Statement text without the terminating semicolon
    pub text:          String
}

impl ParsedStatement {
    /// Wrap an already parsed statement.
    pub fn new(statement: Statement, base_line: u64) -> Self {
        let text = statement.to_string();
        Self {
            tree: SqlTree::Statement(Box::new(statement)),
            base_line,
            column_offset: 0,
            text
        }
    }

    /// Translate a statement-local line to a script line.
    pub fn absolute_line(&self, local_line: u64) -> u64 {
        self.base_line + local_line.max(1)
    }

    pub fn statement(&self) -> Option<&Statement> {
        match &self.tree {
            SqlTree::Statement(statement) => Some(statement),
            SqlTree::Routine(_) => None
        }
    }
}

/// Parser failure translated to script coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line:    u64,
    pub column:  Option<u64>,
    pub message: String
}

impl SyntaxError {
    fn from_parser_message(message: &str, base_line: u64, column_offset: u64) -> Self {
        let text = message
            .strip_prefix("sql parser error: ")
            .unwrap_or(message);
        match extract_position(text) {
            Some(pos) => Self {
                line:    base_line + pos.line,
                column:  Some(if pos.line == 1 {
                    pos.column + column_offset
                } else {
                    pos.column
                }),
                message: strip_position(text).to_string()
            },
            None => Self {
                line:    base_line + 1,
                column:  None,
                message: text.to_string()
            }
        }
    }

    /// The single diagnostic reported for an unparsable script.
    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::new(
            Severity::Error,
            Code::STATEMENT_SYNTAX_ERROR,
            SYNTAX_ERROR_TITLE,
            self.message
        )
        .at(self.line, self.column)
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Split a script into statements and parse each of them.
///
/// Chunks are parsed in parallel; the first failing chunk in script order
/// is reported.
///
/// # Errors
///
/// Returns [`SyntaxError`] with script coordinates if tokenizing or parsing
/// fails.
pub fn parse_script(sql: &str, dialect: SqlDialect) -> Result<Vec<ParsedStatement>, SyntaxError> {
    let chunks = split::split_script(sql, dialect)?;
    let parsed: Vec<Result<Vec<ParsedStatement>, SyntaxError>> = chunks
        .into_par_iter()
        .map(|chunk| parse_chunk(chunk, dialect))
        .collect();
    let mut statements = Vec::new();
    for result in parsed {
        statements.extend(result?);
    }
    Ok(statements)
}

fn parse_chunk(
    chunk: split::Chunk,
    dialect: SqlDialect
) -> Result<Vec<ParsedStatement>, SyntaxError> {
    let base_line = chunk.base_line;
    let column_offset = chunk.column_offset;
    if let Some(routine) = chunk.routine {
        return Ok(vec![ParsedStatement {
            tree: SqlTree::Routine(routine),
            base_line,
            column_offset,
            text: chunk.text
        }]);
    }
    let parser_dialect = dialect.into_parser_dialect();
    let statements = Parser::parse_sql(parser_dialect.as_ref(), &chunk.text).map_err(|e| {
        SyntaxError::from_parser_message(&e.to_string(), base_line, column_offset)
    })?;
    Ok(statements
        .into_iter()
        .map(|statement| ParsedStatement {
            tree: SqlTree::Statement(Box::new(statement)),
            base_line,
            column_offset,
            text: chunk.text.clone()
        })
        .collect())
}
