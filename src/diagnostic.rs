//! Diagnostic model shared by every rule.
//!
//! A [`Diagnostic`] is an immutable finding: severity, numeric [`Code`],
//! title, message and an optional position. Positions are absolute lines in
//! the reviewed script (`base_line + node_local_line`); line `0` is reserved
//! for document-level findings that are not tied to a node.
//!
//! [`ReviewReport`] groups the diagnostics produced for one input.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic.
///
/// Ordered from lowest to highest so that sorting by severity puts errors
/// last; the review driver sorts descending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Nothing to report, or an informational finding
    Success,
    /// Finding that may indicate a problem (exit code 1)
    Warning,
    /// Finding that must be addressed (exit code 2)
    Error
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR")
        }
    }
}

/// Numeric diagnostic code.
///
/// Codes are grouped by family: `2xx` statements, `3xx` naming, `4xx`
/// columns, `5xx` engine, `6xx` tables, `7xx` databases, `8xx` indexes,
/// `10xx`-`17xx` charsets, DML, collations, comments and routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(pub u32);

impl Code {
    pub const OK: Code = Code(0);
    pub const INTERNAL: Code = Code(1);
    pub const NOT_FOUND: Code = Code(2);
    pub const UNSUPPORTED: Code = Code(3);

    pub const STATEMENT_SYNTAX_ERROR: Code = Code(201);
    pub const STATEMENT_NO_WHERE: Code = Code(202);
    pub const STATEMENT_SELECT_ALL: Code = Code(203);
    pub const STATEMENT_LEADING_WILDCARD_LIKE: Code = Code(204);
    pub const STATEMENT_CREATE_TABLE_AS: Code = Code(205);
    pub const STATEMENT_DISALLOW_COMMIT: Code = Code(206);
    pub const STATEMENT_REDUNDANT_ALTER_TABLE: Code = Code(207);
    pub const STATEMENT_AFFECTED_ROW_EXCEEDS_LIMIT: Code = Code(209);
    pub const STATEMENT_CHECK_FULL_TABLE_SCAN_FAILED: Code = Code(214);
    pub const STATEMENT_HAS_TABLE_FULL_SCAN: Code = Code(215);
    pub const STATEMENT_EXPLAIN_QUERY_FAILED: Code = Code(218);
    pub const STATEMENT_HAS_USING_FILESORT: Code = Code(219);
    pub const STATEMENT_HAS_USING_TEMPORARY: Code = Code(220);
    pub const STATEMENT_WHERE_NO_EQUAL_NULL: Code = Code(221);
    pub const STATEMENT_EXCEED_MAXIMUM_LIMIT_VALUE: Code = Code(222);
    pub const STATEMENT_MAXIMUM_JOIN_TABLE_COUNT: Code = Code(223);
    pub const STATEMENT_WHERE_MAXIMUM_LOGICAL_OPERATOR_COUNT: Code = Code(225);
    pub const STATEMENT_DISALLOW_MIX_DML: Code = Code(227);
    pub const STATEMENT_ADD_COLUMN_WITH_POSITION: Code = Code(231);
    pub const STATEMENT_DISALLOW_FUNCTIONS_AND_CALCULATIONS: Code = Code(234);

    pub const NAMING_TABLE_CONVENTION_MISMATCH: Code = Code(301);
    pub const NAMING_COLUMN_CONVENTION_MISMATCH: Code = Code(302);
    pub const NAMING_INDEX_CONVENTION_MISMATCH: Code = Code(303);
    pub const NAMING_UK_CONVENTION_MISMATCH: Code = Code(304);
    pub const NAMING_FK_CONVENTION_MISMATCH: Code = Code(305);
    pub const NAMING_AUTO_INCREMENT_COLUMN_CONVENTION_MISMATCH: Code = Code(307);

    pub const NO_REQUIRED_COLUMN: Code = Code(401);
    pub const COLUMN_CANNOT_NULL: Code = Code(402);
    pub const CHANGE_COLUMN_TYPE: Code = Code(403);
    pub const NOT_NULL_COLUMN_WITH_NO_DEFAULT: Code = Code(404);
    pub const COLUMN_NOT_EXISTS: Code = Code(405);
    pub const USE_CHANGE_COLUMN_STATEMENT: Code = Code(406);
    pub const CHANGE_COLUMN_ORDER: Code = Code(407);
    pub const AUTO_INCREMENT_COLUMN_NOT_INTEGER: Code = Code(410);
    pub const DISABLED_COLUMN_TYPE: Code = Code(411);
    pub const COLUMN_EXISTS: Code = Code(412);
    pub const DROP_ALL_COLUMNS: Code = Code(413);
    pub const SET_COLUMN_CHARSET: Code = Code(414);
    pub const CHAR_LENGTH_EXCEEDS_LIMIT: Code = Code(415);
    pub const AUTO_INCREMENT_COLUMN_INITIAL_VALUE_NOT_MATCH: Code = Code(416);
    pub const AUTO_INCREMENT_COLUMN_SIGNED: Code = Code(417);
    pub const DEFAULT_CURRENT_TIME_COLUMN_COUNT_EXCEEDS_LIMIT: Code = Code(418);
    pub const ON_UPDATE_CURRENT_TIME_COLUMN_COUNT_EXCEEDS_LIMIT: Code = Code(419);
    pub const NO_DEFAULT: Code = Code(420);
    pub const VARCHAR_LENGTH_EXCEEDS_LIMIT: Code = Code(422);
    pub const DROP_INDEX_COLUMN: Code = Code(424);
    pub const DROP_COLUMN: Code = Code(425);

    pub const NOT_INNODB_ENGINE: Code = Code(501);

    pub const TABLE_NO_PK: Code = Code(601);
    pub const TABLE_HAS_FK: Code = Code(602);
    pub const TABLE_DROP_NAMING_CONVENTION_MISMATCH: Code = Code(603);
    pub const TABLE_NOT_EXISTS: Code = Code(604);
    pub const TABLE_EXISTS: Code = Code(607);
    pub const CREATE_TABLE_PARTITION: Code = Code(608);
    pub const CREATE_TABLE_TRIGGER: Code = Code(610);
    pub const DISALLOW_SET_CHARSET: Code = Code(612);
    pub const TABLE_DISALLOW_DDL: Code = Code(613);
    pub const TABLE_DISALLOW_DML: Code = Code(614);
    pub const TABLE_EXCEED_LIMIT_SIZE: Code = Code(615);
    pub const NO_CHARSET: Code = Code(616);
    pub const NO_COLLATION: Code = Code(617);

    pub const DATABASE_NOT_EMPTY: Code = Code(701);

    pub const INDEX_KEY_NUMBER_EXCEEDS_LIMIT: Code = Code(802);
    pub const INDEX_PK_TYPE: Code = Code(803);
    pub const INDEX_TYPE_NO_BLOB: Code = Code(804);
    pub const INDEX_EXISTS: Code = Code(805);
    pub const PRIMARY_KEY_EXISTS: Code = Code(806);
    pub const INDEX_NOT_EXISTS: Code = Code(809);
    pub const DUPLICATE_COLUMN_IN_INDEX: Code = Code(812);
    pub const INDEX_COUNT_EXCEEDS_LIMIT: Code = Code(813);
    pub const INDEX_TYPE_NOT_ALLOWED: Code = Code(816);

    pub const DISABLED_CHARSET: Code = Code(1001);

    pub const INSERT_TOO_MANY_ROWS: Code = Code(1101);
    pub const UPDATE_USE_LIMIT: Code = Code(1102);
    pub const INSERT_USE_LIMIT: Code = Code(1103);
    pub const DELETE_USE_ORDER_BY: Code = Code(1105);
    pub const DELETE_USE_LIMIT: Code = Code(1106);
    pub const INSERT_NOT_SPECIFY_COLUMN: Code = Code(1107);
    pub const INSERT_USE_ORDER_BY_RAND: Code = Code(1108);

    pub const DISABLED_COLLATION: Code = Code(1201);

    pub const COMMENT_TOO_LONG: Code = Code(1301);
    pub const COMMENT_EMPTY: Code = Code(1032);
    pub const COMMENT_MISSING_CLASSIFICATION: Code = Code(1303);

    pub const DISALLOW_CREATE_PROCEDURE: Code = Code(1401);
    pub const DISALLOW_CREATE_EVENT: Code = Code(1501);
    pub const DISALLOW_CREATE_VIEW: Code = Code(1601);
    pub const DISALLOW_CREATE_FUNCTION: Code = Code(1701);
    pub const DISABLED_FUNCTION: Code = Code(1702);
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a diagnostic in the reviewed script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Position {
    /// 1-based line, `0` for document-level diagnostics
    pub line:   u64,
    /// 1-based column when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>
}

/// A single finding produced by a rule or by the review driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code:     Code,
    pub title:    String,
    pub message:  String,
    pub position: Position
}

impl Diagnostic {
    /// Create a document-level diagnostic (line 0).
    pub fn new(
        severity: Severity,
        code: Code,
        title: impl Into<String>,
        message: impl Into<String>
    ) -> Self {
        Self {
            severity,
            code,
            title: title.into(),
            message: message.into(),
            position: Position::default()
        }
    }

    /// Attach an absolute position.
    pub fn at(mut self, line: u64, column: Option<u64>) -> Self {
        self.position = Position { line, column };
        self
    }

    /// The success record returned when nothing fired.
    ///
    /// # Example
    ///
    /// ```
    /// use sql_advisor::diagnostic::{Code, Diagnostic, Severity};
    ///
    /// let ok = Diagnostic::ok();
    /// assert_eq!(ok.severity, Severity::Success);
    /// assert_eq!(ok.code, Code::OK);
    /// assert_eq!(ok.title, "OK");
    /// ```
    pub fn ok() -> Self {
        Self::new(Severity::Success, Code::OK, "OK", "")
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Success && self.code == Code::OK
    }

    pub fn line(&self) -> u64 {
        self.position.line
    }
}

/// Review result for one input (file or stdin).
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    /// Input name as given on the command line
    pub source:      String,
    /// Diagnostics in review order
    pub diagnostics: Vec<Diagnostic>
}

impl ReviewReport {
    pub fn new(source: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            source: source.into(),
            diagnostics
        }
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Number of diagnostics that are not the synthesized OK record.
    pub fn finding_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| !d.is_ok()).count()
    }

    pub fn highest_severity(&self) -> Severity {
        self.diagnostics
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or(Severity::Success)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}
