//! Type definitions for rule configuration.
//!
//! - [`RuleType`] - Every rule the engine knows, with its identifier
//! - [`RuleLevel`] - Configured level, mapped to a diagnostic [`Severity`]
//! - [`RulePayload`] - Decoded rule parameters
//! - [`RuleConfig`] - One entry of the user-facing rule list
//! - [`RuleContext`] - Configuration snapshot handed to a rule factory

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    diagnostic::Severity,
    error::{AppResult, payload_error}
};

/// Default maximum identifier length for naming rules.
pub const DEFAULT_NAME_MAX_LENGTH: usize = 63;

/// Configured rule level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLevel {
    Error,
    #[serde(alias = "warn")]
    Warning,
    Info,
    Disabled
}

impl RuleLevel {
    /// Severity of diagnostics produced at this level, `None` when disabled.
    pub fn severity(self) -> Option<Severity> {
        match self {
            Self::Error => Some(Severity::Error),
            Self::Warning => Some(Severity::Warning),
            Self::Info => Some(Severity::Success),
            Self::Disabled => None
        }
    }

    /// Parse a level name, accepting `warn` for `warning`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "disabled" | "off" => Some(Self::Disabled),
            _ => None
        }
    }
}

impl fmt::Display for RuleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
            Self::Disabled => write!(f, "disabled")
        }
    }
}

/// Shape of a rule's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadKind {
    None,
    Number,
    StringList,
    Naming,
    CommentConvention
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "-"),
            Self::Number => write!(f, "number"),
            Self::StringList => write!(f, "string-list"),
            Self::Naming => write!(f, "naming"),
            Self::CommentConvention => write!(f, "comment-convention")
        }
    }
}

/// Comment requirements for tables and columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentConvention {
    #[serde(default)]
    pub required:                bool,
    #[serde(default, alias = "max_length")]
    pub max_length:              i64,
    #[serde(default, alias = "required_classification")]
    pub required_classification: bool
}

/// Decoded rule parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePayload {
    None,
    Number(i64),
    StringList(Vec<String>),
    Naming {
        format:     String,
        max_length: usize
    },
    CommentConvention(CommentConvention)
}

#[derive(Deserialize)]
struct NumberPayload {
    number: i64
}

#[derive(Deserialize)]
struct StringListPayload {
    list: Vec<String>
}

#[derive(Deserialize)]
struct NamingPayload {
    format:     String,
    #[serde(default, alias = "maxLength")]
    max_length: usize
}

impl RulePayload {
    /// Decode a JSON-like payload into the given kind.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if the value does not have the shape the
    /// rule expects.
    pub fn decode(rule: &str, kind: PayloadKind, value: Option<&Value>) -> AppResult<Self> {
        let require = || value.cloned().ok_or_else(|| payload_error(rule, "payload is required"));
        match kind {
            PayloadKind::None => Ok(Self::None),
            PayloadKind::Number => {
                let p: NumberPayload =
                    serde_json::from_value(require()?).map_err(|e| payload_error(rule, e))?;
                Ok(Self::Number(p.number))
            }
            PayloadKind::StringList => {
                let p: StringListPayload =
                    serde_json::from_value(require()?).map_err(|e| payload_error(rule, e))?;
                Ok(Self::StringList(p.list))
            }
            PayloadKind::Naming => {
                let p: NamingPayload =
                    serde_json::from_value(require()?).map_err(|e| payload_error(rule, e))?;
                let max_length = if p.max_length == 0 {
                    DEFAULT_NAME_MAX_LENGTH
                } else {
                    p.max_length
                };
                Ok(Self::Naming {
                    format: p.format,
                    max_length
                })
            }
            PayloadKind::CommentConvention => {
                let p: CommentConvention =
                    serde_json::from_value(require()?).map_err(|e| payload_error(rule, e))?;
                Ok(Self::CommentConvention(p))
            }
        }
    }

    pub fn number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None
        }
    }

    /// Upper-cased list entries.
    pub fn upper_list(&self) -> Vec<String> {
        match self {
            Self::StringList(list) => list.iter().map(|s| s.to_uppercase()).collect(),
            _ => Vec::new()
        }
    }

    /// Lower-cased list entries.
    pub fn lower_list(&self) -> Vec<String> {
        match self {
            Self::StringList(list) => list.iter().map(|s| s.to_lowercase()).collect(),
            _ => Vec::new()
        }
    }
}

/// One configured rule as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub level:     RuleLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload:   Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title:     String
}

impl RuleConfig {
    pub fn new(rule_type: RuleType, level: RuleLevel) -> Self {
        Self {
            rule_type: rule_type.id().to_string(),
            level,
            payload: None,
            title: String::new()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Configuration snapshot given to a rule factory.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    pub rule_type: RuleType,
    pub level:     RuleLevel,
    pub title:     String,
    pub payload:   RulePayload
}

impl RuleContext {
    /// Resolve a [`RuleConfig`] against the catalog of rule types.
    ///
    /// Returns `Ok(None)` for unknown rule types.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if the payload does not decode.
    pub fn from_config(config: &RuleConfig) -> AppResult<Option<Self>> {
        let Some(rule_type) = RuleType::from_id(&config.rule_type) else {
            return Ok(None);
        };
        let payload =
            RulePayload::decode(rule_type.id(), rule_type.payload_kind(), config.payload.as_ref())?;
        let title = if config.title.is_empty() {
            rule_type.id().to_string()
        } else {
            config.title.clone()
        };
        Ok(Some(Self {
            rule_type,
            level: config.level,
            title,
            payload
        }))
    }

    pub fn severity(&self) -> Severity {
        self.level.severity().unwrap_or(Severity::Success)
    }
}

/// Every rule the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RuleType {
    StatementRequireWhere,
    StatementNoSelectAll,
    StatementNoLeadingWildcardLike,
    StatementDisallowCommit,
    StatementDisallowCreateTableAs,
    StatementDisallowLimit,
    StatementDisallowOrderBy,
    StatementMergeAlterTable,
    StatementInsertRowLimit,
    StatementInsertMustSpecifyColumn,
    StatementInsertDisallowOrderByRand,
    StatementWhereNoEqualNull,
    StatementMaximumLimitValue,
    StatementMaximumJoinTableCount,
    StatementWhereMaximumLogicalOperatorCount,
    StatementDisallowMixInDml,
    StatementAddColumnWithoutPosition,
    StatementWhereDisallowFunctionsAndCalculations,
    StatementSelectFullTableScan,
    StatementDisallowUsingFilesort,
    StatementDisallowUsingTemporary,
    StatementAffectedRowLimit,
    NamingTable,
    NamingColumn,
    NamingIndexIdx,
    NamingIndexUk,
    NamingIndexFk,
    NamingColumnAutoIncrement,
    ColumnRequired,
    ColumnNoNull,
    ColumnDisallowChangeType,
    ColumnSetDefaultForNotNull,
    ColumnDisallowChange,
    ColumnDisallowChangingOrder,
    ColumnAutoIncrementMustInteger,
    ColumnTypeDisallowList,
    ColumnDisallowSetCharset,
    ColumnMaximumCharacterLength,
    ColumnMaximumVarcharLength,
    ColumnAutoIncrementInitialValue,
    ColumnAutoIncrementMustUnsigned,
    ColumnCurrentTimeCountLimit,
    ColumnRequireDefault,
    ColumnComment,
    ColumnDisallowDropInIndex,
    ColumnDisallowDrop,
    TableRequirePk,
    TableNoForeignKey,
    TableDropNamingConvention,
    TableDisallowPartition,
    TableDisallowTrigger,
    TableDisallowSetCharset,
    TableDisallowDdl,
    TableDisallowDml,
    TableLimitSize,
    TableRequireCharset,
    TableRequireCollation,
    TableComment,
    EngineMysqlUseInnodb,
    DatabaseDropEmptyDatabase,
    IndexNoDuplicateColumn,
    IndexKeyNumberLimit,
    IndexPkTypeLimit,
    IndexTypeNoBlob,
    IndexTotalNumberLimit,
    IndexTypeAllowList,
    SystemCharsetAllowlist,
    SystemCollationAllowlist,
    SystemCommentLength,
    SystemFunctionDisallowedList,
    SystemProcedureDisallowCreate,
    SystemEventDisallowCreate,
    SystemViewDisallowCreate,
    SystemFunctionDisallowCreate
}

impl RuleType {
    /// All rule types in catalog order.
    pub const ALL: &'static [RuleType] = &[
        Self::StatementRequireWhere,
        Self::StatementNoSelectAll,
        Self::StatementNoLeadingWildcardLike,
        Self::StatementDisallowCommit,
        Self::StatementDisallowCreateTableAs,
        Self::StatementDisallowLimit,
        Self::StatementDisallowOrderBy,
        Self::StatementMergeAlterTable,
        Self::StatementInsertRowLimit,
        Self::StatementInsertMustSpecifyColumn,
        Self::StatementInsertDisallowOrderByRand,
        Self::StatementWhereNoEqualNull,
        Self::StatementMaximumLimitValue,
        Self::StatementMaximumJoinTableCount,
        Self::StatementWhereMaximumLogicalOperatorCount,
        Self::StatementDisallowMixInDml,
        Self::StatementAddColumnWithoutPosition,
        Self::StatementWhereDisallowFunctionsAndCalculations,
        Self::StatementSelectFullTableScan,
        Self::StatementDisallowUsingFilesort,
        Self::StatementDisallowUsingTemporary,
        Self::StatementAffectedRowLimit,
        Self::NamingTable,
        Self::NamingColumn,
        Self::NamingIndexIdx,
        Self::NamingIndexUk,
        Self::NamingIndexFk,
        Self::NamingColumnAutoIncrement,
        Self::ColumnRequired,
        Self::ColumnNoNull,
        Self::ColumnDisallowChangeType,
        Self::ColumnSetDefaultForNotNull,
        Self::ColumnDisallowChange,
        Self::ColumnDisallowChangingOrder,
        Self::ColumnAutoIncrementMustInteger,
        Self::ColumnTypeDisallowList,
        Self::ColumnDisallowSetCharset,
        Self::ColumnMaximumCharacterLength,
        Self::ColumnMaximumVarcharLength,
        Self::ColumnAutoIncrementInitialValue,
        Self::ColumnAutoIncrementMustUnsigned,
        Self::ColumnCurrentTimeCountLimit,
        Self::ColumnRequireDefault,
        Self::ColumnComment,
        Self::ColumnDisallowDropInIndex,
        Self::ColumnDisallowDrop,
        Self::TableRequirePk,
        Self::TableNoForeignKey,
        Self::TableDropNamingConvention,
        Self::TableDisallowPartition,
        Self::TableDisallowTrigger,
        Self::TableDisallowSetCharset,
        Self::TableDisallowDdl,
        Self::TableDisallowDml,
        Self::TableLimitSize,
        Self::TableRequireCharset,
        Self::TableRequireCollation,
        Self::TableComment,
        Self::EngineMysqlUseInnodb,
        Self::DatabaseDropEmptyDatabase,
        Self::IndexNoDuplicateColumn,
        Self::IndexKeyNumberLimit,
        Self::IndexPkTypeLimit,
        Self::IndexTypeNoBlob,
        Self::IndexTotalNumberLimit,
        Self::IndexTypeAllowList,
        Self::SystemCharsetAllowlist,
        Self::SystemCollationAllowlist,
        Self::SystemCommentLength,
        Self::SystemFunctionDisallowedList,
        Self::SystemProcedureDisallowCreate,
        Self::SystemEventDisallowCreate,
        Self::SystemViewDisallowCreate,
        Self::SystemFunctionDisallowCreate
    ];

    /// Identifier used in configuration files.
    pub fn id(self) -> &'static str {
        match self {
            Self::StatementRequireWhere => "statement.where.require",
            Self::StatementNoSelectAll => "statement.select.no-select-all",
            Self::StatementNoLeadingWildcardLike => "statement.where.no-leading-wildcard-like",
            Self::StatementDisallowCommit => "statement.disallow-commit",
            Self::StatementDisallowCreateTableAs => "statement.disallow-create-table-as",
            Self::StatementDisallowLimit => "statement.disallow-limit",
            Self::StatementDisallowOrderBy => "statement.disallow-order-by",
            Self::StatementMergeAlterTable => "statement.merge-alter-table",
            Self::StatementInsertRowLimit => "statement.insert.row-limit",
            Self::StatementInsertMustSpecifyColumn => "statement.insert.must-specify-column",
            Self::StatementInsertDisallowOrderByRand => "statement.insert.disallow-order-by-rand",
            Self::StatementWhereNoEqualNull => "statement.where.no-equal-null",
            Self::StatementMaximumLimitValue => "statement.maximum-limit-value",
            Self::StatementMaximumJoinTableCount => "statement.maximum-join-table-count",
            Self::StatementWhereMaximumLogicalOperatorCount => {
                "statement.where.maximum-logical-operator-count"
            }
            Self::StatementDisallowMixInDml => "statement.disallow-mix-in-dml",
            Self::StatementAddColumnWithoutPosition => "statement.add-column-without-position",
            Self::StatementWhereDisallowFunctionsAndCalculations => {
                "statement.where.disallow-functions-and-calculations"
            }
            Self::StatementSelectFullTableScan => "statement.select-full-table-scan",
            Self::StatementDisallowUsingFilesort => "statement.disallow-using-filesort",
            Self::StatementDisallowUsingTemporary => "statement.disallow-using-temporary",
            Self::StatementAffectedRowLimit => "statement.affected-row-limit",
            Self::NamingTable => "naming.table",
            Self::NamingColumn => "naming.column",
            Self::NamingIndexIdx => "naming.index.idx",
            Self::NamingIndexUk => "naming.index.uk",
            Self::NamingIndexFk => "naming.index.fk",
            Self::NamingColumnAutoIncrement => "naming.column.auto-increment",
            Self::ColumnRequired => "column.required",
            Self::ColumnNoNull => "column.no-null",
            Self::ColumnDisallowChangeType => "column.disallow-change-type",
            Self::ColumnSetDefaultForNotNull => "column.set-default-for-not-null",
            Self::ColumnDisallowChange => "column.disallow-change",
            Self::ColumnDisallowChangingOrder => "column.disallow-changing-order",
            Self::ColumnAutoIncrementMustInteger => "column.auto-increment-must-integer",
            Self::ColumnTypeDisallowList => "column.type-disallow-list",
            Self::ColumnDisallowSetCharset => "column.disallow-set-charset",
            Self::ColumnMaximumCharacterLength => "column.maximum-character-length",
            Self::ColumnMaximumVarcharLength => "column.maximum-varchar-length",
            Self::ColumnAutoIncrementInitialValue => "column.auto-increment-initial-value",
            Self::ColumnAutoIncrementMustUnsigned => "column.auto-increment-must-unsigned",
            Self::ColumnCurrentTimeCountLimit => "column.current-time-count-limit",
            Self::ColumnRequireDefault => "column.require-default",
            Self::ColumnComment => "column.comment",
            Self::ColumnDisallowDropInIndex => "column.disallow-drop-in-index",
            Self::ColumnDisallowDrop => "column.disallow-drop",
            Self::TableRequirePk => "table.require-pk",
            Self::TableNoForeignKey => "table.no-foreign-key",
            Self::TableDropNamingConvention => "table.drop-naming-convention",
            Self::TableDisallowPartition => "table.disallow-partition",
            Self::TableDisallowTrigger => "table.disallow-trigger",
            Self::TableDisallowSetCharset => "table.disallow-set-charset",
            Self::TableDisallowDdl => "table.disallow-ddl",
            Self::TableDisallowDml => "table.disallow-dml",
            Self::TableLimitSize => "table.limit-size",
            Self::TableRequireCharset => "table.require-charset",
            Self::TableRequireCollation => "table.require-collation",
            Self::TableComment => "table.comment",
            Self::EngineMysqlUseInnodb => "engine.mysql.use-innodb",
            Self::DatabaseDropEmptyDatabase => "database.drop-empty-database",
            Self::IndexNoDuplicateColumn => "index.no-duplicate-column",
            Self::IndexKeyNumberLimit => "index.key-number-limit",
            Self::IndexPkTypeLimit => "index.pk-type-limit",
            Self::IndexTypeNoBlob => "index.type-no-blob",
            Self::IndexTotalNumberLimit => "index.total-number-limit",
            Self::IndexTypeAllowList => "index.type-allow-list",
            Self::SystemCharsetAllowlist => "system.charset.allowlist",
            Self::SystemCollationAllowlist => "system.collation.allowlist",
            Self::SystemCommentLength => "system.comment.length",
            Self::SystemFunctionDisallowedList => "system.function.disallowed-list",
            Self::SystemProcedureDisallowCreate => "system.procedure.disallow-create",
            Self::SystemEventDisallowCreate => "system.event.disallow-create",
            Self::SystemViewDisallowCreate => "system.view.disallow-create",
            Self::SystemFunctionDisallowCreate => "system.function.disallow-create"
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.id().eq_ignore_ascii_case(id))
    }

    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Self::StatementInsertRowLimit
            | Self::StatementMaximumLimitValue
            | Self::StatementMaximumJoinTableCount
            | Self::StatementWhereMaximumLogicalOperatorCount
            | Self::StatementAffectedRowLimit
            | Self::ColumnMaximumCharacterLength
            | Self::ColumnMaximumVarcharLength
            | Self::ColumnAutoIncrementInitialValue
            | Self::TableLimitSize
            | Self::IndexKeyNumberLimit
            | Self::IndexTotalNumberLimit
            | Self::SystemCommentLength => PayloadKind::Number,
            Self::ColumnRequired
            | Self::ColumnTypeDisallowList
            | Self::TableDisallowDdl
            | Self::TableDisallowDml
            | Self::IndexTypeAllowList
            | Self::SystemCharsetAllowlist
            | Self::SystemCollationAllowlist
            | Self::SystemFunctionDisallowedList => PayloadKind::StringList,
            Self::NamingTable
            | Self::NamingColumn
            | Self::NamingIndexIdx
            | Self::NamingIndexUk
            | Self::NamingIndexFk
            | Self::NamingColumnAutoIncrement
            | Self::TableDropNamingConvention => PayloadKind::Naming,
            Self::ColumnComment | Self::TableComment => PayloadKind::CommentConvention,
            _ => PayloadKind::None
        }
    }

    /// Whether the rule runs `EXPLAIN` through a query executor.
    pub fn needs_executor(self) -> bool {
        matches!(
            self,
            Self::StatementSelectFullTableScan
                | Self::StatementDisallowUsingFilesort
                | Self::StatementDisallowUsingTemporary
                | Self::StatementAffectedRowLimit
        )
    }

    /// Level used by the built-in template.
    pub fn default_level(self) -> RuleLevel {
        match self {
            Self::StatementRequireWhere
            | Self::StatementDisallowCommit
            | Self::TableRequirePk
            | Self::TableDisallowDdl
            | Self::TableDisallowDml
            | Self::EngineMysqlUseInnodb
            | Self::DatabaseDropEmptyDatabase
            | Self::IndexNoDuplicateColumn
            | Self::ColumnAutoIncrementMustInteger
            | Self::SystemCharsetAllowlist => RuleLevel::Error,
            _ => RuleLevel::Warning
        }
    }

    /// Payload used by the built-in template.
    pub fn default_payload(self) -> Option<Value> {
        let payload = match self {
            Self::StatementInsertRowLimit => json!({ "number": 1000 }),
            Self::StatementMaximumLimitValue => json!({ "number": 1000 }),
            Self::StatementMaximumJoinTableCount => json!({ "number": 2 }),
            Self::StatementWhereMaximumLogicalOperatorCount => json!({ "number": 10 }),
            Self::StatementAffectedRowLimit => json!({ "number": 1000 }),
            Self::ColumnMaximumCharacterLength => json!({ "number": 20 }),
            Self::ColumnMaximumVarcharLength => json!({ "number": 2560 }),
            Self::ColumnAutoIncrementInitialValue => json!({ "number": 1 }),
            Self::TableLimitSize => json!({ "number": 10_000_000 }),
            Self::IndexKeyNumberLimit => json!({ "number": 5 }),
            Self::IndexTotalNumberLimit => json!({ "number": 5 }),
            Self::SystemCommentLength => json!({ "number": 64 }),
            Self::ColumnRequired => json!({ "list": ["id", "created_ts", "updated_ts"] }),
            Self::ColumnTypeDisallowList => json!({ "list": ["JSON", "BINARY_FLOAT"] }),
            Self::TableDisallowDdl | Self::TableDisallowDml => json!({ "list": [] }),
            Self::IndexTypeAllowList => json!({ "list": ["BTREE", "HASH"] }),
            Self::SystemCharsetAllowlist => json!({ "list": ["utf8mb4"] }),
            Self::SystemCollationAllowlist => json!({ "list": ["utf8mb4_0900_ai_ci"] }),
            Self::SystemFunctionDisallowedList => json!({ "list": ["RAND", "UUID", "SLEEP"] }),
            Self::NamingTable | Self::NamingColumn | Self::NamingColumnAutoIncrement => {
                json!({ "format": "^[a-z]+(_[a-z]+)*$", "maxLength": 64 })
            }
            Self::NamingIndexIdx => {
                json!({ "format": "^$|^idx_{{table}}_{{column_list}}$", "maxLength": 64 })
            }
            Self::NamingIndexUk => {
                json!({ "format": "^$|^uk_{{table}}_{{column_list}}$", "maxLength": 64 })
            }
            Self::NamingIndexFk => json!({
                "format": "^$|^fk_{{referencing_table}}_{{referencing_column}}_{{referenced_table}}_{{referenced_column}}$",
                "maxLength": 64
            }),
            Self::TableDropNamingConvention => json!({ "format": "_del$" }),
            Self::ColumnComment | Self::TableComment => json!({
                "required": true,
                "maxLength": 64,
                "requiredClassification": false
            }),
            _ => return None
        };
        Some(payload)
    }

    /// Built-in rule list used when no configuration is given.
    pub fn template() -> Vec<RuleConfig> {
        Self::ALL
            .iter()
            .map(|t| RuleConfig {
                rule_type: t.id().to_string(),
                level:     t.default_level(),
                payload:   t.default_payload(),
                title:     String::new()
            })
            .collect()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
