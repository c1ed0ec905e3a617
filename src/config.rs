//! Configuration loading and management.
//!
//! Configuration is layered. Later sources override earlier ones:
//!
//! 1. Built-in rule template
//! 2. `~/.config/sql-advisor/config.toml`
//! 3. `.sql-advisor.toml` in current directory
//! 4. File given with `--config` (TOML, or YAML for `.yaml` / `.yml`)
//! 5. Environment variables
//! 6. Command-line arguments
//!
//! # Configuration File Format
//!
//! ```toml
//! dialect = "mysql"
//!
//! [rules]
//! disabled = ["statement.select.no-select-all"]
//!
//! [rules.severity]
//! "statement.where.require" = "error"
//!
//! [rules.payload]
//! "column.maximum-varchar-length" = { number = 255 }
//!
//! [classification]
//! ids = ["1", "1-1", "1-2"]
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SQL_ADVISOR_DIALECT` | Dialect used when no `--dialect` is given |

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf}
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{AppResult, config_error, file_read_error},
    query::SqlDialect,
    rules::{RuleConfig, RuleLevel, RuleType}
};

/// Environment variable holding the default dialect.
pub const DIALECT_ENV: &str = "SQL_ADVISOR_DIALECT";

/// Name of the per-project configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".sql-advisor.toml";

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub dialect:        Option<String>,
    #[serde(default)]
    pub rules:          RulesConfig,
    #[serde(default)]
    pub classification: ClassificationConfig
}

/// Rules configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RulesConfig {
    /// Disabled rule types
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Level overrides (rule type -> level)
    #[serde(default)]
    pub severity: HashMap<String, String>,
    /// Payload overrides (rule type -> payload)
    #[serde(default)]
    pub payload:  HashMap<String, Value>
}

/// Data classification used by comment rules
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClassificationConfig {
    #[serde(default)]
    pub ids: Vec<String>
}

impl Config {
    /// Load configuration from the standard locations, an optional explicit
    /// file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file exists but cannot be read or
    /// parsed, or if the explicit file does not exist.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sql-advisor")
                .join("config.toml");
            if home_config.exists() {
                config.merge(Self::from_file(&home_config)?);
            }
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            config.merge(Self::from_file(&local_config)?);
        }

        if let Some(path) = explicit {
            config.merge(Self::from_file(path)?);
        }

        if let Ok(dialect) = env::var(DIALECT_ENV) {
            config.dialect = Some(dialect);
        }

        Ok(config)
    }

    /// Read one configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    /// (or YAML for `.yaml` / `.yml` files).
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
        let yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// # Errors
    ///
    /// Returns an error if the content is not a valid configuration.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// # Errors
    ///
    /// Returns an error if the content is not a valid configuration.
    pub fn from_yaml(content: &str) -> AppResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Layer `other` on top of `self`.
    pub fn merge(&mut self, other: Self) {
        if other.dialect.is_some() {
            self.dialect = other.dialect;
        }
        for rule in other.rules.disabled {
            if !self.rules.disabled.contains(&rule) {
                self.rules.disabled.push(rule);
            }
        }
        self.rules.severity.extend(other.rules.severity);
        self.rules.payload.extend(other.rules.payload);
        if !other.classification.ids.is_empty() {
            self.classification = other.classification;
        }
    }

    /// Configured dialect, if any.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown dialect name.
    pub fn dialect(&self) -> AppResult<Option<SqlDialect>> {
        self.dialect
            .as_deref()
            .map(|name| {
                SqlDialect::from_name(name)
                    .ok_or_else(|| config_error(format!("Unknown dialect: {}", name)))
            })
            .transpose()
    }

    /// The rule list: the built-in template with this configuration's
    /// overrides applied.
    ///
    /// Unknown rule types in the configuration are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown level name.
    pub fn rule_configs(&self) -> AppResult<Vec<RuleConfig>> {
        let mut configs = RuleType::template();
        let known = |id: &str| {
            let found = RuleType::from_id(id).is_some();
            if !found {
                log::warn!("ignoring configuration for unknown rule {}", id);
            }
            found
        };

        for (id, level) in &self.rules.severity {
            if !known(id) {
                continue;
            }
            let level = RuleLevel::from_name(level)
                .ok_or_else(|| {
                    config_error(format!("Unknown level \"{}\" for rule {}", level, id))
                })?;
            if let Some(config) = find(&mut configs, id) {
                config.level = level;
            }
        }
        for (id, payload) in &self.rules.payload {
            if known(id)
                && let Some(config) = find(&mut configs, id)
            {
                config.payload = Some(payload.clone());
            }
        }
        for id in &self.rules.disabled {
            if known(id)
                && let Some(config) = find(&mut configs, id)
            {
                config.level = RuleLevel::Disabled;
            }
        }
        Ok(configs)
    }
}

fn find<'a>(configs: &'a mut [RuleConfig], id: &str) -> Option<&'a mut RuleConfig> {
    configs
        .iter_mut()
        .find(|c| c.rule_type.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SAMPLE: &str = r#"
dialect = "postgresql"

[rules]
disabled = ["statement.select.no-select-all"]

[rules.severity]
"statement.where.require" = "warn"

[rules.payload]
"column.maximum-varchar-length" = { number = 255 }

[classification]
ids = ["1", "1-1"]
"#;

    fn rule<'a>(configs: &'a [RuleConfig], rule_type: RuleType) -> &'a RuleConfig {
        configs
            .iter()
            .find(|c| c.rule_type == rule_type.id())
            .unwrap()
    }

    #[test]
    fn test_toml_overrides_template() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.dialect().unwrap(), Some(SqlDialect::PostgreSQL));
        assert_eq!(config.classification.ids, ["1", "1-1"]);
        let configs = config.rule_configs().unwrap();
        assert_eq!(configs.len(), RuleType::ALL.len());
        assert_eq!(rule(&configs, RuleType::StatementNoSelectAll).level, RuleLevel::Disabled);
        assert_eq!(rule(&configs, RuleType::StatementRequireWhere).level, RuleLevel::Warning);
        assert_eq!(
            rule(&configs, RuleType::ColumnMaximumVarcharLength).payload,
            Some(json!({ "number": 255 }))
        );
    }

    #[test]
    fn test_yaml_config() {
        let config =
            Config::from_yaml("dialect: sqlite\nrules:\n  disabled: [\"naming.table\"]\n").unwrap();
        assert_eq!(config.dialect().unwrap(), Some(SqlDialect::SQLite));
        assert_eq!(config.rules.disabled, ["naming.table"]);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut base = Config::from_toml(SAMPLE).unwrap();
        let over =
            Config::from_toml("dialect = \"mysql\"\n[rules]\ndisabled = [\"naming.table\"]\n")
                .unwrap();
        base.merge(over);
        assert_eq!(base.dialect.as_deref(), Some("mysql"));
        assert_eq!(base.rules.disabled.len(), 2);
        assert_eq!(base.classification.ids, ["1", "1-1"]);
    }

    #[test]
    fn test_unknown_level_is_error() {
        let config = Config::from_toml("[rules.severity]\n\"naming.table\" = \"fatal\"\n").unwrap();
        assert!(config.rule_configs().is_err());
    }

    #[test]
    fn test_unknown_rule_is_ignored() {
        let config = Config::from_toml("[rules]\ndisabled = [\"no.such.rule\"]\n").unwrap();
        assert_eq!(config.rule_configs().unwrap(), RuleType::template());
    }

    #[test]
    fn test_unknown_dialect() {
        let config = Config::from_toml("dialect = \"oracle\"\n").unwrap();
        assert!(config.dialect().is_err());
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
        let path = dir.path().join("advisor.yml");
        fs::write(&path, "classification:\n  ids: [\"2\"]\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().classification.ids, ["2"]);
    }
}
