//! Application logic for the `sql-advisor` CLI.
//!
//! This module contains the command implementations separated from the main
//! entry point to enable testing.

use std::{
    fs::read_to_string,
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc
};

use rayon::prelude::*;

use crate::{
    catalog::Schema,
    cli::{Dialect, Format},
    config::Config,
    diagnostic::{ReviewReport, Severity},
    error::{AppResult, file_read_error},
    output::{OutputFormat, OutputOptions, format_reports, format_rules},
    query::SqlDialect,
    review::{ReviewContext, review},
    rules::RuleConfig
};

/// Name used for standard input in reports.
pub const STDIN_SOURCE: &str = "<stdin>";

/// Parameters for the check command
#[derive(Debug, Clone)]
pub struct CheckParams {
    pub files:         Vec<PathBuf>,
    pub schema:        Option<PathBuf>,
    pub metadata:      Option<PathBuf>,
    pub dialect:       Option<Dialect>,
    pub output_format: Format,
    pub verbose:       bool,
    pub no_color:      bool
}

/// Result of a check containing the rendered output
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub exit_code: i32,
    pub output:    String,
    pub reports:   Vec<ReviewReport>
}

/// Convert CLI dialect to internal SqlDialect
pub fn convert_dialect(dialect: Dialect) -> SqlDialect {
    match dialect {
        Dialect::Generic => SqlDialect::Generic,
        Dialect::Mysql => SqlDialect::MySQL,
        Dialect::Postgresql => SqlDialect::PostgreSQL,
        Dialect::Sqlite => SqlDialect::SQLite
    }
}

/// Convert CLI format to internal OutputFormat
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml,
        Format::Sarif => OutputFormat::Sarif
    }
}

/// Create output options from parameters
pub fn create_output_options(format: Format, no_color: bool, verbose: bool) -> OutputOptions {
    OutputOptions {
        format: convert_format(format),
        colored: !no_color,
        verbose
    }
}

/// Calculate exit code from the most severe diagnostic of all reports
pub fn calculate_exit_code(reports: &[ReviewReport]) -> i32 {
    match reports
        .iter()
        .map(ReviewReport::highest_severity)
        .max()
        .unwrap_or(Severity::Success)
    {
        Severity::Error => 2,
        Severity::Warning => 1,
        Severity::Success => 0
    }
}

/// Read a script from file or stdin (`-`)
pub fn read_input(path: &Path) -> AppResult<String> {
    if path.to_str() == Some("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| file_read_error("stdin", e))?;
        Ok(buffer)
    } else {
        read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))
    }
}

fn source_name(path: &Path) -> String {
    if path.to_str() == Some("-") {
        STDIN_SOURCE.to_string()
    } else {
        path.display().to_string()
    }
}

/// Load the origin catalog from a DDL file or a metadata file
pub fn load_catalog(
    schema: Option<&Path>,
    metadata: Option<&Path>,
    dialect: SqlDialect
) -> AppResult<Option<Schema>> {
    if let Some(path) = metadata {
        return Schema::load_metadata(path).map(Some);
    }
    let Some(path) = schema else {
        return Ok(None);
    };
    let sql = read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
    Schema::parse(&sql, dialect).map(Some)
}

/// Effective dialect: command line, then configuration, then MySQL
pub fn resolve_dialect(cli: Option<Dialect>, config: &Config) -> AppResult<SqlDialect> {
    if let Some(dialect) = cli {
        return Ok(convert_dialect(dialect));
    }
    Ok(config.dialect()?.unwrap_or_default())
}

/// Review already-read inputs in parallel, preserving input order
///
/// # Errors
///
/// Returns the first contract error (for example an undecodable payload).
pub fn review_inputs(
    inputs: Vec<(String, String)>,
    rules: &[RuleConfig],
    context: &ReviewContext
) -> AppResult<Vec<ReviewReport>> {
    inputs
        .into_par_iter()
        .map(|(source, script)| {
            log::debug!("reviewing {}", source);
            review(&script, rules, context)
                .map(|diagnostics| ReviewReport::new(source, diagnostics))
        })
        .collect()
}

/// Run the check command
///
/// # Errors
///
/// Returns error if an input, the catalog or the configuration cannot be
/// read, or if the configuration is invalid.
pub fn run_check(params: CheckParams, config: &Config) -> AppResult<CheckResult> {
    let dialect = resolve_dialect(params.dialect, config)?;
    let rules = config.rule_configs()?;

    let mut context =
        ReviewContext::new(dialect).with_classification(config.classification.ids.clone());
    let catalog = load_catalog(params.schema.as_deref(), params.metadata.as_deref(), dialect)?;
    if let Some(catalog) = catalog {
        log::debug!("loaded catalog with {} tables", catalog.table_count());
        context = context.with_catalog(Arc::new(catalog));
    }

    // stdin can only be consumed once, so inputs are read before fanning out
    let inputs = params
        .files
        .iter()
        .map(|path| Ok((source_name(path), read_input(path)?)))
        .collect::<AppResult<Vec<_>>>()?;

    let reports = review_inputs(inputs, &rules, &context)?;
    let opts = create_output_options(params.output_format, params.no_color, params.verbose);
    Ok(CheckResult {
        exit_code: calculate_exit_code(&reports),
        output: format_reports(&reports, &opts),
        reports
    })
}

/// Run the rules command
pub fn run_rules_listing(format: Format, no_color: bool) -> String {
    format_rules(&create_output_options(format, no_color, false))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::diagnostic::{Code, Diagnostic};

    fn params(files: Vec<PathBuf>) -> CheckParams {
        CheckParams {
            files,
            schema: None,
            metadata: None,
            dialect: None,
            output_format: Format::Json,
            verbose: false,
            no_color: true
        }
    }

    fn script(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_convert_dialect() {
        assert_eq!(convert_dialect(Dialect::Postgresql), SqlDialect::PostgreSQL);
        assert_eq!(convert_dialect(Dialect::Mysql), SqlDialect::MySQL);
    }

    #[test]
    fn test_convert_format_sarif() {
        assert_eq!(convert_format(Format::Sarif), OutputFormat::Sarif);
    }

    #[test]
    fn test_calculate_exit_code() {
        let ok = ReviewReport::new("a", vec![Diagnostic::ok()]);
        let warn = ReviewReport::new(
            "b",
            vec![Diagnostic::new(Severity::Warning, Code::STATEMENT_SELECT_ALL, "t", "m")]
        );
        let error = ReviewReport::new(
            "c",
            vec![Diagnostic::new(Severity::Error, Code::STATEMENT_NO_WHERE, "t", "m")]
        );
        assert_eq!(calculate_exit_code(&[]), 0);
        assert_eq!(calculate_exit_code(std::slice::from_ref(&ok)), 0);
        assert_eq!(calculate_exit_code(&[ok.clone(), warn.clone()]), 1);
        assert_eq!(calculate_exit_code(&[ok, warn, error]), 2);
    }

    #[test]
    fn test_resolve_dialect_precedence() {
        let config = Config::from_toml("dialect = \"sqlite\"").unwrap();
        assert_eq!(resolve_dialect(None, &config).unwrap(), SqlDialect::SQLite);
        assert_eq!(
            resolve_dialect(Some(Dialect::Generic), &config).unwrap(),
            SqlDialect::Generic
        );
        assert_eq!(resolve_dialect(None, &Config::default()).unwrap(), SqlDialect::MySQL);
    }

    #[test]
    fn test_missing_input_is_error() {
        let result = run_check(
            params(vec![PathBuf::from("/nonexistent/q.sql")]),
            &Config::default()
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_check_reports_per_file_in_order() {
        let clean = script("SELECT id FROM t WHERE id = 1;\n");
        let dirty = script("DELETE FROM t;\n");
        let result = run_check(
            params(vec![clean.path().to_path_buf(), dirty.path().to_path_buf()]),
            &Config::default()
        )
        .unwrap();
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.reports[0].source, clean.path().display().to_string());
        assert_eq!(result.reports[0].finding_count(), 0);
        assert!(
            result.reports[1]
                .diagnostics
                .iter()
                .any(|d| d.code == Code::STATEMENT_NO_WHERE)
        );
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_schema_file_enables_catalog() {
        let schema = script("CREATE TABLE t (id INT PRIMARY KEY);\n");
        let queries = script("CREATE TABLE t (id INT PRIMARY KEY);\n");
        let mut p = params(vec![queries.path().to_path_buf()]);
        p.schema = Some(schema.path().to_path_buf());
        let result = run_check(p, &Config::default()).unwrap();
        assert_eq!(result.reports[0].diagnostics.len(), 1);
        assert_eq!(result.reports[0].diagnostics[0].code, Code::TABLE_EXISTS);
    }

    #[test]
    fn test_rules_listing() {
        let listing = run_rules_listing(Format::Json, true);
        let value: serde_json::Value = serde_json::from_str(&listing).unwrap();
        assert!(value.as_array().unwrap().len() > 60);
    }
}
