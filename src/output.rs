//! Report formatting.
//!
//! - `text` - colored, one line per diagnostic, grouped by input
//! - `json` / `yaml` - the reports as data
//! - `sarif` - SARIF 2.1.0 for code-scanning integrations

use colored::Colorize;
use serde::Serialize;

use crate::{
    diagnostic::{Diagnostic, ReviewReport, Severity},
    rules::{PayloadKind, RuleLevel, RuleType}
};

const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
const INFORMATION_URI: &str = "https://github.com/RAprogramm/sql-advisor";

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
    Sarif
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Format review reports based on output options
pub fn format_reports(reports: &[ReviewReport], opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(reports).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(reports).unwrap_or_default(),
        OutputFormat::Sarif => format_sarif(reports),
        OutputFormat::Text => format_text(reports, opts)
    }
}

fn paint(text: &str, severity: Severity, colored: bool) -> String {
    if !colored {
        return text.to_string();
    }
    match severity {
        Severity::Error => text.red().bold().to_string(),
        Severity::Warning => text.yellow().bold().to_string(),
        Severity::Success => text.green().to_string()
    }
}

fn format_diagnostic(diagnostic: &Diagnostic, colored: bool) -> String {
    let location = match diagnostic.position.column {
        Some(column) => format!("{}:{}", diagnostic.line(), column),
        None => diagnostic.line().to_string()
    };
    let severity = paint(
        &format!("{:<7}", diagnostic.severity.to_string()),
        diagnostic.severity,
        colored
    );
    let mut line = format!(
        "  {:>6}  {} [{}] {}",
        location, severity, diagnostic.code, diagnostic.title
    );
    if !diagnostic.message.is_empty() {
        line.push_str(": ");
        line.push_str(&diagnostic.message);
    }
    line
}

fn format_text(reports: &[ReviewReport], opts: &OutputOptions) -> String {
    let mut output = String::new();
    let (mut errors, mut warnings) = (0, 0);

    for report in reports {
        errors += report.error_count();
        warnings += report.warning_count();
        if report.finding_count() == 0 {
            if opts.verbose {
                let ok = paint("OK", Severity::Success, opts.colored);
                output.push_str(&format!("{}: {}\n", report.source, ok));
            }
            continue;
        }
        let header = if opts.colored {
            report.source.bold().to_string()
        } else {
            report.source.clone()
        };
        output.push_str(&header);
        output.push('\n');
        for diagnostic in report.diagnostics.iter().filter(|d| !d.is_ok()) {
            output.push_str(&format_diagnostic(diagnostic, opts.colored));
            output.push('\n');
        }
        output.push('\n');
    }

    let summary = format!(
        "{} file(s) checked: {} error(s), {} warning(s)",
        reports.len(),
        errors,
        warnings
    );
    let severity = if errors > 0 {
        Severity::Error
    } else if warnings > 0 {
        Severity::Warning
    } else {
        Severity::Success
    };
    output.push_str(&paint(&summary, severity, opts.colored));
    output
}

#[derive(Serialize)]
struct SarifReport {
    #[serde(rename = "$schema")]
    schema:  &'static str,
    version: &'static str,
    runs:    Vec<SarifRun>
}

#[derive(Serialize)]
struct SarifRun {
    tool:    SarifTool,
    results: Vec<SarifResult>
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifDriver {
    name:            &'static str,
    version:         &'static str,
    information_uri: &'static str
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    rule_id:   String,
    level:     &'static str,
    message:   SarifMessage,
    locations: Vec<SarifLocation>
}

#[derive(Serialize)]
struct SarifMessage {
    text: String
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    physical_location: SarifPhysicalLocation
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifPhysicalLocation {
    artifact_location: SarifArtifactLocation,
    region:            SarifRegion
}

#[derive(Serialize)]
struct SarifArtifactLocation {
    uri: String
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRegion {
    start_line:   u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_column: Option<u64>
}

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Success => "note"
    }
}

fn format_sarif(reports: &[ReviewReport]) -> String {
    let results = reports
        .iter()
        .flat_map(|report| {
            report
                .diagnostics
                .iter()
                .filter(|d| !d.is_ok())
                .map(move |d| SarifResult {
                    rule_id:   if d.title.is_empty() {
                        d.code.to_string()
                    } else {
                        d.title.clone()
                    },
                    level:     sarif_level(d.severity),
                    message:   SarifMessage {
                        text: format!("[{}] {}", d.code, d.message)
                    },
                    locations: vec![SarifLocation {
                        physical_location: SarifPhysicalLocation {
                            artifact_location: SarifArtifactLocation {
                                uri: report.source.clone()
                            },
                            // SARIF lines are 1-based; document-level findings go to line 1
                            region:            SarifRegion {
                                start_line:   d.line().max(1),
                                start_column: d.position.column
                            }
                        }
                    }]
                })
        })
        .collect();

    let sarif = SarifReport {
        schema:  SARIF_SCHEMA,
        version: "2.1.0",
        runs:    vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name:            env!("CARGO_PKG_NAME"),
                    version:         env!("CARGO_PKG_VERSION"),
                    information_uri: INFORMATION_URI
                }
            },
            results
        }]
    };
    serde_json::to_string_pretty(&sarif).unwrap_or_default()
}

/// One row of the rule catalog listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEntry {
    pub id:             &'static str,
    pub payload_kind:   PayloadKind,
    pub default_level:  RuleLevel,
    pub needs_executor: bool
}

impl From<RuleType> for RuleEntry {
    fn from(rule_type: RuleType) -> Self {
        Self {
            id:             rule_type.id(),
            payload_kind:   rule_type.payload_kind(),
            default_level:  rule_type.default_level(),
            needs_executor: rule_type.needs_executor()
        }
    }
}

/// Format the rule catalog
pub fn format_rules(opts: &OutputOptions) -> String {
    let entries: Vec<RuleEntry> = RuleType::ALL.iter().copied().map(RuleEntry::from).collect();
    match opts.format {
        OutputFormat::Json | OutputFormat::Sarif => {
            serde_json::to_string_pretty(&entries).unwrap_or_default()
        }
        OutputFormat::Yaml => serde_yaml::to_string(&entries).unwrap_or_default(),
        OutputFormat::Text => {
            let mut output = String::new();
            for entry in &entries {
                let id = format!("{:<52}", entry.id);
                let id = if opts.colored {
                    id.cyan().to_string()
                } else {
                    id
                };
                let executor = if entry.needs_executor { "  (explain)" } else { "" };
                output.push_str(&format!(
                    "{} {:<8} {}{}\n",
                    id,
                    entry.default_level.to_string(),
                    entry.payload_kind,
                    executor
                ));
            }
            output
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Code;

    fn plain(format: OutputFormat) -> OutputOptions {
        OutputOptions {
            format,
            colored: false,
            verbose: false
        }
    }

    fn sample() -> Vec<ReviewReport> {
        vec![
            ReviewReport::new(
                "a.sql",
                vec![
                    Diagnostic::new(
                        Severity::Error,
                        Code::STATEMENT_NO_WHERE,
                        "statement.where.require",
                        "\"DELETE FROM t\" requires WHERE clause"
                    )
                    .at(3, None),
                ]
            ),
            ReviewReport::new("b.sql", vec![Diagnostic::ok()]),
        ]
    }

    #[test]
    fn test_text_lists_findings_and_summary() {
        let text = format_reports(&sample(), &plain(OutputFormat::Text));
        assert!(text.contains("a.sql"));
        assert!(text.contains("[202] statement.where.require"));
        assert!(!text.contains("b.sql"));
        assert!(text.ends_with("2 file(s) checked: 1 error(s), 0 warning(s)"));
    }

    #[test]
    fn test_text_verbose_shows_clean_files() {
        let mut opts = plain(OutputFormat::Text);
        opts.verbose = true;
        assert!(format_reports(&sample(), &opts).contains("b.sql: OK"));
    }

    #[test]
    fn test_json_is_parseable() {
        let json = format_reports(&sample(), &plain(OutputFormat::Json));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["diagnostics"][0]["code"], 202);
        assert_eq!(value[0]["diagnostics"][0]["position"]["line"], 3);
    }

    #[test]
    fn test_sarif_skips_ok_records() {
        let sarif = format_reports(&sample(), &plain(OutputFormat::Sarif));
        let value: serde_json::Value = serde_json::from_str(&sarif).unwrap();
        let results = value["runs"][0]["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["level"], "error");
        assert_eq!(results[0]["locations"][0]["physicalLocation"]["region"]["startLine"], 3);
    }

    #[test]
    fn test_rules_listing_covers_catalog() {
        let text = format_rules(&plain(OutputFormat::Text));
        assert_eq!(text.lines().count(), RuleType::ALL.len());
        assert!(text.contains("statement.select-full-table-scan"));
    }
}
