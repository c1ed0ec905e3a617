// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use clap::Parser;
use sql_advisor::{
    app::{convert_dialect, convert_format, create_output_options},
    cli::{Cli, Commands, Dialect, Format},
    output::OutputFormat,
    query::SqlDialect
};

#[test]
fn test_check_arguments() {
    let cli = Cli::parse_from([
        "sql-advisor",
        "check",
        "--config",
        "advisor.toml",
        "--metadata",
        "catalog.json",
        "--dialect",
        "sqlite",
        "-f",
        "sarif",
        "--no-color",
        "a.sql",
        "b.sql"
    ]);
    let Commands::Check {
        files,
        config,
        metadata,
        dialect,
        output_format,
        no_color,
        ..
    } = cli.command
    else {
        panic!("expected check command");
    };
    assert_eq!(files.len(), 2);
    assert!(config.is_some());
    assert!(metadata.is_some());
    assert_eq!(dialect, Some(Dialect::Sqlite));
    assert_eq!(output_format, Format::Sarif);
    assert!(no_color);
}

#[test]
fn test_rules_command() {
    let cli = Cli::parse_from(["sql-advisor", "rules", "-f", "json"]);
    assert!(matches!(
        cli.command,
        Commands::Rules {
            output_format: Format::Json,
            ..
        }
    ));
}

#[test]
fn test_unknown_dialect_rejected() {
    assert!(
        Cli::try_parse_from(["sql-advisor", "check", "--dialect", "clickhouse", "a.sql"]).is_err()
    );
}

#[test]
fn test_conversions() {
    assert_eq!(convert_dialect(Dialect::Generic), SqlDialect::Generic);
    assert_eq!(convert_dialect(Dialect::Sqlite), SqlDialect::SQLite);
    assert_eq!(convert_format(Format::Yaml), OutputFormat::Yaml);
    let opts = create_output_options(Format::Text, true, true);
    assert!(!opts.colored);
    assert!(opts.verbose);
}
