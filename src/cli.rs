use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// SQL Advisor - Review SQL scripts against configurable schema and query
/// rules
#[derive(Parser, Debug)]
#[command(name = "sql-advisor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Review SQL scripts
    Check {
        /// SQL files to review (use - for stdin)
        #[arg(default_value = "-")]
        files: Vec<PathBuf>,

        /// Configuration file (TOML, or YAML for .yaml/.yml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// DDL file describing the current database state
        #[arg(short, long, conflicts_with = "metadata")]
        schema: Option<PathBuf>,

        /// JSON or YAML catalog file describing the current database state
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// SQL dialect for parsing (overrides configuration)
        #[arg(short, long, value_enum)]
        dialect: Option<Dialect>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format,

        /// Enable debug logging and show successful files
        #[arg(short, long)]
        verbose: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    },
    /// List the rule catalog
    Rules {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    }
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Self::Check { verbose: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dialect {
    Generic,
    Mysql,
    Postgresql,
    Sqlite
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml,
    Sarif
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_defaults_to_stdin() {
        let cli = Cli::parse_from(["sql-advisor", "check"]);
        match cli.command {
            Commands::Check {
                files,
                dialect,
                output_format,
                ..
            } => {
                assert_eq!(files, [PathBuf::from("-")]);
                assert_eq!(dialect, None);
                assert_eq!(output_format, Format::Text);
            }
            Commands::Rules { .. } => panic!("expected check")
        }
    }

    #[test]
    fn test_schema_conflicts_with_metadata() {
        let result = Cli::try_parse_from([
            "sql-advisor", "check", "--schema", "a.sql", "--metadata", "b.json", "q.sql"
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::parse_from(["sql-advisor", "check", "-v", "-d", "postgresql", "q.sql"]);
        assert!(cli.command.verbose());
    }
}
