//! # SQL Advisor
//!
//! Review SQL scripts against a configurable catalog of schema and query
//! rules.
//!
//! `sql-advisor` parses each script once, optionally replays its DDL against
//! a description of the current database, and walks every statement through
//! the enabled rules. Each rule reports diagnostics with a numeric code and
//! an absolute line.
//!
//! # Quick Start
//!
//! ```bash
//! # Review a migration with the built-in rule template
//! sql-advisor check migration.sql
//!
//! # Replay against the current schema and emit SARIF for CI
//! sql-advisor check --schema schema.sql -f sarif migrations/*.sql > advisor.sarif
//!
//! # Stream a script from stdin
//! echo "DELETE FROM users" | sql-advisor check -
//!
//! # List every rule with its payload shape and default level
//! sql-advisor rules
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`SQL_ADVISOR_DIALECT`)
//! 3. The `--config` file
//! 4. `.sql-advisor.toml` in current directory
//! 5. `~/.config/sql-advisor/config.toml`
//! 6. The built-in rule template
//!
//! # Exit Codes
//!
//! - `0` - No findings above success level
//! - `1` - Warnings found
//! - `2` - Errors found, or the review could not run
//!
//! # Logging
//!
//! Log output goes to stderr. The default filter is `warn`, `--verbose`
//! raises it to `debug`, and `RUST_LOG` overrides both.

use std::process;

use clap::Parser;
use env_logger::Env;
use sql_advisor::{
    app::{CheckParams, run_check, run_rules_listing},
    cli::{Cli, Commands},
    config::Config,
    error::AppResult
};

/// Exit code used when the review itself fails.
const FAILURE_EXIT_CODE: i32 = 2;

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.command.verbose() { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(FAILURE_EXIT_CODE);
        }
    }
}

fn run(cli: Cli) -> AppResult<i32> {
    match cli.command {
        Commands::Check {
            files,
            config,
            schema,
            metadata,
            dialect,
            output_format,
            verbose,
            no_color
        } => {
            let config = Config::load(config.as_deref())?;
            let params = CheckParams {
                files,
                schema,
                metadata,
                dialect,
                output_format,
                verbose,
                no_color
            };
            let result = run_check(params, &config)?;
            println!("{}", result.output);
            Ok(result.exit_code)
        }
        Commands::Rules {
            output_format,
            no_color
        } => {
            print!("{}", run_rules_listing(output_format, no_color));
            Ok(0)
        }
    }
}
