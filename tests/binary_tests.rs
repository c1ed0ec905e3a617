//! Integration tests for the sql-advisor binary.

use std::{fs, io::Write};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use tempfile::{NamedTempFile, TempDir};

fn cmd(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("sql-advisor");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("SQL_ADVISOR_DIALECT")
        .env_remove("RUST_LOG");
    cmd
}

fn script(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_clean_script_exits_zero() {
    let dir = TempDir::new().unwrap();
    let queries = script("SELECT id FROM users WHERE id = 1;");
    cmd(&dir)
        .args(["check", "--no-color", queries.path().to_str().unwrap()])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("0 error(s), 0 warning(s)"));
}

#[test]
fn test_errors_exit_two() {
    let dir = TempDir::new().unwrap();
    let queries = script("DELETE FROM users;");
    cmd(&dir)
        .args(["check", "--no-color", queries.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("[202]"));
}

#[test]
fn test_warnings_exit_one() {
    let dir = TempDir::new().unwrap();
    let queries = script("SELECT * FROM users WHERE id = 1;");
    cmd(&dir)
        .args(["check", "--no-color", queries.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[203]"));
}

#[test]
fn test_stdin_input() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["check", "--no-color", "-"])
        .write_stdin("UPDATE users SET a = 1;")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("<stdin>"));
}

#[test]
fn test_local_config_file_is_applied() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".sql-advisor.toml"),
        "[rules]\ndisabled = [\"statement.where.require\"]\n"
    )
    .unwrap();
    cmd(&dir)
        .args(["check", "--no-color", "-"])
        .write_stdin("DELETE FROM users WHERE 1 = 1;\nDELETE FROM users;")
        .assert()
        .stdout(predicate::str::contains("[202]").not());
}

#[test]
fn test_explicit_config_overrides_local() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("strict.yaml"),
        "rules:\n  severity:\n    statement.select.no-select-all: error\n"
    )
    .unwrap();
    cmd(&dir)
        .args(["check", "--no-color", "--config", "strict.yaml", "-"])
        .write_stdin("SELECT * FROM users WHERE id = 1;")
        .assert()
        .code(2);
}

#[test]
fn test_schema_walk_through_failure() {
    let dir = TempDir::new().unwrap();
    let schema = script("CREATE TABLE users (id INT PRIMARY KEY);");
    cmd(&dir)
        .args(["check", "--no-color", "--schema", schema.path().to_str().unwrap(), "-"])
        .write_stdin("ALTER TABLE orders ADD COLUMN a INT;")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("[604]"));
}

#[test]
fn test_json_output() {
    let dir = TempDir::new().unwrap();
    let output = cmd(&dir)
        .args(["check", "-f", "json", "-"])
        .write_stdin("SELECT id FROM users WHERE id = 1;")
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["source"], "<stdin>");
    assert_eq!(value[0]["diagnostics"][0]["title"], "OK");
}

#[test]
fn test_sarif_output() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["check", "-f", "sarif", "-"])
        .write_stdin("DELETE FROM users;")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"version\": \"2.1.0\""));
}

#[test]
fn test_syntax_error_reported() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["check", "--no-color", "-"])
        .write_stdin("SELECT 1;\nSELEC broken;")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("[201] Syntax error"));
}

#[test]
fn test_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["check", "/nonexistent/queries.sql"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_bad_dialect_in_env_fails() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .env("SQL_ADVISOR_DIALECT", "oracle")
        .args(["check", "-"])
        .write_stdin("SELECT 1;")
        .assert()
        .failure();
}

#[test]
fn test_rules_listing() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["rules", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("index.total-number-limit"))
        .stdout(predicate::str::contains("statement.affected-row-limit"));
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"));
}
