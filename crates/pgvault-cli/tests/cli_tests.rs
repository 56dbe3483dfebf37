//! CLI integration tests for pgvault.
//!
//! These tests verify command-line argument parsing, help output, the
//! offline describe report, and exit codes for configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the pgvault binary.
fn cmd() -> Command {
    Command::cargo_bin("pgvault").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_describe_subcommand_help() {
    cmd()
        .args(["describe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--schema"))
        .stdout(predicate::str::contains("--table"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pgvault"));
}

#[test]
fn test_log_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("--verbosity"));
}

// =============================================================================
// Describe (offline)
// =============================================================================

fn schema_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_describe_reports_tables_and_types() {
    let schema = schema_file(
        "CREATE TABLE IF NOT EXISTS items (
            id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
            title TEXT NOT NULL,
            embedding VECTOR(384)
        );",
    );

    cmd()
        .args(["describe", "--schema"])
        .arg(schema.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("table items"))
        .stdout(predicate::str::contains("primary key"))
        .stdout(predicate::str::contains("encryptable"))
        .stdout(predicate::str::contains("vector(384)"))
        .stdout(predicate::str::contains("vector search available"));
}

#[test]
fn test_describe_single_table_filter() {
    let schema = schema_file(
        "CREATE TABLE a (id BIGINT); CREATE TABLE b (id BIGINT);",
    );

    cmd()
        .args(["describe", "--table", "b", "--schema"])
        .arg(schema.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("table b"))
        .stdout(predicate::str::contains("table a").not());
}

#[test]
fn test_describe_missing_table_reported() {
    let schema = schema_file("CREATE TABLE a (id BIGINT);");

    cmd()
        .args(["describe", "--table", "zzz", "--schema"])
        .arg(schema.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"));
}

// =============================================================================
// Error handling
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "/nonexistent/pgvault.yaml", "health-check"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    config
        .write_all(
            b"
connection:
  host: ''
  database: vault_db
  user: postgres
store:
  schema_file: schema.sql
",
        )
        .unwrap();

    cmd()
        .args(["--config"])
        .arg(config.path())
        .arg("health-check")
        .assert()
        .failure()
        .code(2);
}
