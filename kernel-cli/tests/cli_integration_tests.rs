//! Integration tests for the kernel CLI commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kernel"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("assert"))
        .stdout(predicate::str::contains("retract"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("load"));
}

#[test]
fn test_assert_basic() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("assert")
        .arg("safe_action(/read_file).")
        .assert()
        .success()
        .stdout(predicate::str::contains("Asserted"));
}

#[test]
fn test_assert_invalid_fact() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("assert")
        .arg("not a fact (((")
        .assert()
        .failure();
}

#[test]
fn test_query_empty_predicate() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("query")
        .arg("nonexistent_predicate")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 result(s)"));
}

#[test]
fn test_validate_safe_rule() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("validate")
        .arg("idle(X) :- item(X), not active(X).")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rule parses"));
}

#[test]
fn test_validate_rejects_unsafe_rule() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("validate")
        .arg("unsafe(X) :- not bound(X).")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Rule rejected"));
}

#[test]
fn test_validate_missing_rule_arg() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("validate").assert().failure();
}

#[test]
fn test_retract_no_args() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("retract")
        .arg("widget")
        .assert()
        .success()
        .stdout(predicate::str::contains("Retracted"));
}

#[test]
fn test_load_facts_file_then_query() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "# a comment, skipped").unwrap();
    writeln!(temp_file, "item(/widget).").unwrap();
    writeln!(temp_file, "item(/gadget).").unwrap();
    temp_file.flush().unwrap();

    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("load")
        .arg(temp_file.path())
        .arg("--query")
        .arg("item")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 2 fact(s)"))
        .stdout(predicate::str::contains("2 result(s)"));
}

#[test]
fn test_load_missing_file() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("load")
        .arg("/nonexistent/file.facts")
        .assert()
        .failure();
}

#[test]
fn test_unknown_command() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("unknown").assert().failure();
}

#[test]
fn test_cli_no_args() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_verbose_flag_with_assert() {
    let mut cmd = Command::cargo_bin("kernel").unwrap();
    cmd.arg("--verbose")
        .arg("assert")
        .arg("item(/thing).")
        .assert()
        .success();
}
