//! CLI integration tests for the sitecraft binary
//!
//! These tests run the compiled binary and check its output and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

use sitecraft::error::{ErrorCategory, StructuredError};

/// Get a Command instance for the sitecraft binary
#[allow(deprecated)]
fn sitecraft_cmd() -> Command {
    let mut cmd = Command::cargo_bin("sitecraft").expect("Failed to find sitecraft binary");
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn json_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

// ============================================================================
// --help flag tests
// ============================================================================

#[test]
fn test_help_lists_commands() {
    sitecraft_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("explain"))
        .stdout(predicate::str::contains("policy"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn test_version_flag() {
    sitecraft_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// explain command tests
// ============================================================================

#[test]
fn test_explain_refused_connection() {
    sitecraft_cmd()
        .args(["explain", "connect ECONNREFUSED 127.0.0.1:4000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connection Refused [ECONNREFUSED]"))
        .stdout(predicate::str::contains("Actions: retry"));
}

#[test]
fn test_explain_strips_home_paths() {
    sitecraft_cmd()
        .args([
            "explain",
            "ENOENT: no such file or directory, open '/home/bob/site/index.md'",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("File Not Found"))
        .stdout(predicate::str::contains("index.md"))
        .stdout(predicate::str::contains("/home/bob").not());
}

#[test]
fn test_explain_json_output() {
    sitecraft_cmd()
        .args(["explain", "bad input", "--code", "VALIDATION_ERROR", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"errorCode\": \"VALIDATION_ERROR\""))
        .stdout(predicate::str::contains("\"title\": \"Invalid Input\""));
}

#[test]
fn test_explain_missing_config_file() {
    sitecraft_cmd()
        .args(["explain", "boom", "--config", "/nonexistent/sitecraft.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

// ============================================================================
// policy command tests
// ============================================================================

#[test]
fn test_policy_for_blacklisted_channel() {
    sitecraft_cmd()
        .args(["policy", "build-website"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"blacklisted\": true"))
        .stdout(predicate::str::contains("\"maxAttempts\": 1"));
}

#[test]
fn test_policy_for_dns_channel() {
    sitecraft_cmd()
        .args(["policy", "check-dns"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"maxAttempts\": 5"))
        .stdout(predicate::str::contains("\"baseDelayMs\": 2000"));
}

#[test]
fn test_policy_from_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    writeln!(
        file,
        "[retry]\nblacklist = [\"sync-assets\"]\n\n[retry.channels.publish-feed]\nmax_attempts = 6\nretryable_error_codes = [\"ETIMEDOUT\"]"
    )
    .expect("Failed to write config");

    sitecraft_cmd()
        .args(["policy", "publish-feed", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"maxAttempts\": 6"))
        .stdout(predicate::str::contains("ETIMEDOUT"));

    sitecraft_cmd()
        .args(["policy", "sync-assets", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"blacklisted\": true"));
}

// ============================================================================
// inspect command tests
// ============================================================================

#[test]
fn test_inspect_valid_record() {
    let error = StructuredError::new("disk full", "ENOSPC", ErrorCategory::FileSystem);
    let file = json_file(&error.to_json().to_string());

    sitecraft_cmd()
        .arg("inspect")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[ENOSPC]"));
}

#[test]
fn test_inspect_invalid_json() {
    let file = json_file("{ not json");

    sitecraft_cmd()
        .arg("inspect")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_inspect_schema_violation() {
    let file = json_file(r#"{"message": "no code or category"}"#);

    sitecraft_cmd()
        .arg("inspect")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn test_inspect_logs_at_configured_level() {
    let error = StructuredError::new("disk full", "ENOSPC", ErrorCategory::FileSystem);
    let file = json_file(&error.to_json().to_string());
    let mut config = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    writeln!(config, "[logging]\nlevel = \"debug\"").expect("Failed to write config");

    sitecraft_cmd()
        .arg("inspect")
        .arg(file.path())
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("serialized error is valid"));

    sitecraft_cmd()
        .arg("inspect")
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("serialized error is valid").not());

    sitecraft_cmd()
        .args(["-v", "inspect"])
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("serialized error is valid"));
}

#[test]
fn test_inspect_rejects_lowercase_category() {
    let file = json_file(
        r#"{"name": "NetworkError", "message": "x", "code": "ECONNRESET",
            "category": "network", "severity": "MEDIUM", "metadata": {}}"#,
    );

    sitecraft_cmd()
        .arg("inspect")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid field category"));
}

#[test]
fn test_inspect_missing_file() {
    sitecraft_cmd()
        .args(["inspect", "/nonexistent/error.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
