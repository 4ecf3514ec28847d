//! Smoke tests for the rdeploy CLI
//!
//! These run the real binary. None of them needs a container runtime: they
//! cover argument handling, configuration errors, the runtime availability
//! check and the standalone `classify` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PLAN: &str = r#"
[advisory]
enabled = false

[[phases]]
name = "infrastructure"
  [[phases.services]]
  id = "mysql"
  readiness = { kind = "exec", command = ["mysqladmin", "ping"] }

[[phases]]
name = "application"
  [[phases.services]]
  id = "api"
  readiness = { kind = "http", url = "http://localhost:8080/health" }
"#;

/// Temp project with `.rdeploy/config.toml`.
fn project(config: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join(".rdeploy");
    fs::create_dir_all(&config_dir).unwrap();
    let path = config_dir.join("config.toml");
    fs::write(&path, config).unwrap();
    (dir, path)
}

fn rdeploy(work_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rdeploy"));
    cmd.current_dir(work_dir)
        .env_remove("RUST_LOG")
        .env_remove("RDEPLOY_ADVISORY_API_KEY");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    rdeploy(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("classify"));
}

#[test]
fn test_classify_known_pattern() {
    let (dir, config) = project(PLAN);
    rdeploy(dir.path())
        .args(["--config", config.to_str().unwrap(), "classify"])
        .arg("Bind for 0.0.0.0:3306 failed: port is already allocated")
        .assert()
        .success()
        .stdout(predicate::str::contains("source: known pattern"))
        .stdout(predicate::str::contains("lsof"));
}

#[test]
fn test_classify_unknown_message_without_advisory() {
    let (dir, _) = project(PLAN);
    rdeploy(dir.path())
        .args(["classify", "segfault in libfoo", "--no-advisory", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""remedy":"""#))
        .stdout(predicate::str::contains(r#""source":"none""#));
}

#[test]
fn test_classify_uses_configured_patterns() {
    let config = format!(
        "{PLAN}\n{}",
        r#"
[[classifier.patterns]]
kind = "regex"
pattern = "license key .* expired"
remedy = "Renew the vendor license and restart."
"#
    );
    let (dir, _) = project(&config);
    rdeploy(dir.path())
        .args(["classify", "License key ABC-123 expired on 2026-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renew the vendor license"));
}

#[test]
fn test_deploy_without_phases_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    rdeploy(dir.path())
        .arg("deploy")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("phases"));
}

#[test]
fn test_invalid_retry_multiplier_is_a_config_error() {
    let (dir, _) = project("[retry]\nmultiplier = 0.5\n");
    rdeploy(dir.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("retry.multiplier"));
}

#[test]
fn test_missing_explicit_config_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    rdeploy(dir.path())
        .args(["--config", "does-not-exist.toml", "deploy"])
        .assert()
        .code(2);
}

#[test]
fn test_unavailable_runtime_exits_4() {
    let (dir, _) = project(PLAN);
    rdeploy(dir.path())
        .args(["--runtime", "rdeploy-test-no-such-runtime", "deploy"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("rdeploy-test-no-such-runtime"));
}

#[test]
fn test_unknown_subcommand_exits_2() {
    let dir = TempDir::new().unwrap();
    rdeploy(dir.path()).arg("rollback").assert().code(2);
}
