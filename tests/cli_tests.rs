//! Command-line surface tests.
//!
//! Only argument handling and validation are exercised here; nothing reaches
//! a server.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn mirrorwatch() -> Command {
    let mut cmd = Command::cargo_bin("mirrorwatch").expect("binary should be built");
    cmd.env_remove("MIRRORWATCH_PASSWORD").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    mirrorwatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("browse"));
}

#[test]
fn test_run_help_mentions_password_env() {
    mirrorwatch()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MIRRORWATCH_PASSWORD"))
        .stdout(predicate::str::contains("--exclude"));
}

#[test]
fn test_missing_password_without_terminal_is_an_error() {
    let local = TempDir::new().expect("create tempdir");
    mirrorwatch()
        .args(["run", "--host", "files.example.com", "--user", "alice", "--remote", "/r"])
        .arg("--local")
        .arg(local.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Password is required"));
}

#[test]
fn test_missing_host_is_an_error() {
    let local = TempDir::new().expect("create tempdir");
    mirrorwatch()
        .env("MIRRORWATCH_PASSWORD", "secret")
        .args(["run", "--user", "alice", "--remote", "/r"])
        .arg("--local")
        .arg(local.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Server host is required"));
}

#[test]
fn test_relative_remote_folder_is_rejected() {
    let local = TempDir::new().expect("create tempdir");
    mirrorwatch()
        .env("MIRRORWATCH_PASSWORD", "secret")
        .args(["run", "--host", "h", "--user", "u", "--remote", "relative/dir"])
        .arg("--local")
        .arg(local.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("absolute path"));
}

#[test]
fn test_zero_interval_is_rejected() {
    let local = TempDir::new().expect("create tempdir");
    mirrorwatch()
        .env("MIRRORWATCH_PASSWORD", "secret")
        .args(["run", "--host", "h", "--user", "u", "--remote", "/r", "--interval", "0"])
        .arg("--local")
        .arg(local.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Interval must be at least 1 second"));
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let dir = TempDir::new().expect("create tempdir");
    let config = dir.path().join("mirror.toml");
    fs::write(&config, "host = \"h\"\nhostname = \"typo\"\n").expect("write config");

    mirrorwatch()
        .env("MIRRORWATCH_PASSWORD", "secret")
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("hostname"));
}

#[test]
fn test_invalid_exclude_glob_is_rejected() {
    let local = TempDir::new().expect("create tempdir");
    mirrorwatch()
        .env("MIRRORWATCH_PASSWORD", "secret")
        .args(["run", "--host", "h", "--user", "u", "--remote", "/r", "--exclude", "a[b"])
        .arg("--local")
        .arg(local.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid exclude pattern"));
}

#[test]
fn test_interval_longer_than_a_day_is_rejected() {
    let local = TempDir::new().expect("create tempdir");
    mirrorwatch()
        .env("MIRRORWATCH_PASSWORD", "secret")
        .args(["run", "--host", "h", "--user", "u", "--remote", "/r", "--interval", "18446744073709551615"])
        .arg("--local")
        .arg(local.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Interval must be at most"));
}
