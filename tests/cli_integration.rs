//! Integration tests for the chatline binary
//!
//! Exercises the one-shot `sessions` and `config` commands against a
//! temporary state database.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn chatline(state_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chatline").unwrap();
    cmd.env_remove("CHATLINE_STATE_DB")
        .env_remove("CHATLINE_API_BASE")
        .env_remove("CHATLINE_CONNECT_TIMEOUT")
        .arg("--config")
        .arg(state_dir.path().join("missing.yaml"))
        .arg("--state")
        .arg(state_dir.path().join("state.db"));
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("chatline").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_sessions_list_on_fresh_state() {
    let dir = TempDir::new().unwrap();
    chatline(&dir)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new chat"));
}

#[test]
fn test_sessions_new_then_list() {
    let dir = TempDir::new().unwrap();
    chatline(&dir).args(["sessions", "new"]).assert().success();
    chatline(&dir)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new chat").count(2));
}

#[test]
fn test_config_set_and_show() {
    let dir = TempDir::new().unwrap();
    chatline(&dir)
        .args(["config", "set", "max_tokens", "1234"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_tokens set to 1234"));
    chatline(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1234"));
}

#[test]
fn test_config_set_out_of_range_keeps_previous() {
    let dir = TempDir::new().unwrap();
    chatline(&dir)
        .args(["config", "set", "history", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keeping the previous value"));
}

#[test]
fn test_config_set_unknown_field_fails() {
    let dir = TempDir::new().unwrap();
    chatline(&dir)
        .args(["config", "set", "volume", "11"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_api_base_in_config_fails() {
    let (dir, config_path) = common::temp_config_file("provider:\n  api_base: ftp://example.com\n");
    let mut cmd = Command::cargo_bin("chatline").unwrap();
    cmd.env_remove("CHATLINE_API_BASE")
        .arg("--config")
        .arg(config_path)
        .arg("--state")
        .arg(dir.path().join("state.db"))
        .args(["sessions", "list"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must use http or https"));
}

#[test]
fn test_export_writes_markdown_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("chat.md");
    chatline(&dir)
        .args(["sessions", "export"])
        .arg(&out)
        .assert()
        .success();
    let markdown = std::fs::read_to_string(&out).unwrap();
    assert!(markdown.starts_with("# new chat"));
}
