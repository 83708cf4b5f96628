//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against an isolated data
//! directory and verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "oathkeeper-cli", "--"])
        .args(args)
        .env("OATHKEEPER_DATA_DIR", data_dir)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn status_reports_fresh_owner() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(dir.path(), &["status"]);
    assert_eq!(code, 0, "status failed: {stderr}");

    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["score"]["value"], 5.0);
    assert_eq!(snapshot["lockout"]["status"], "unlocked");
    assert!(snapshot["active_cycles"].as_array().unwrap().is_empty());
}

#[test]
fn protocol_commit_then_list() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(
        dir.path(),
        &[
            "protocol", "commit", "--title", "Evening review", "--at", "22:00", "--grace", "30",
        ],
    );
    assert_eq!(code, 0, "commit failed: {stderr}");
    let protocol: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(protocol["title"], "Evening review");
    assert_eq!(protocol["status"], "scheduled");

    let (stdout, stderr, code) = run_cli(dir.path(), &["protocol", "list"]);
    assert_eq!(code, 0, "list failed: {stderr}");
    let protocols: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(protocols.as_array().unwrap().len(), 1);
}

#[test]
fn tick_runs_clean_on_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(dir.path(), &["tick"]);
    assert_eq!(code, 0, "tick failed: {stderr}");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(report["errors"].as_array().unwrap().is_empty());
}

#[test]
fn config_show_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(dir.path(), &["config", "show"]);
    assert_eq!(code, 0, "config show failed: {stderr}");
    assert!(stdout.contains("threshold = 3.0"));
    assert!(stdout.contains("[score]"));
}

#[test]
fn submit_against_unknown_cycle_fails() {
    let dir = tempfile::tempdir().unwrap();
    let proof = dir.path().join("proof.png");
    std::fs::write(&proof, b"not really a png but good enough").unwrap();

    let (_, stderr, code) = run_cli(
        dir.path(),
        &[
            "submit",
            "--cycle",
            "00000000-0000-0000-0000-000000000000",
            "--file",
            proof.to_str().unwrap(),
        ],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"), "stderr was: {stderr}");
}
