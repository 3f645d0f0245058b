//! Corruption recovery tests for the mindful binary.
//!
//! These tests verify the system can handle:
//! - A corrupted progress file
//! - Corrupted or truncated WAL lines
//! - Empty and missing files
//! - A practice service that cannot be reached

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write as IoWrite;
use tempfile::TempDir;

fn cli() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mindful"));
    cmd.env(
        "XDG_CONFIG_HOME",
        std::env::temp_dir().join("mindful-cli-tests-no-config"),
    );
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn run_awareness(data_dir: &std::path::Path) {
    cli()
        .arg("run")
        .arg("awareness")
        .arg("--auto")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success();
}

#[test]
fn test_corrupted_progress_file() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("progress.json"), "{ invalid json }}}}")
        .expect("Failed to write corrupted progress");

    run_awareness(&data_dir);

    // The progress file is valid again afterwards
    let progress = fs::read_to_string(data_dir.join("progress.json")).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&progress).is_ok());
}

#[test]
fn test_corrupted_wal_lines_ignored_by_history() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(
        data_dir.join("practice_sessions.wal"),
        "{ invalid json }\n{ more invalid }\n",
    )
    .expect("Failed to write corrupted WAL");

    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("No practices"));
}

#[test]
fn test_partial_wal_line() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    run_awareness(&data_dir);

    // Simulate a crash mid-append
    {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(data_dir.join("practice_sessions.wal"))
            .unwrap();
        write!(file, "{{\"session_id\":\"half-writ").unwrap();
    }

    // New completions still append after the partial line
    run_awareness(&data_dir);

    let output = cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.matches("self_awareness").count() >= 1);
}

#[test]
fn test_empty_files() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("progress.json"), "").unwrap();
    fs::write(data_dir.join("practice_sessions.wal"), "").unwrap();
    fs::write(data_dir.join("practice_sessions.csv"), "").unwrap();

    run_awareness(&data_dir);

    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();
}

#[test]
fn test_rollup_skips_corrupted_lines() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    run_awareness(&data_dir);
    {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(data_dir.join("practice_sessions.wal"))
            .unwrap();
        writeln!(file, "not json at all").unwrap();
    }
    run_awareness(&data_dir);

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 2 practices"));
}

#[test]
fn test_unreachable_service_runs_offline() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    // Nothing listens on the discard port
    cli()
        .arg("run")
        .arg("awareness")
        .arg("--auto")
        .arg("--api-url")
        .arg("http://127.0.0.1:9")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Practice service unavailable"))
        .stderr(predicate::str::contains("no remote session"));

    assert!(!data_dir.join("practice_sessions.wal").exists());
}
