//! Smoke tests for the covdiff CLI
//!
//! These tests run the real binary against real sockets in a temp dir.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use covdiff::{AgentConfig, CoverageAgent, LineRecorder, ReportSink, SocketEmitter, ThreadTracker};
use predicates::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

/// Get a command for the covdiff binary
fn covdiff() -> Command {
    let mut cmd = Command::cargo_bin("covdiff").expect("covdiff binary should exist");
    for var in [
        "COVDIFF_CONTROL_SOCKET",
        "COVDIFF_DATA_SOCKET",
        "COVDIFF_APP_SOURCE_DIR",
        "COVDIFF_STABILIZE_WAIT_MS",
        "COVDIFF_LOG",
    ] {
        let _ = cmd.env_remove(var);
    }
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    covdiff()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_lists_subcommands() {
    covdiff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("end"))
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_args_fails() {
    covdiff().assert().failure();
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_shows_defaults() {
    covdiff()
        .args(["config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/coverage_control.sock"))
        .stdout(predicate::str::contains("stabilize_wait_ms: 500"));
}

#[test]
fn test_config_reads_environment() {
    covdiff()
        .args(["config", "--format", "json"])
        .env("COVDIFF_DATA_SOCKET", "/run/test/data.sock")
        .assert()
        .success()
        .stdout(predicate::str::contains("/run/test/data.sock"));
}

#[test]
fn test_config_rejects_bad_number() {
    covdiff()
        .args(["config"])
        .env("COVDIFF_STABILIZE_WAIT_MS", "soon")
        .assert()
        .failure()
        .stderr(predicate::str::contains("COVDIFF_STABILIZE_WAIT_MS"));
}

// ============================================================================
// Control
// ============================================================================

#[test]
fn test_start_without_agent_fails() {
    let dir = TempDir::new().unwrap();
    covdiff()
        .args(["start", "t1", "--timeout-ms", "500", "--socket"])
        .arg(dir.path().join("missing.sock"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_start_and_end_against_live_agent() {
    let dir = TempDir::new().unwrap();
    let config = AgentConfig::builder()
        .app_root(dir.path())
        .control_socket(dir.path().join("control.sock"))
        .data_socket(dir.path().join("data.sock"))
        .stabilize(50, 5)
        .quiesce(50, 5)
        .settle_ms(0)
        .build()
        .unwrap();
    let agent = CoverageAgent::new(config.clone())
        .with_recorder(Arc::new(LineRecorder::new()))
        .with_threads(Arc::new(ThreadTracker::new()))
        .with_sinks(Vec::new())
        .spawn()
        .unwrap();

    covdiff()
        .args(["start", "suite::case"])
        .arg("--socket")
        .arg(&config.control_socket)
        .assert()
        .success()
        .stderr(predicate::str::contains("acknowledged"));
    covdiff()
        .args(["-q", "end", "suite::case"])
        .arg("--socket")
        .arg(&config.control_socket)
        .assert()
        .success()
        .stderr(predicate::str::is_empty());

    agent.shutdown();
}

#[test]
fn test_blank_id_is_rejected() {
    covdiff()
        .args(["end", "  ", "--socket", "/nonexistent.sock"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid argument"));
}

// ============================================================================
// Collect
// ============================================================================

#[test]
fn test_collect_prints_json_lines() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("data.sock");

    let sender_socket = socket.clone();
    let sender = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            for _ in 0..200 {
                if sender_socket.exists() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            }
            let mut report = covdiff::CoverageReport::new("t1");
            report.add_line("/app/main.py", 10);
            SocketEmitter::new(&sender_socket).emit(&report).await.unwrap();
        });
    });

    covdiff()
        .args(["collect", "--count", "1", "--idle-timeout-ms", "10000", "--socket"])
        .arg(&socket)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"id":"t1","executedLinesByFile":{"/app/main.py":[10]}}"#,
        ));
    sender.join().unwrap();
}

#[test]
fn test_collect_rejects_zero_count() {
    let dir = TempDir::new().unwrap();
    covdiff()
        .args(["collect", "--count", "0", "--socket"])
        .arg(dir.path().join("data.sock"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--count"));
}
