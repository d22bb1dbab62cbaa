//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_chunkfocus"))
        .args(args)
        .env("CHUNKFOCUS_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(data_dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn status(data_dir: &Path) -> serde_json::Value {
    let stdout = run_ok(data_dir, &["status"]);
    serde_json::from_str(&stdout).expect("status prints JSON")
}

#[test]
fn test_fresh_status_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let status = status(dir.path());
    assert_eq!(status["phase"], "none");
    assert_eq!(status["tiles"].as_array().unwrap().len(), 0);
    assert_eq!(status["recovered_from"], "nothing");
}

#[test]
fn test_tiles_are_capped_at_two() {
    let dir = tempfile::tempdir().unwrap();
    assert!(run_ok(dir.path(), &["add", "Write report"]).contains("(1/2)"));
    assert!(run_ok(dir.path(), &["add", "Review PR"]).contains("(2/2)"));

    let (_, stderr, code) = run_cli(dir.path(), &["add", "x"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("at most 2"), "stderr: {stderr}");

    let status = status(dir.path());
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["tiles"][1]["text"], "Review PR");
}

#[test]
fn test_blank_tile_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["add", "   "]);
    assert_eq!(code, 1);
    assert!(stderr.contains("empty"), "stderr: {stderr}");
}

#[test]
fn test_detached_chunk_can_be_paused_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["go", "Write report"]);
    run_ok(dir.path(), &["go", "Review PR"]);
    assert!(run_ok(dir.path(), &["go", "--detach"]).contains("chunk 1 of 2"));

    let running = status(dir.path());
    assert_eq!(running["phase"], "running");
    assert_eq!(running["recovered_from"], "safety_snapshot");
    assert!(running["remaining_seconds"].as_u64().unwrap() <= 1200);

    let (_, _, code) = run_cli(dir.path(), &["go", "--detach"]);
    assert_eq!(code, 1, "a second begin is invalid");

    assert!(run_ok(dir.path(), &["pause"]).contains("paused at"));
    let paused = status(dir.path());
    assert_eq!(paused["phase"], "paused");
    assert_eq!(paused["recovered_from"], "canonical_snapshot");

    run_ok(dir.path(), &["reset"]);
    let fresh = status(dir.path());
    assert_eq!(fresh["phase"], "none");
    assert_eq!(fresh["tiles"].as_array().unwrap().len(), 0);
}

#[test]
fn test_short_chunks_run_to_session_complete() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["config", "set", "session.chunk_seconds_override", "1"]);
    run_ok(dir.path(), &["add", "Write report"]);
    run_ok(dir.path(), &["add", "Review PR"]);

    assert!(run_ok(dir.path(), &["go"]).contains("chunk 1 of 2 done"));
    let between = status(dir.path());
    assert_eq!(between["phase"], "finished");
    assert_eq!(between["chunk_index"], 1);
    assert_eq!(between["show_recalibrate"], false);

    assert!(run_ok(dir.path(), &["go"]).contains("session complete"));
    let done = status(dir.path());
    assert_eq!(done["phase"], "none");
    assert_eq!(done["chunk_index"], 0);
    assert_eq!(done["show_recalibrate"], true);
    assert!(run_ok(dir.path(), &["add", "Plan tomorrow"]).contains("(1/2)"));

    let history: serde_json::Value =
        serde_json::from_str(&run_ok(dir.path(), &["history"])).unwrap();
    let tiles = history["tiles"].as_array().unwrap();
    assert_eq!(tiles.len(), 2);
    assert_eq!(tiles[0]["text"], "Write report");
}

#[test]
fn test_resume_without_chunk_reports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(run_ok(dir.path(), &["resume"]).contains("no chunk is running"));
}

#[test]
fn test_recalibration_minutes_are_validated() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["breathe", "--minutes", "9"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("outside the allowed range"), "stderr: {stderr}");
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        run_ok(dir.path(), &["config", "get", "session.chunk_minutes"]).trim(),
        "20"
    );
    run_ok(dir.path(), &["config", "set", "session.chunk_minutes", "25"]);
    assert_eq!(
        run_ok(dir.path(), &["config", "get", "session.chunk_minutes"]).trim(),
        "25"
    );

    let (_, stderr, code) = run_cli(dir.path(), &["config", "set", "session.bogus", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown configuration key"), "stderr: {stderr}");
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "session.bogus"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Configuration error"), "stderr: {stderr}");
    let (_, _, code) = run_cli(
        dir.path(),
        &["config", "set", "session.chunk_seconds_override", "18446744073709551615"],
    );
    assert_eq!(code, 1);
    let (_, _, code) = run_cli(
        dir.path(),
        &["config", "set", "recalibration.breathing_minutes", "7"],
    );
    assert_eq!(code, 1);

    let shown: serde_json::Value =
        serde_json::from_str(&run_ok(dir.path(), &["config", "show"])).unwrap();
    assert_eq!(shown["session"]["chunk_minutes"], 25);
}
