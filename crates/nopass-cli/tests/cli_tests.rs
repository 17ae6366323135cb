//! Integration tests for the `nopass` CLI binary.
//!
//! The CLI runs as a subprocess against an address nothing listens on, so
//! these cover argument handling and failure exit codes only.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

fn nopass_bin() -> String {
    let path = env!("CARGO_BIN_EXE_nopass");
    assert!(Path::new(path).exists(), "nopass binary not found at {path}");
    path.to_owned()
}

/// Run nopass with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(nopass_bin())
        .args(args)
        .env("NOPASS_SERVER", "http://127.0.0.1:19999")
        .env_remove("NOPASS_SESSION")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute nopass");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn unsigned_session(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}"}}"#));
    format!("{header}.{payload}.sig")
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("nopass"), "version output: {stdout}");
}

#[test]
fn test_help_lists_commands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0);
    for command in ["bridge", "token", "claims", "health"] {
        assert!(stdout.contains(command), "help should list '{command}'");
    }
    assert!(stdout.contains("NOPASS_SESSION"));
}

#[test]
fn test_unknown_command_fails() {
    let (code, _, stderr) = run(&["launch"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unrecognized subcommand"), "stderr: {stderr}");
}

// ── Failure paths ────────────────────────────────────────────────────

#[test]
fn test_health_without_server_fails() {
    let (code, _, stderr) = run(&["health"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Error"), "stderr: {stderr}");
}

#[test]
fn test_bridge_without_session_fails() {
    let (code, _, stderr) = run(&["bridge"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("no primary session"), "stderr: {stderr}");
}

#[test]
fn test_bridge_with_unreadable_session_fails() {
    let (code, _, stderr) = run(&["--session", "opaque", "bridge"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not a readable JWT"), "stderr: {stderr}");
}

#[test]
fn test_bridge_without_server_fails_at_mint() {
    let session = unsigned_session("user_123");
    let (code, stdout, _) = run(&["--session", &session, "bridge"]);
    assert_eq!(code, 1);
    assert!(stdout.contains("MintRequested"), "stdout: {stdout}");
}
