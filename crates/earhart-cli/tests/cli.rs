//! End-to-end tests for the `earhart` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SECRET: &str = "whsec_dGVzdC1zaWduaW5nLWtleS0wMTIzNDU2Nzg5";
const TIMESTAMP: &str = "1700000000";

/// Binary with an isolated config home and no inherited overrides
fn earhart(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("earhart").unwrap();
    cmd.env("XDG_CONFIG_HOME", home)
        .env_remove("EARHART_CONFIG")
        .env_remove("EARHART_SIGNING_SECRET")
        .env_remove("EARHART__POLICY__SIGNING_SECRET")
        .env_remove("EARHART__POLICY__VERIFY_SIGNATURES")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Sign `body` and return the headers as `-H` arguments
///
/// Signs at [`TIMESTAMP`] unless `current` is set.
fn signed_header_args(home: &Path, body: &Path, current: bool) -> Vec<String> {
    let mut cmd = earhart(home);
    cmd.args(["sign", "--id", "msg_1", "--secret", SECRET]);
    if !current {
        cmd.args(["--timestamp", TIMESTAMP]);
    }
    let output = cmd
        .arg("--body")
        .arg(body)
        .output()
        .unwrap();
    assert!(output.status.success());

    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .flat_map(|line| ["-H".to_string(), line.to_string()])
        .collect()
}

#[test]
fn test_events_lists_supported_types() {
    let home = TempDir::new().unwrap();

    earhart(home.path())
        .arg("events")
        .assert()
        .success()
        .stdout(predicate::str::contains("user.role_changed_within_org"))
        .stdout(predicate::str::contains("org.scim_key_created").not());
}

#[test]
fn test_policy_masks_secret_from_environment() {
    let home = TempDir::new().unwrap();

    earhart(home.path())
        .args(["policy", "--format", "json"])
        .env("EARHART__POLICY__SIGNING_SECRET", SECRET)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""signing_secret": "***""#))
        .stdout(predicate::str::contains("dGVzdC1zaWduaW5n").not());
}

#[test]
fn test_missing_config_file_exits_with_configuration_code() {
    let home = TempDir::new().unwrap();

    earhart(home.path())
        .args(["--config", "/nonexistent/earhart.yaml", "events"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_sign_then_verify() {
    let home = TempDir::new().unwrap();
    let body = write(
        home.path(),
        "delivery.json",
        r#"{"event_type":"user.locked","user_id":"u1"}"#,
    );
    let headers = signed_header_args(home.path(), &body, false);

    earhart(home.path())
        .args(["verify", "--secret", SECRET, "--now", TIMESTAMP])
        .arg("--body")
        .arg(&body)
        .args(&headers)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "verified message_id=msg_1 event_type=user.locked",
        ));
}

#[test]
fn test_verify_rejects_tampered_body() {
    let home = TempDir::new().unwrap();
    let body = write(
        home.path(),
        "delivery.json",
        r#"{"event_type":"user.locked","user_id":"u1"}"#,
    );
    let headers = signed_header_args(home.path(), &body, false);
    let tampered = write(
        home.path(),
        "tampered.json",
        r#"{"event_type":"user.locked","user_id":"u2"}"#,
    );

    earhart(home.path())
        .args(["verify", "--secret", SECRET, "--now", TIMESTAMP])
        .arg("--body")
        .arg(&tampered)
        .args(&headers)
        .assert()
        .code(2);
}

#[test]
fn test_verify_rejects_stale_timestamp() {
    let home = TempDir::new().unwrap();
    let body = write(home.path(), "delivery.json", r#"{"event_type":"org.updated","org_id":"o1"}"#);
    let headers = signed_header_args(home.path(), &body, false);

    earhart(home.path())
        .args(["verify", "--secret", SECRET, "--now", "1700003600"])
        .arg("--body")
        .arg(&body)
        .args(&headers)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Verification failed"));
}

#[test]
fn test_process_invalidates_seeded_cache() {
    let home = TempDir::new().unwrap();
    let body = write(
        home.path(),
        "delivery.json",
        r#"{"event_type":"user.added_to_org","user_id":"u1","org_id":"o1","role":"Admin"}"#,
    );
    let snapshots = write(
        home.path(),
        "snapshots.json",
        r#"{
            "users": {"u1": {"user_id": "u1", "email": "a@b.c", "email_confirmed": true,
                             "locked": false, "enabled": true,
                             "created_at": 1700000000, "last_active_at": 1700000000}},
            "organisations": {"o1": {"orgId": "o1", "name": "Acme"}},
            "cache": {"user.u1": {}, "org.o1.members": [], "user.u2": {}}
        }"#,
    );
    let headers = signed_header_args(home.path(), &body, true);

    earhart(home.path())
        .args(["process", "--secret", SECRET])
        .arg("--body")
        .arg(&body)
        .arg("--snapshots")
        .arg(&snapshots)
        .args(&headers)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""success": true"#))
        .stdout(predicate::str::contains(r#""enriched": true"#))
        .stdout(predicate::str::contains(r#""cache_invalidated": true"#))
        .stdout(predicate::str::contains(r#""delivery_id": "msg_1""#))
        .stdout(predicate::str::contains(r#""user.u2""#))
        .stdout(predicate::str::contains(r#""org.o1.members""#).not());
}

#[test]
fn test_process_acknowledges_unsupported_event() {
    let home = TempDir::new().unwrap();
    let body = write(
        home.path(),
        "delivery.json",
        r#"{"event_type":"org.scim_key_created","org_id":"o1"}"#,
    );

    earhart(home.path())
        .args(["process"])
        .env("EARHART__POLICY__VERIFY_SIGNATURES", "false")
        .arg("--body")
        .arg(&body)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""supported": false"#))
        .stdout(predicate::str::contains(r#""event_type": "org.scim_key_created""#));
}

#[test]
fn test_process_reports_rejected_delivery() {
    let home = TempDir::new().unwrap();
    let body = write(home.path(), "delivery.json", r#"{"user_id":"u1"}"#);

    earhart(home.path())
        .args(["process"])
        .env("EARHART__POLICY__VERIFY_SIGNATURES", "false")
        .arg("--body")
        .arg(&body)
        .assert()
        .code(3)
        .stdout(predicate::str::contains(r#""acknowledgement_status": 400"#));
}

#[test]
fn test_completions_generate_without_configuration() {
    let home = TempDir::new().unwrap();

    earhart(home.path())
        .args(["--config", "/nonexistent/earhart.yaml", "completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("earhart"));
}
