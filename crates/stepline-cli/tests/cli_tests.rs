//! Drives the `stepline` binary.

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use stepline_test_utils::data_generators::{
    create_click_sequence_definition, create_login_definition, create_unparseable_definition,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Runs the binary with an isolated home directory.
fn stepline(home: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stepline"));
    command.args(args).env("HOME", home).env_remove("RUST_LOG");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().expect("run stepline")
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.display().to_string()
}

#[test]
fn test_validate_exit_codes() {
    let home = tempfile::tempdir().unwrap();
    let good = write(home.path(), "good.yaml", &create_login_definition());
    let bad = write(home.path(), "bad.yaml", "test: x\ndo:\n  - c: '{{foo}}'\n");
    let broken = write(home.path(), "broken.yaml", &create_unparseable_definition());

    let ok = stepline(home.path(), &["validate", &good], &[]);
    assert_eq!(ok.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&ok.stdout).contains("valid"));

    let invalid = stepline(home.path(), &["validate", &bad], &[]);
    assert_eq!(invalid.status.code(), Some(9));
    assert!(String::from_utf8_lossy(&invalid.stdout).contains("ERR_DSL_UNDEFINED_VARIABLE"));

    let unparseable = stepline(home.path(), &["validate", &broken], &[]);
    assert_eq!(unparseable.status.code(), Some(9));
    assert!(String::from_utf8_lossy(&unparseable.stderr).contains("broken.yaml"));
}

#[test]
fn test_compile_json_with_override() {
    let home = tempfile::tempdir().unwrap();
    let file = write(home.path(), "login.yaml", &create_login_definition());

    let output = stepline(
        home.path(),
        &["compile", &file, "--var", "user=carol", "--format", "json"],
        &[],
    );

    assert_eq!(output.status.code(), Some(0));
    let operations: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(operations.as_array().map(Vec::len), Some(4));
    assert_eq!(operations[0]["target"]["selector"], "https://app.example.com/login");
    assert_eq!(operations[1]["value"], "carol");
}

#[test]
fn test_session_commands_use_configured_file() {
    let home = tempfile::tempdir().unwrap();
    let session = home.path().join("s.json").display().to_string();
    let env = [("STEPLINE_SESSION_FILE", session.as_str())];

    let set = stepline(home.path(), &["session", "set", "--checkpoint", "12", "--position", "4"], &env);
    assert_eq!(set.status.code(), Some(0));

    let show = stepline(home.path(), &["session", "show", "--format", "json"], &env);
    let state: Value = serde_json::from_slice(&show.stdout).unwrap();
    assert_eq!(state, json!({"checkpointId": 12, "nextPosition": 4}));

    let clear = stepline(home.path(), &["session", "clear"], &env);
    assert_eq!(clear.status.code(), Some(0));
    assert!(!Path::new(&session).exists());
}

#[test]
fn test_run_without_session_or_checkpoint_fails() {
    let home = tempfile::tempdir().unwrap();
    let file = write(home.path(), "one.yaml", &create_click_sequence_definition(1));

    let output = stepline(
        home.path(),
        &["run", &file],
        &[("STEPLINE_BASE_URL", "http://127.0.0.1:9")],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No active session"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_exit_codes_follow_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/teststeps"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "checkpoint not found"})))
        .mount(&server)
        .await;
    let home = tempfile::tempdir().unwrap();
    let file = write(home.path(), "two.yaml", &create_click_sequence_definition(2));
    let uri = server.uri();

    let output = tokio::task::spawn_blocking(move || {
        stepline(
            home.path(),
            &["run", &file, "--checkpoint", "77", "--format", "json"],
            &[("STEPLINE_BASE_URL", uri.as_str())],
        )
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(6));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["abort"]["reason"], "resource-missing");
    assert_eq!(report["skipped"], 1);
}
