//! Session-backed runs: positions persist across invocations.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stepline_cli::cli::{Command, SessionCommand};
use stepline_cli::dispatch;
use stepline_core::{FileSessionStore, SessionState, SessionStore};
use stepline_test_utils::data_generators::create_click_sequence_definition;
use stepline_tests::{run_args, Harness, STEP_PATH};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_rerun_after_permanent_failure_continues_positions() {
    let harness = Harness::start().await;
    let ctx = harness.context();
    dispatch(
        &Command::Session(SessionCommand::Set {
            checkpoint: 4242,
            position: 1,
        }),
        &ctx,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    Mock::given(method("POST"))
        .and(path(STEP_PATH))
        .and(body_partial_json(json!({"stepIndex": 3})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid selector"})))
        .up_to_n_times(1)
        .mount(&harness.server)
        .await;
    harness.accept_all().await;
    let file = harness.definition("five.yaml", &create_click_sequence_definition(5));

    let first = dispatch(&Command::Run(run_args(vec![file.clone()], vec![])), &ctx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.exit_code, 3);
    let report: Value = serde_json::from_str(&first.stdout).unwrap();
    assert_eq!(report["results"][2]["outcome"], "failed");
    assert_eq!(report["results"][2]["failure"], "permanent");

    let store = FileSessionStore::new(harness.session_file());
    assert_eq!(store.load().await.unwrap(), Some(SessionState::new(4242, 5)));

    let second = dispatch(&Command::Run(run_args(vec![file], vec![])), &ctx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.exit_code, 0);
    assert_eq!(store.load().await.unwrap(), Some(SessionState::new(4242, 10)));

    let positions: Vec<u32> = harness.received_steps().await.into_iter().map(|(_, p)| p).collect();
    assert_eq!(positions, vec![1, 2, 3, 3, 4, 5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn test_explicit_checkpoint_does_not_touch_session() {
    let harness = Harness::start().await;
    harness.accept_all().await;
    let ctx = harness.context();
    let store = FileSessionStore::new(harness.session_file());
    store.save(&SessionState::new(1, 7)).await.unwrap();
    let file = harness.definition("two.yaml", &create_click_sequence_definition(2));

    let output = dispatch(&Command::Run(run_args(vec![file], vec![555])), &ctx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.exit_code, 0);
    assert_eq!(harness.received_steps().await, vec![(555, 1), (555, 2)]);
    assert_eq!(store.load().await.unwrap(), Some(SessionState::new(1, 7)));
}

#[tokio::test]
async fn test_environment_checkpoint_override_runs_detached() {
    let harness = Harness::start().await;
    harness.accept_all().await;
    let mut ctx = harness.context();
    ctx.config.apply_env(|key| (key == "STEPLINE_CHECKPOINT_ID").then(|| "31337".to_string()));
    let file = harness.definition("one.yaml", &create_click_sequence_definition(1));

    let output = dispatch(&Command::Run(run_args(vec![file], vec![])), &ctx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.exit_code, 0);
    assert_eq!(harness.received_steps().await, vec![(31337, 1)]);
    assert!(!harness.session_file().exists());
}
