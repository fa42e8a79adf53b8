//! End-to-end runs through the CLI dispatcher against a mock step service.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use stepline_cli::cli::{Command, CompileArgs, ValidateArgs};
use stepline_cli::dispatch;
use stepline_cli::output::OutputFormat;
use stepline_dsl::Literal;
use stepline_test_utils::data_generators::{
    create_click_sequence_definition, create_login_definition, create_undefined_variable_definition,
};
use stepline_tests::{run_args, Harness, STEP_PATH};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_login_definition_creates_four_steps() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path(STEP_PATH))
        .and(header("authorization", "Bearer e2e-token"))
        .and(body_partial_json(json!({"parsedStep": {"action": "WRITE", "value": "bob"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"testStep": {"id": "77"}})))
        .expect(1)
        .mount(&harness.server)
        .await;
    harness.accept_all().await;
    let file = harness.definition("login.yaml", &create_login_definition());

    let mut args = run_args(vec![file], vec![1680449]);
    args.vars = vec![("user".into(), Literal::Str("bob".into()))];
    let output = dispatch(&Command::Run(args), &harness.context(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.exit_code, 0, "{}", output.stdout);
    let report: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(report["status"], "complete");
    assert_eq!(report["nextPosition"], 5);
    assert_eq!(report["results"][1]["stepId"], "77");
    assert_eq!(
        harness.received_steps().await,
        vec![(1680449, 1), (1680449, 2), (1680449, 3), (1680449, 4)]
    );
}

#[tokio::test]
async fn test_rate_limited_step_is_retried_after_hint() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path(STEP_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "1")
                .set_body_json(json!({"error": "too many requests"})),
        )
        .up_to_n_times(1)
        .mount(&harness.server)
        .await;
    harness.accept_all().await;
    let file = harness.definition("one.yaml", &create_click_sequence_definition(1));

    let started = Instant::now();
    let output = dispatch(
        &Command::Run(run_args(vec![file], vec![5])),
        &harness.context(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(output.exit_code, 0);
    let report: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(report["results"][0]["retries"], 1);
    assert_eq!(harness.received_steps().await, vec![(5, 1), (5, 1)]);
}

#[tokio::test]
async fn test_missing_checkpoint_aborts_run() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path(STEP_PATH))
        .and(body_partial_json(json!({"stepIndex": 2})))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "checkpoint not found"})))
        .mount(&harness.server)
        .await;
    harness.accept_all().await;
    let file = harness.definition("four.yaml", &create_click_sequence_definition(4));

    let output = dispatch(
        &Command::Run(run_args(vec![file], vec![9])),
        &harness.context(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(output.exit_code, 6);
    let report: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(report["status"], "aborted");
    assert_eq!(report["abort"]["reason"], "resource-missing");
    assert_eq!(report["skipped"], 2);
    assert_eq!(harness.received_steps().await, vec![(9, 1), (9, 2)]);
}

#[tokio::test]
async fn test_unresolved_variable_never_reaches_service() {
    let harness = Harness::start().await;
    harness.accept_all().await;
    let file = harness.definition("bad.yaml", &create_undefined_variable_definition());

    let err = dispatch(
        &Command::Run(run_args(vec![file.clone()], vec![1])),
        &harness.context(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 9);

    let validated = dispatch(
        &Command::Validate(ValidateArgs { file }),
        &harness.context(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(validated.exit_code, 9);
    let report: Value = serde_json::from_str(&validated.stdout).unwrap();
    assert_eq!(report["errors"][0]["code"], "ERR_DSL_UNDEFINED_VARIABLE");
    assert_eq!(report["errors"][0]["location"]["line"], 5);

    assert!(harness.received_steps().await.is_empty());
}

#[tokio::test]
async fn test_compile_prints_unrolled_operations() {
    let harness = Harness::start().await;
    let file = harness.definition(
        "loop.yaml",
        "test: Paging\ndo:\n  - loop: {times: 3, do: [{c: \".next\"}]}\n",
    );
    let mut ctx = harness.context();
    ctx.format = OutputFormat::Yaml;

    let output = dispatch(
        &Command::Compile(CompileArgs { file, vars: Vec::new() }),
        &ctx,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout.matches("kind: click").count(), 3);
    assert!(output.stdout.contains(".next"));
}

#[tokio::test]
async fn test_batch_runs_definitions_on_separate_checkpoints() {
    let harness = Harness::start().await;
    harness.accept_all().await;
    let files = (1..=3)
        .map(|i| harness.definition(&format!("d{}.yaml", i), &create_click_sequence_definition(i)))
        .collect();

    let mut args = run_args(files, vec![100, 200, 300]);
    args.parallel = Some(2);
    let output = dispatch(&Command::Run(args), &harness.context(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.exit_code, 0);
    let mut steps = harness.received_steps().await;
    steps.sort();
    assert_eq!(
        steps,
        vec![(100, 1), (200, 1), (200, 2), (300, 1), (300, 2), (300, 3)]
    );
}
