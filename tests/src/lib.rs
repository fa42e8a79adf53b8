//! Shared infrastructure for stepline end-to-end tests.
//!
//! Each test gets a mock step service (wiremock) and a scratch directory
//! holding its definition files and session record.

use serde_json::{json, Value};
use std::path::PathBuf;
use stepline_cli::cli::RunArgs;
use stepline_cli::config::Config;
use stepline_cli::output::OutputFormat;
use stepline_cli::Context;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path the HTTP client posts steps to, relative to the server root.
pub const STEP_PATH: &str = "/api/teststeps";

/// A mock step service plus a scratch directory.
pub struct Harness {
    pub server: MockServer,
    pub dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        stepline_test_utils::init_test_logging();
        Self {
            server: MockServer::start().await,
            dir: tempfile::tempdir().expect("scratch directory"),
        }
    }

    /// Writes a definition file into the scratch directory.
    pub fn definition(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, text).expect("write definition");
        path
    }

    pub fn session_file(&self) -> PathBuf {
        self.dir.path().join("session.json")
    }

    /// A context pointing at the mock server with fast retries and JSON output.
    pub fn context(&self) -> Context {
        let mut config = Config::default();
        config.api.base_url = Some(format!("{}/api", self.server.uri()));
        config.api.token = Some("e2e-token".into());
        config.session_file = Some(self.session_file());
        config.execution.retry.base_delay_ms = 10;
        config.execution.retry.max_delay_ms = 50;
        Context::new(config, Some(OutputFormat::Json))
    }

    /// Answers every step with `{"item": {"id": checkpoint * 1000 + stepIndex}}`.
    pub async fn accept_all(&self) {
        Mock::given(method("POST"))
            .and(path(STEP_PATH))
            .respond_with(EchoStep)
            .mount(&self.server)
            .await;
    }

    /// `(checkpointId, stepIndex)` of every request received, in order.
    pub async fn received_steps(&self) -> Vec<(i64, u32)> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
            .map(|body| {
                (
                    body["checkpointId"].as_i64().unwrap_or_default(),
                    body["stepIndex"].as_u64().unwrap_or_default() as u32,
                )
            })
            .collect()
    }
}

/// Responder that creates an id from the request body.
pub struct EchoStep;

impl Respond for EchoStep {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let checkpoint = body["checkpointId"].as_i64().unwrap_or_default();
        let position = body["stepIndex"].as_i64().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({ "item": { "id": checkpoint * 1000 + position } }))
    }
}

/// Run arguments for the given files and checkpoints, defaults elsewhere.
pub fn run_args(files: Vec<PathBuf>, checkpoints: Vec<i64>) -> RunArgs {
    RunArgs {
        files,
        checkpoints,
        position: None,
        parallel: None,
        timeout: None,
        call_timeout: None,
        vars: Vec::new(),
    }
}
