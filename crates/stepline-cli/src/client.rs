//! HTTP implementation of the step service.

use crate::config::ApiConfig;
use crate::error::{CliError, CliResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::{json, Map, Value};
use std::time::Duration;
use stepline_core::{RawResponse, RemoteReply, StepRequest, StepService, TransportErrorKind};
use stepline_dsl::{OperationKind, ResolvedOperation, SelectorKind, Target};
use tracing::{debug, instrument};
use url::Url;

/// Polling interval the platform uses for waits, in ms
const WAIT_POLL_MS: u64 = 100;

/// Remote action name for an operation kind.
pub fn action_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Navigate => "NAVIGATE",
        OperationKind::Click => "CLICK",
        OperationKind::Type => "WRITE",
        OperationKind::Key => "KEY",
        OperationKind::Hover => "MOUSE",
        OperationKind::AssertExists => "ASSERT_EXISTS",
        OperationKind::AssertNotExists => "ASSERT_NOT_EXISTS",
        OperationKind::AssertEquals => "ASSERT_EQUALS",
        OperationKind::AssertNotEquals => "ASSERT_NOT_EQUALS",
        OperationKind::AssertGreaterThan => "ASSERT_GREATER_THAN",
        OperationKind::AssertLessThan => "ASSERT_LESS_THAN",
        OperationKind::WaitTime | OperationKind::WaitElement => "WAIT",
        OperationKind::Store => "STORE",
        OperationKind::Comment => "COMMENT",
        OperationKind::Script => "EXECUTE",
        OperationKind::Scroll => "SCROLL",
    }
}

fn selector(target: &Target) -> Value {
    let text = target.selector.as_str();
    match target.kind {
        SelectorKind::Css => json!({
            "type": "CSS",
            "value": text.strip_prefix("css=").unwrap_or(text),
        }),
        SelectorKind::Xpath => json!({
            "type": "XPATH",
            "value": text.strip_prefix("xpath=").unwrap_or(text),
        }),
        SelectorKind::Guess | SelectorKind::Url => json!({
            "type": "GUESS",
            "value": json!({ "clue": text }).to_string(),
        }),
    }
}

fn meta(operation: &ResolvedOperation) -> Value {
    let value = operation.value.as_deref().unwrap_or("");
    let millis = || value.parse::<u64>().unwrap_or(0);
    match operation.kind {
        OperationKind::Type => json!({ "kind": "WRITE", "append": false }),
        OperationKind::Key => json!({ "kind": "KEY", "key": value }),
        OperationKind::Hover => json!({ "kind": "MOUSE", "action": "OVER" }),
        OperationKind::WaitTime => json!({
            "kind": "WAIT",
            "type": "TIME",
            "duration": millis(),
            "poll": WAIT_POLL_MS,
        }),
        OperationKind::WaitElement => json!({
            "kind": "WAIT",
            "type": "ELEMENT",
            "duration": millis(),
            "poll": WAIT_POLL_MS,
        }),
        OperationKind::Store => json!({ "kind": "STORE", "variable": value }),
        OperationKind::Scroll => {
            let kind = match (&operation.target, value) {
                (Some(_), _) => "ELEMENT",
                (None, "bottom") => "BOTTOM",
                (None, _) => "TOP",
            };
            json!({ "kind": "SCROLL", "type": kind })
        }
        _ => Value::Object(Map::new()),
    }
}

/// Builds the `parsedStep` object for one operation.
pub fn parsed_step(operation: &ResolvedOperation) -> Value {
    let mut step = Map::new();
    step.insert("action".into(), json!(action_name(operation.kind)));

    let value = match operation.kind {
        OperationKind::Navigate => operation.target.as_ref().map(|t| t.selector.clone()),
        OperationKind::Scroll | OperationKind::Store => None,
        _ => operation.value.clone(),
    };
    step.insert("value".into(), json!(value.unwrap_or_default()));

    if let Some(target) = &operation.target {
        step.insert("target".into(), json!({ "selectors": [selector(target)] }));
    }
    if operation.kind == OperationKind::Store {
        step.insert("variable".into(), json!(operation.value.as_deref().unwrap_or("")));
    }
    step.insert("meta".into(), meta(operation));
    Value::Object(step)
}

/// Builds the full request body for one step.
pub fn request_body(request: &StepRequest) -> Value {
    json!({
        "checkpointId": request.checkpoint_id,
        "stepIndex": request.position,
        "parsedStep": parsed_step(&request.operation),
    })
}

/// Creates steps over HTTP.
///
/// Never returns an error from [`StepService::create_step`]: transport
/// failures come back as [`RemoteReply::Transport`].
#[derive(Debug, Clone)]
pub struct HttpStepService {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpStepService {
    pub fn new(base_url: &str, api: &ApiConfig, timeout: Duration) -> CliResult<Self> {
        let mut endpoint = Url::parse(&format!("{}/teststeps", base_url.trim_end_matches('/')))
            .map_err(|e| CliError::Config(format!("invalid API base URL '{}': {}", base_url, e)))?;
        {
            let mut query = endpoint.query_pairs_mut();
            query.append_pair("envelope", "false");
            if let Some(org) = &api.organization_id {
                query.append_pair("organizationId", org);
            }
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &api.token {
            headers.insert(reqwest::header::AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }
        if let Some(id) = &api.client_id {
            headers.insert("X-Client-ID", header_value(id)?);
        }
        if let Some(name) = &api.client_name {
            headers.insert("X-Client-Name", header_value(name)?);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| CliError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn header_value(value: &str) -> CliResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CliError::Config(format!("invalid header value: {}", e)))
}

fn transport_reply(err: &reqwest::Error) -> RemoteReply {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    RemoteReply::Transport {
        kind,
        message: err.to_string(),
    }
}

#[async_trait]
impl StepService for HttpStepService {
    #[instrument(skip_all, fields(checkpoint_id = request.checkpoint_id, position = request.position))]
    async fn create_step(&self, request: &StepRequest) -> RemoteReply {
        let body = request_body(request);
        debug!(action = action_name(request.operation.kind), "POST {}", self.endpoint.path());

        let response = match self.client.post(self.endpoint.clone()).json(&body).send().await {
            Ok(response) => response,
            Err(err) => return transport_reply(&err),
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return transport_reply(&err),
        };
        debug!(status, "Received reply");

        let raw = RawResponse::new(status, text);
        RemoteReply::Response(match retry_after {
            Some(seconds) => raw.with_retry_after(seconds),
            None => raw,
        })
    }
}
