//! Maps the step service's replies onto one result type.
//!
//! The service is not consistent about its payloads: identifiers arrive as
//! numbers or as numeric strings, sometimes at the root and sometimes under
//! a wrapper key, and collection replies are either arrays or maps keyed by
//! id. Each accepted shape is a variant below; anything else is reported as
//! [`ErrorKind::UnrecognizedResponse`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Keys that hold an identifier directly.
const ID_KEYS: &[&str] = &["id", "stepId", "itemId"];

/// Keys that wrap the created object.
const WRAPPER_KEYS: &[&str] = &["item", "testStep", "data", "result", "step", "execution"];

/// Keys that hold a collection of objects.
const COLLECTION_KEYS: &[&str] = &["items", "steps", "data"];

/// Longest body excerpt carried into an error message.
const BODY_EXCERPT_LEN: usize = 200;

/// How a transport-level failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

/// An HTTP-style reply from the step service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// `Retry-After` header, in seconds
    pub retry_after: Option<u64>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

/// Everything a step-service call can come back with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteReply {
    Response(RawResponse),
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
}

impl RemoteReply {
    pub fn json(status: u16, body: Value) -> Self {
        RemoteReply::Response(RawResponse::new(status, body.to_string()))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        RemoteReply::Transport {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        RemoteReply::Transport {
            kind: TransportErrorKind::Connect,
            message: message.into(),
        }
    }
}

/// Canonical failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Timeout,
    ConnectionFailed,
    Transport,
    RateLimited,
    ServerError,
    #[serde(rename = "resource-missing")]
    NotFound,
    ClientError,
    /// A success status whose body reports an error
    RemoteError,
    UnrecognizedResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionFailed => "connection-failed",
            ErrorKind::Transport => "transport",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::ServerError => "server-error",
            ErrorKind::NotFound => "resource-missing",
            ErrorKind::ClientError => "client-error",
            ErrorKind::RemoteError => "remote-error",
            ErrorKind::UnrecognizedResponse => "unrecognized-response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step identifier in either of the observed encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepId {
    Numeric(i64),
    Text(String),
}

impl StepId {
    /// Reads an identifier. `0`, `"0"`, `""` and null mean "no id".
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(0) => None,
                Some(i) => Some(StepId::Numeric(i)),
                None => n
                    .as_f64()
                    .filter(|f| *f != 0.0 && f.fract() == 0.0)
                    .map(|f| StepId::Numeric(f as i64)),
            },
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(0) => None,
                    Ok(i) => Some(StepId::Numeric(i)),
                    Err(_) if s.is_empty() => None,
                    Err(_) => Some(StepId::Text(s.to_string())),
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Numeric(i) => write!(f, "{}", i),
            StepId::Text(s) => f.write_str(s),
        }
    }
}

/// Collection encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection<'a> {
    List(&'a [Value]),
    Keyed(&'a Map<String, Value>),
}

impl Collection<'_> {
    /// Id of the first entry that carries one.
    fn first_id(&self) -> Option<StepId> {
        match self {
            Collection::List(items) => items.iter().find_map(object_id),
            Collection::Keyed(map) => map.iter().find_map(|(key, entry)| {
                object_id(entry).or_else(|| StepId::from_value(&Value::String(key.clone())))
            }),
        }
    }
}

/// The success shapes the service is known to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape<'a> {
    /// An object with an id at the root or under a wrapper key
    Single(StepId),
    /// A list or an id-keyed map; the first entry's id is used
    Collection(Collection<'a>),
    /// `{"success": true}` or `{"status": "ok"}` without an id
    Acknowledged,
    Unrecognized,
}

impl<'a> ResponseShape<'a> {
    pub fn detect(body: &'a Value) -> Self {
        if let Some(id) = object_id(body) {
            return ResponseShape::Single(id);
        }
        if let Some(collection) = collection(body) {
            if collection.first_id().is_some() {
                return ResponseShape::Collection(collection);
            }
        }
        if acknowledged(body) {
            return ResponseShape::Acknowledged;
        }
        ResponseShape::Unrecognized
    }

    pub fn id(&self) -> Option<StepId> {
        match self {
            ResponseShape::Single(id) => Some(id.clone()),
            ResponseShape::Collection(collection) => collection.first_id(),
            _ => None,
        }
    }
}

fn object_id(value: &Value) -> Option<StepId> {
    let object = value.as_object()?;
    ID_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(StepId::from_value)
        .or_else(|| {
            WRAPPER_KEYS
                .iter()
                .filter_map(|key| object.get(*key))
                .find_map(|nested| {
                    let nested = nested.as_object()?;
                    ID_KEYS
                        .iter()
                        .filter_map(|key| nested.get(*key))
                        .find_map(StepId::from_value)
                })
        })
}

fn collection(value: &Value) -> Option<Collection<'_>> {
    match value {
        Value::Array(items) => Some(Collection::List(items)),
        Value::Object(object) => {
            let nested = COLLECTION_KEYS.iter().find_map(|key| match object.get(*key) {
                Some(Value::Array(items)) => Some(Collection::List(items)),
                Some(Value::Object(map)) if keyed_by_id(map) => Some(Collection::Keyed(map)),
                _ => None,
            });
            nested.or_else(|| keyed_by_id(object).then(|| Collection::Keyed(object)))
        }
        _ => None,
    }
}

fn keyed_by_id(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map
            .iter()
            .all(|(key, entry)| key.parse::<i64>().is_ok() && entry.is_object())
}

fn acknowledged(value: &Value) -> bool {
    let success = value.get("success").and_then(Value::as_bool) == Some(true);
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.eq_ignore_ascii_case("ok") || s.eq_ignore_ascii_case("success"))
        .unwrap_or(false);
    success || status
}

/// The single result type the executor works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,

    /// HTTP status, when there was a response at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl NormalizedResult {
    pub fn success(id: Option<String>, status: u16) -> Self {
        Self {
            ok: true,
            id,
            error_kind: None,
            error_message: None,
            retry_after_seconds: None,
            status: Some(status),
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            retry_after_seconds: None,
            status: None,
        }
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after_seconds = seconds;
        self
    }
}

/// Normalizes one reply. Never fails; unknown shapes become
/// `unrecognized-response`.
pub fn normalize(reply: &RemoteReply) -> NormalizedResult {
    let response = match reply {
        RemoteReply::Transport { kind, message } => {
            let kind = match kind {
                TransportErrorKind::Timeout => ErrorKind::Timeout,
                TransportErrorKind::Connect => ErrorKind::ConnectionFailed,
                TransportErrorKind::Other => ErrorKind::Transport,
            };
            return NormalizedResult::failure(kind, message.clone());
        }
        RemoteReply::Response(response) => response,
    };

    let body: Option<Value> = if response.body.trim().is_empty() {
        None
    } else {
        serde_json::from_str(&response.body).ok()
    };
    let retry_after = response
        .retry_after
        .or_else(|| body.as_ref().and_then(body_retry_after));
    let status = response.status;

    if (200..300).contains(&status) {
        let Some(body) = body else {
            return NormalizedResult::failure(
                ErrorKind::UnrecognizedResponse,
                format!("response body is not JSON: {}", excerpt(&response.body)),
            )
            .with_status(status);
        };

        if let Some(message) = explicit_error(&body) {
            return NormalizedResult::failure(ErrorKind::RemoteError, message)
                .with_status(status)
                .with_retry_after(retry_after);
        }

        let shape = ResponseShape::detect(&body);
        return match shape {
            ResponseShape::Unrecognized => match body.get("message").and_then(Value::as_str) {
                Some(message) if !message.is_empty() => {
                    NormalizedResult::failure(ErrorKind::RemoteError, message)
                }
                _ => NormalizedResult::failure(
                    ErrorKind::UnrecognizedResponse,
                    format!("no step id in response: {}", excerpt(&response.body)),
                ),
            }
            .with_status(status),
            shape => NormalizedResult::success(shape.id().map(|id| id.to_string()), status),
        };
    }

    let kind = match status {
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        400..=499 => ErrorKind::ClientError,
        _ => ErrorKind::UnrecognizedResponse,
    };
    let message = body
        .as_ref()
        .and_then(|b| explicit_error(b).or_else(|| b.get("message").and_then(Value::as_str).map(str::to_string)))
        .unwrap_or_else(|| {
            if response.body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, excerpt(&response.body))
            }
        });

    NormalizedResult::failure(kind, message)
        .with_status(status)
        .with_retry_after(retry_after)
}

fn explicit_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(error) => Some(
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(error.clone()).to_string()),
        ),
        _ => None,
    }
}

fn body_retry_after(body: &Value) -> Option<u64> {
    let read = |value: &Value| {
        ["retryAfter", "retry_after"]
            .iter()
            .filter_map(|key| value.get(*key))
            .find_map(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
    };
    read(body).or_else(|| body.get("error").and_then(read))
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= BODY_EXCERPT_LEN {
        body.to_string()
    } else {
        let cut: String = body.chars().take(BODY_EXCERPT_LEN).collect();
        format!("{}...", cut)
    }
}
