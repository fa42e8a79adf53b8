//! A step service that replays scripted replies.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stepline_core::{RemoteReply, StepRequest, StepService};

/// Replies to step creation from a queue, falling back to success.
///
/// Unscripted calls succeed with `{"id": checkpoint * 1000 + position}` so
/// ids stay unique across checkpoints. Rules registered with
/// [`fail_position`](Self::fail_position) or
/// [`fail_position_once`](Self::fail_position_once) win over both.
#[derive(Clone, Default)]
pub struct ScriptedStepService {
    replies: Arc<Mutex<VecDeque<RemoteReply>>>,
    position_failures: Arc<Mutex<Vec<PositionFailure>>>,
    requests: Arc<Mutex<Vec<StepRequest>>>,
    latency: Option<Duration>,
}

struct PositionFailure {
    position: u32,
    body: Value,
    /// `None` fails every call
    remaining: Option<u32>,
}

impl fmt::Debug for ScriptedStepService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedStepService")
            .field("queued", &self.replies.lock().len())
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl ScriptedStepService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every reply, for timeout and concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a reply for the next unscripted call.
    pub fn push_reply(&self, reply: RemoteReply) -> &Self {
        self.replies.lock().push_back(reply);
        self
    }

    /// Queues a JSON reply.
    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push_reply(RemoteReply::json(status, body))
    }

    /// Every call for `position` answers with a 400 and `body`.
    pub fn fail_position(&self, position: u32, body: Value) -> &Self {
        self.position_failures.lock().push(PositionFailure {
            position,
            body,
            remaining: None,
        });
        self
    }

    /// Only the first call for `position` answers with a 400 and `body`.
    ///
    /// After a permanent failure the next operation reuses the position, so
    /// this is the rule to use when later operations should succeed.
    pub fn fail_position_once(&self, position: u32, body: Value) -> &Self {
        self.position_failures.lock().push(PositionFailure {
            position,
            body,
            remaining: Some(1),
        });
        self
    }

    /// Requests received so far, retries included.
    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Positions of all received requests, in arrival order.
    pub fn positions(&self) -> Vec<u32> {
        self.requests.lock().iter().map(|r| r.position).collect()
    }

    fn next_reply(&self, request: &StepRequest) -> RemoteReply {
        let failure = {
            let mut failures = self.position_failures.lock();
            let index = failures.iter().position(|f| f.position == request.position);
            index.map(|index| {
                let rule = &mut failures[index];
                let body = rule.body.clone();
                let exhausted = match rule.remaining.as_mut() {
                    Some(n) => {
                        *n -= 1;
                        *n == 0
                    }
                    None => false,
                };
                if exhausted {
                    failures.remove(index);
                }
                body
            })
        };
        if let Some(body) = failure {
            return RemoteReply::json(400, body);
        }
        self.replies.lock().pop_front().unwrap_or_else(|| {
            RemoteReply::json(
                200,
                json!({ "item": { "id": request.checkpoint_id * 1000 + request.position as i64 } }),
            )
        })
    }
}

#[async_trait]
impl StepService for ScriptedStepService {
    async fn create_step(&self, request: &StepRequest) -> RemoteReply {
        self.requests.lock().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_reply(request)
    }
}
