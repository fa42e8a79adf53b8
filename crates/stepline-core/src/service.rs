use crate::normalizer::RemoteReply;
use async_trait::async_trait;
use serde::Serialize;
use stepline_dsl::ResolvedOperation;

/// One step-creation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    pub checkpoint_id: i64,
    /// 1-based position inside the checkpoint
    pub position: u32,
    pub operation: ResolvedOperation,
}

/// The remote step-creation endpoint.
///
/// Implementations never fail: transport problems are reported as
/// [`RemoteReply::Transport`] so the normalizer sees every outcome.
#[async_trait]
pub trait StepService: Send + Sync {
    async fn create_step(&self, request: &StepRequest) -> RemoteReply;
}
