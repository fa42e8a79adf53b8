//! Mock implementation of the StepService trait.

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use stepline_core::{RemoteReply, StepRequest, StepService};

mock! {
    pub StepService {}

    #[async_trait]
    impl StepService for StepService {
        async fn create_step(&self, request: &StepRequest) -> RemoteReply;
    }
}

/// Creates a mock that accepts every step and answers with `{"id": position}`.
pub fn create_mock_step_service() -> MockStepService {
    let mut mock = MockStepService::new();
    mock.expect_create_step()
        .returning(|request| RemoteReply::json(200, json!({ "id": request.position })));
    mock
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::function;
    use stepline_core::{normalize, ErrorKind};
    use stepline_dsl::{OperationKind, ResolvedOperation};

    fn request(position: u32) -> StepRequest {
        StepRequest {
            checkpoint_id: 7,
            position,
            operation: ResolvedOperation {
                order: 0,
                kind: OperationKind::Comment,
                target: None,
                value: Some("hello".into()),
                line: 1,
                source: "do[0]".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_mock_step_service_default_behavior() {
        let mock = create_mock_step_service();

        let result = normalize(&mock.create_step(&request(4)).await);

        assert!(result.ok);
        assert_eq!(result.id.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_mock_step_service_custom_expectation() {
        let mut mock = MockStepService::new();
        mock.expect_create_step()
            .with(function(|r: &StepRequest| r.checkpoint_id == 7))
            .times(1)
            .returning(|_| RemoteReply::json(404, json!({"error": "checkpoint not found"})));

        let result = normalize(&mock.create_step(&request(1)).await);

        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    }
}
