//! Simulated task handlers.
//!
//! One deterministic handler per task kind, used by the demo binary and by
//! tests that only care about orchestration. Production deployments register
//! their own [`TaskHandler`] implementations instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::handler::{TaskContext, TaskExecutionError, TaskHandler};
use docflow_types::TaskKind;

/// Pretends to run a document operation (`operation` param, default
/// `"extract"`) over `pages` pages (default 1).
#[derive(Debug, Default)]
pub struct SimulatedDocumentProcessor;

#[async_trait]
impl TaskHandler for SimulatedDocumentProcessor {
    fn kind(&self) -> TaskKind {
        TaskKind::DocumentProcessing
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let operation = ctx.param_str("operation").unwrap_or("extract");
        let pages = ctx.param("pages").and_then(Value::as_u64).unwrap_or(1);
        Ok(json!({
            "operation": operation,
            "status": "processed",
            "pages": pages,
            "processed_at": Utc::now().to_rfc3339(),
        }))
    }
}

/// Pretends to deliver a notification over the `channel` param (default
/// `"email"`).
#[derive(Debug, Default)]
pub struct SimulatedNotifier;

#[async_trait]
impl TaskHandler for SimulatedNotifier {
    fn kind(&self) -> TaskKind {
        TaskKind::Notification
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let channel = ctx.param_str("channel").unwrap_or("email");
        Ok(json!({
            "channel": channel,
            "delivered": true,
            "delivered_at": Utc::now().to_rfc3339(),
        }))
    }
}

/// Pretends to call the external service named by the `endpoint` param.
#[derive(Debug, Default)]
pub struct SimulatedApiClient;

#[async_trait]
impl TaskHandler for SimulatedApiClient {
    fn kind(&self) -> TaskKind {
        TaskKind::ExternalApi
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let endpoint = ctx
            .param_str("endpoint")
            .ok_or_else(|| TaskExecutionError::InvalidInput("missing 'endpoint' param".into()))?;
        Ok(json!({
            "endpoint": endpoint,
            "status_code": 200,
        }))
    }
}

/// Copies the data-bag value named by the `input_key` param into the result.
#[derive(Debug, Default)]
pub struct SimulatedTransformer;

#[async_trait]
impl TaskHandler for SimulatedTransformer {
    fn kind(&self) -> TaskKind {
        TaskKind::DataTransformation
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let input = ctx
            .param_str("input_key")
            .and_then(|key| ctx.data_value(key))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(json!({
            "transformed": true,
            "input": input,
        }))
    }
}

/// The full simulated set, one handler per task kind.
pub fn simulated_handlers() -> Vec<Arc<dyn TaskHandler>> {
    vec![
        Arc::new(SimulatedDocumentProcessor),
        Arc::new(SimulatedNotifier),
        Arc::new(SimulatedApiClient),
        Arc::new(SimulatedTransformer),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_types::{TaskDefinition, WorkflowInstanceId};

    fn context(task: TaskDefinition, data: serde_json::Map<String, Value>) -> TaskContext {
        TaskContext::new(WorkflowInstanceId::generate(), task, data)
    }

    #[tokio::test]
    async fn test_document_processor_reports_operation() {
        let task = TaskDefinition::new("ocr", TaskKind::DocumentProcessing)
            .with_param("operation", json!("ocr"))
            .with_param("pages", json!(4));
        let result = SimulatedDocumentProcessor
            .execute(&context(task, serde_json::Map::new()))
            .await
            .unwrap();
        assert_eq!(result["operation"], "ocr");
        assert_eq!(result["pages"], 4);
        assert_eq!(result["status"], "processed");
    }

    #[tokio::test]
    async fn test_notifier_defaults_to_email() {
        let task = TaskDefinition::new("notify", TaskKind::Notification);
        let result = SimulatedNotifier
            .execute(&context(task, serde_json::Map::new()))
            .await
            .unwrap();
        assert_eq!(result["channel"], "email");
        assert_eq!(result["delivered"], true);
    }

    #[tokio::test]
    async fn test_api_client_requires_endpoint() {
        let task = TaskDefinition::new("push", TaskKind::ExternalApi);
        let err = SimulatedApiClient
            .execute(&context(task, serde_json::Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskExecutionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_transformer_copies_input() {
        let task = TaskDefinition::new("shape", TaskKind::DataTransformation)
            .with_param("input_key", json!("doc"));
        let mut data = serde_json::Map::new();
        data.insert("doc".into(), json!({ "kind": "invoice" }));
        let result = SimulatedTransformer
            .execute(&context(task, data))
            .await
            .unwrap();
        assert_eq!(result["input"]["kind"], "invoice");
        assert_eq!(result["transformed"], true);
    }

    #[test]
    fn test_simulated_set_covers_every_kind() {
        let kinds: Vec<TaskKind> = simulated_handlers().iter().map(|h| h.kind()).collect();
        assert_eq!(kinds.len(), 4);
        assert!(kinds.contains(&TaskKind::DocumentProcessing));
        assert!(kinds.contains(&TaskKind::Notification));
        assert!(kinds.contains(&TaskKind::ExternalApi));
        assert!(kinds.contains(&TaskKind::DataTransformation));
    }
}
