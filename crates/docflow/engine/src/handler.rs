//! Task handler seam.
//!
//! Handlers are the engine's only extension point: one per [`TaskKind`],
//! registered as trait objects and invoked for every task attempt. Handler
//! errors are captured on the task instance and routed through the retry and
//! failure machinery; they never reach the engine's API callers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use docflow_types::{TaskDefinition, TaskKind, WorkflowInstanceId};

/// Error raised by a task handler attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskExecutionError {
    #[error("no handler registered for task kind '{0}'")]
    HandlerMissing(TaskKind),

    #[error("invalid task input: {0}")]
    InvalidInput(String),

    #[error("task handler failed: {0}")]
    Failed(String),
}

/// Everything a handler sees for one attempt: the owning instance id, the
/// task definition (kind, params, output map) and a snapshot of the data bag
/// taken when the attempt was dispatched.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub instance_id: WorkflowInstanceId,
    pub task: TaskDefinition,
    pub data: serde_json::Map<String, Value>,
}

impl TaskContext {
    pub fn new(
        instance_id: WorkflowInstanceId,
        task: TaskDefinition,
        data: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            instance_id,
            task,
            data,
        }
    }

    /// Task parameter by key
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.task.params.get(key)
    }

    /// Task parameter as a string slice
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    /// Data-bag value by key
    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Executes task attempts for one task kind.
///
/// The returned value becomes the task result; entries of the task's output
/// map are resolved against it and merged into the data bag on completion.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Task kind this handler serves
    fn kind(&self) -> TaskKind;

    /// Execute one attempt
    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError>;
}

/// Kind-indexed registry of task handlers.
///
/// Registering a second handler for a kind replaces the first; lookups hand
/// out cheap `Arc` clones so execution never holds the registry lock.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, handler: Arc<dyn TaskHandler>) {
        let kind = handler.kind();
        debug!(kind = %kind, "Task handler registered");
        self.handlers.write().await.insert(kind, handler);
    }

    pub async fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().await.get(&kind).cloned()
    }

    /// Kinds with a registered handler
    pub async fn kinds(&self) -> Vec<TaskKind> {
        self.handlers.read().await.keys().copied().collect()
    }

    pub async fn count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
