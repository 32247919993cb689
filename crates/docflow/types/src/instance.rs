//! Workflow instance runtime state.
//!
//! A [`WorkflowInstance`] is one execution of a registered definition. It owns
//! the three task partitions (current / completed / failed), the shared data
//! bag handlers read and write through output mappings, and an append-only
//! audit log. Instances are mutated only by the engine's scheduler while it
//! holds the instance store's write lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{TaskId, WorkflowDefinitionId};

/// Unique identifier for a workflow instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    /// Generate a new random instance ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get short form (first 8 chars) for display
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Executing; the only state that dispatches work
    Running,
    /// Suspended; in-flight tasks finish, nothing new starts
    Paused,
    /// Caller stopped the instance (terminal)
    Cancelled,
    /// Every task finished (terminal)
    Completed,
    /// A task exhausted its retries under the fail_workflow policy (terminal)
    Failed,
}

impl WorkflowStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Cancelled | WorkflowStatus::Completed | WorkflowStatus::Failed
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Execution state of a single task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible and waiting for dispatch
    Queued,
    /// Handler currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Attempts exhausted
    Failed,
    /// Failed with attempts remaining; a timer will re-queue it
    Retry,
    /// Instance was cancelled while the task was still current
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retry => "retry",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Captured handler failure: message plus when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One execution of a task definition within an instance.
///
/// The id matches the definition task id; at most one TaskInstance per task
/// id ever exists in an instance (retries reuse the same record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Executions begun so far, retries included
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Most recent failure, kept across retries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl TaskInstance {
    /// Fresh task record in the queued state
    pub fn queued(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Queued,
            attempts: 0,
            started_at: None,
            ended_at: None,
            error: None,
            result: None,
        }
    }

    /// Mark running and count the attempt
    pub fn begin(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    pub fn complete(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.ended_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn fail(&mut self, failure: TaskFailure) {
        self.status = TaskStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.error = Some(failure);
    }

    /// Park the task until its retry timer fires
    pub fn schedule_retry(&mut self, failure: TaskFailure) {
        self.status = TaskStatus::Retry;
        self.error = Some(failure);
    }

    /// Timer fired: eligible for dispatch again
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Queued;
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.ended_at = Some(Utc::now());
    }
}

/// Append-only audit record: sequence, snake_case event tag, detail map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonically increasing, starting at 1
    pub sequence: u64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub definition_id: WorkflowDefinitionId,
    pub status: WorkflowStatus,
    /// Tasks queued, running, awaiting retry, or cancelled in place
    pub current_tasks: Vec<TaskInstance>,
    /// Successfully finished tasks, in completion order
    pub completed_tasks: Vec<TaskInstance>,
    /// Tasks that exhausted their attempts
    pub failed_tasks: Vec<TaskInstance>,
    /// Shared data bag: initial payload plus merged task outputs
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub audit_log: Vec<AuditEntry>,
}

impl WorkflowInstance {
    /// Create a running instance and record `workflow_started`
    pub fn new(definition_id: WorkflowDefinitionId, data: serde_json::Map<String, Value>) -> Self {
        let mut instance = Self {
            id: WorkflowInstanceId::generate(),
            definition_id: definition_id.clone(),
            status: WorkflowStatus::Running,
            current_tasks: Vec::new(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            data,
            started_at: Utc::now(),
            ended_at: None,
            audit_log: Vec::new(),
        };
        instance.record_audit(
            "workflow_started",
            serde_json::json!({ "definition_id": definition_id.0 }),
        );
        instance
    }

    /// Append an audit entry; sequences are assigned here and never reused
    pub fn record_audit(&mut self, event: impl Into<String>, details: Value) {
        let sequence = self.audit_log.len() as u64 + 1;
        self.audit_log.push(AuditEntry {
            sequence,
            event: event.into(),
            details,
            timestamp: Utc::now(),
        });
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkflowStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == WorkflowStatus::Paused
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn pause(&mut self) {
        self.status = WorkflowStatus::Paused;
        self.record_audit("workflow_paused", Value::Null);
    }

    pub fn resume(&mut self) {
        self.status = WorkflowStatus::Running;
        self.record_audit("workflow_resumed", Value::Null);
    }

    pub fn cancel(&mut self) {
        self.status = WorkflowStatus::Cancelled;
        self.ended_at = Some(Utc::now());
        self.record_audit("workflow_cancelled", Value::Null);
    }

    pub fn complete(&mut self) {
        self.status = WorkflowStatus::Completed;
        self.ended_at = Some(Utc::now());
        self.record_audit("workflow_completed", Value::Null);
    }

    /// Fail the instance, recording the task that triggered it
    pub fn fail(&mut self, task: &TaskId, error: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.record_audit(
            "workflow_failed",
            serde_json::json!({ "task_id": task.as_str(), "error": error.into() }),
        );
    }

    /// Task in the current partition, if any
    pub fn current_task(&self, id: &TaskId) -> Option<&TaskInstance> {
        self.current_tasks.iter().find(|t| &t.id == id)
    }

    pub fn current_task_mut(&mut self, id: &TaskId) -> Option<&mut TaskInstance> {
        self.current_tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn has_current(&self, id: &TaskId) -> bool {
        self.current_task(id).is_some()
    }

    /// Remove a task from the current partition for re-filing
    pub fn take_current(&mut self, id: &TaskId) -> Option<TaskInstance> {
        let index = self.current_tasks.iter().position(|t| &t.id == id)?;
        Some(self.current_tasks.remove(index))
    }

    /// True once the task sits in the completed partition
    pub fn is_task_completed(&self, id: &TaskId) -> bool {
        self.completed_tasks.iter().any(|t| &t.id == id)
    }

    pub fn completed_task(&self, id: &TaskId) -> Option<&TaskInstance> {
        self.completed_tasks.iter().find(|t| &t.id == id)
    }

    pub fn failed_task(&self, id: &TaskId) -> Option<&TaskInstance> {
        self.failed_tasks.iter().find(|t| &t.id == id)
    }

    /// Audit entries carrying the given event tag, in sequence order
    pub fn audit_entries(&self, event: &str) -> Vec<&AuditEntry> {
        self.audit_log.iter().filter(|e| e.event == event).collect()
    }
}
