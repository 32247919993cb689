//! Events published on the engine's broadcast stream.
//!
//! Subscribers receive one [`WorkflowEvent`] per externally visible lifecycle
//! edge. Queuing and skipping are bookkeeping details and appear only in the
//! instance audit log, not on the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::definition::TaskId;
use crate::instance::WorkflowInstanceId;

/// The twelve event kinds carried on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    WorkflowStarted,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCancelled,
    WorkflowCompleted,
    WorkflowFailed,
    TaskStarted,
    TaskCompleted,
    TaskError,
    TaskRetryScheduled,
    TaskFailed,
    TaskCancelled,
}

impl WorkflowEventKind {
    /// Snake_case tag, matching the audit log vocabulary
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEventKind::WorkflowStarted => "workflow_started",
            WorkflowEventKind::WorkflowPaused => "workflow_paused",
            WorkflowEventKind::WorkflowResumed => "workflow_resumed",
            WorkflowEventKind::WorkflowCancelled => "workflow_cancelled",
            WorkflowEventKind::WorkflowCompleted => "workflow_completed",
            WorkflowEventKind::WorkflowFailed => "workflow_failed",
            WorkflowEventKind::TaskStarted => "task_started",
            WorkflowEventKind::TaskCompleted => "task_completed",
            WorkflowEventKind::TaskError => "task_error",
            WorkflowEventKind::TaskRetryScheduled => "task_retry_scheduled",
            WorkflowEventKind::TaskFailed => "task_failed",
            WorkflowEventKind::TaskCancelled => "task_cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub instance_id: WorkflowInstanceId,
    /// Present on task-level kinds, absent on workflow-level ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub kind: WorkflowEventKind,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Workflow-level event (no task id)
    pub fn workflow(instance_id: WorkflowInstanceId, kind: WorkflowEventKind) -> Self {
        Self {
            instance_id,
            task_id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Task-level event
    pub fn task(instance_id: WorkflowInstanceId, task_id: TaskId, kind: WorkflowEventKind) -> Self {
        Self {
            instance_id,
            task_id: Some(task_id),
            kind,
            timestamp: Utc::now(),
        }
    }
}
