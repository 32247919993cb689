//! Engine error types.

use crate::definition::{TaskId, WorkflowDefinitionId};
use crate::instance::{WorkflowInstanceId, WorkflowStatus};

/// Errors surfaced by the engine's public API.
///
/// Validation variants are registration-fatal: the definition is rejected and
/// nothing is stored. Not-found and invalid-state variants are call-fatal:
/// the operation is refused and the instance is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow validation failed: {0}")]
    Validation(String),

    #[error("duplicate task id in definition: {0}")]
    DuplicateTaskId(TaskId),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("cycle detected in task dependency graph")]
    CycleDetected,

    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(WorkflowDefinitionId),

    #[error("workflow instance not found: {0}")]
    InstanceNotFound(WorkflowInstanceId),

    #[error("cannot {operation} a {actual} instance (requires {expected})")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        actual: WorkflowStatus,
    },
}

/// Result alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::UnknownDependency {
            task: TaskId::new("notify"),
            dependency: TaskId::new("ghost"),
        };
        assert_eq!(
            err.to_string(),
            "task 'notify' depends on unknown task 'ghost'"
        );

        let err = WorkflowError::InvalidState {
            operation: "pause",
            expected: "running",
            actual: WorkflowStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "cannot pause a completed instance (requires running)"
        );
    }

    #[test]
    fn test_not_found_display_carries_id() {
        let id = WorkflowInstanceId::new("abc123");
        let err = WorkflowError::InstanceNotFound(id);
        assert!(err.to_string().contains("abc123"));
    }
}
