//! Workflow definition types.
//!
//! A [`WorkflowDefinition`] is a reusable template for a document-processing
//! pipeline: a set of typed tasks connected by dependency edges, optionally
//! gated by conditions over the shared data bag. Definitions are validated at
//! registration time and shared read-only by every instance started from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::errors::{WorkflowError, WorkflowResult};

/// Unique identifier for a workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowDefinitionId(pub String);

impl WorkflowDefinitionId {
    /// Generate a new random definition ID
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

impl std::fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a task within a workflow definition.
///
/// Task ids are chosen by the definition author and stay stable between the
/// definition and every task instance spawned from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category a task belongs to, used to select its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Transforms or analyzes document content (OCR, extraction, rendering)
    DocumentProcessing,
    /// Notifies an external party (mail, webhook, chat)
    Notification,
    /// Calls out to a third-party service
    ExternalApi,
    /// Reshapes data already in the bag
    DataTransformation,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::DocumentProcessing => "document_processing",
            TaskKind::Notification => "notification",
            TaskKind::ExternalApi => "external_api",
            TaskKind::DataTransformation => "data_transformation",
        };
        write!(f, "{}", s)
    }
}

/// Retry behavior for a failing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Total attempts allowed, including the first one
    pub max_attempts: u32,
    /// Pause before each re-attempt, in milliseconds
    pub delay_ms: u64,
}

impl RetryStrategy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// Re-attempt pause as a [`Duration`]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryStrategy {
    /// One attempt, no delay: a task without a declared strategy never retries.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
        }
    }
}

/// What happens to the instance once a task exhausts its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the failure and keep the rest of the pipeline going
    Continue,
    /// Fail the whole instance
    #[default]
    FailWorkflow,
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::Continue => write!(f, "continue"),
            ErrorPolicy::FailWorkflow => write!(f, "fail_workflow"),
        }
    }
}

/// A single step in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    /// Selects the handler that will execute this task
    pub kind: TaskKind,
    /// Ids of tasks that must complete before this one becomes eligible
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TaskId>,
    /// Optional expression over the data bag; false skips the task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Retry behavior; absent means a single attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryStrategy>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    /// Data-bag key ← dot-path into the task result, merged on completion
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output_map: HashMap<String, String>,
    /// Free-form parameters handed to the handler
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: TaskId::new(id),
            kind,
            depends_on: Vec::new(),
            condition: None,
            retry: None,
            on_error: ErrorPolicy::default(),
            output_map: HashMap::new(),
            params: serde_json::Map::new(),
        }
    }

    /// Add a dependency on another task
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(TaskId::new(dep));
        self
    }

    /// Gate execution on an expression over the data bag
    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(expr.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Merge `path` of the task result into the data bag under `key`
    pub fn with_output(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.output_map.insert(key.into(), path.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Declared strategy, or the single-attempt default
    pub fn effective_retry(&self) -> RetryStrategy {
        self.retry.unwrap_or_default()
    }

    /// True when the task has no dependencies
    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// A reusable pipeline template.
///
/// Built with [`WorkflowDefinition::new`] and `with_task`, then checked by
/// [`validate`](WorkflowDefinition::validate) before the registry accepts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowDefinitionId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tasks in declaration order; scans preserve this order
    pub tasks: Vec<TaskDefinition>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkflowDefinitionId::generate(),
            name: name.into(),
            description: None,
            tasks: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a task. Duplicate ids are caught by [`validate`](Self::validate).
    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }

    /// Look up a task by id
    pub fn task(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Tasks with no dependencies, in declaration order
    pub fn root_tasks(&self) -> Vec<&TaskDefinition> {
        self.tasks.iter().filter(|t| t.is_root()).collect()
    }

    /// Tasks whose dependency list names `id`, in declaration order
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&TaskDefinition> {
        self.tasks
            .iter()
            .filter(|t| t.depends_on.contains(id))
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Check structural invariants: at least one task, unique task ids, every
    /// dependency resolving to a declared task, and an acyclic dependency
    /// graph.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.tasks.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "workflow '{}' declares no tasks",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(&task.id) {
                return Err(WorkflowError::DuplicateTaskId(task.id.clone()));
            }
        }

        for task in &self.tasks {
            for dep in &task.depends_on {
                if !seen.contains(dep) {
                    return Err(WorkflowError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm over the dependency graph. Tasks left unprocessed
    /// after the queue drains sit on a cycle.
    fn check_acyclic(&self) -> WorkflowResult<()> {
        let mut indegree: HashMap<&TaskId, usize> = self
            .tasks
            .iter()
            .map(|t| (&t.id, t.depends_on.len()))
            .collect();

        let mut ready: VecDeque<&TaskId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut processed = 0usize;
        while let Some(id) = ready.pop_front() {
            processed += 1;
            for dependent in self.dependents_of(id) {
                let d = indegree
                    .get_mut(&dependent.id)
                    .ok_or(WorkflowError::CycleDetected)?;
                *d -= 1;
                if *d == 0 {
                    ready.push_back(&dependent.id);
                }
            }
        }

        if processed < self.tasks.len() {
            return Err(WorkflowError::CycleDetected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> [TaskKind; 4] {
        [
            TaskKind::DocumentProcessing,
            TaskKind::Notification,
            TaskKind::ExternalApi,
            TaskKind::DataTransformation,
        ]
    }

    #[test]
    fn test_definition_id_generation() {
        let a = WorkflowDefinitionId::generate();
        let b = WorkflowDefinitionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_task_id_display() {
        let id = TaskId::new("extract-text");
        assert_eq!(id.to_string(), "extract-text");
        assert_eq!(id.as_str(), "extract-text");
    }

    #[test]
    fn test_task_kind_display_matches_serde() {
        for kind in kinds() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_retry_strategy_default_is_single_attempt() {
        let retry = RetryStrategy::default();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay_ms, 0);
        assert_eq!(retry.delay(), Duration::ZERO);
    }

    #[test]
    fn test_error_policy_defaults_to_fail_workflow() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::FailWorkflow);
    }

    #[test]
    fn test_task_builder() {
        let task = TaskDefinition::new("notify", TaskKind::Notification)
            .with_dependency("classify")
            .with_condition("doc.kind == invoice")
            .with_retry(RetryStrategy::new(3, 250))
            .with_error_policy(ErrorPolicy::Continue)
            .with_output("notified", "delivered")
            .with_param("channel", serde_json::json!("email"));

        assert_eq!(task.id, TaskId::new("notify"));
        assert_eq!(task.depends_on, vec![TaskId::new("classify")]);
        assert_eq!(task.condition.as_deref(), Some("doc.kind == invoice"));
        assert_eq!(task.effective_retry().max_attempts, 3);
        assert_eq!(task.on_error, ErrorPolicy::Continue);
        assert_eq!(task.output_map.get("notified").unwrap(), "delivered");
        assert!(!task.is_root());
    }

    #[test]
    fn test_effective_retry_without_strategy() {
        let task = TaskDefinition::new("ocr", TaskKind::DocumentProcessing);
        assert_eq!(task.effective_retry(), RetryStrategy::default());
    }

    #[test]
    fn test_validate_accepts_linear_chain() {
        let def = WorkflowDefinition::new("review")
            .with_task(TaskDefinition::new("ingest", TaskKind::DocumentProcessing))
            .with_task(
                TaskDefinition::new("classify", TaskKind::DataTransformation)
                    .with_dependency("ingest"),
            )
            .with_task(
                TaskDefinition::new("notify", TaskKind::Notification).with_dependency("classify"),
            );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_definition() {
        let def = WorkflowDefinition::new("empty");
        assert!(matches!(
            def.validate(),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_task_id() {
        let def = WorkflowDefinition::new("dup")
            .with_task(TaskDefinition::new("a", TaskKind::Notification))
            .with_task(TaskDefinition::new("a", TaskKind::Notification));
        assert!(matches!(
            def.validate(),
            Err(WorkflowError::DuplicateTaskId(id)) if id == TaskId::new("a")
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let def = WorkflowDefinition::new("dangling").with_task(
            TaskDefinition::new("a", TaskKind::Notification).with_dependency("ghost"),
        );
        assert!(matches!(
            def.validate(),
            Err(WorkflowError::UnknownDependency { task, dependency })
                if task == TaskId::new("a") && dependency == TaskId::new("ghost")
        ));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let def = WorkflowDefinition::new("cyclic")
            .with_task(TaskDefinition::new("a", TaskKind::Notification).with_dependency("b"))
            .with_task(TaskDefinition::new("b", TaskKind::Notification).with_dependency("a"));
        assert!(matches!(def.validate(), Err(WorkflowError::CycleDetected)));
    }

    #[test]
    fn test_validate_rejects_self_dependency() {
        let def = WorkflowDefinition::new("selfish")
            .with_task(TaskDefinition::new("a", TaskKind::Notification).with_dependency("a"));
        assert!(matches!(def.validate(), Err(WorkflowError::CycleDetected)));
    }

    #[test]
    fn test_validate_accepts_diamond() {
        let def = WorkflowDefinition::new("diamond")
            .with_task(TaskDefinition::new("in", TaskKind::DocumentProcessing))
            .with_task(
                TaskDefinition::new("left", TaskKind::DataTransformation).with_dependency("in"),
            )
            .with_task(
                TaskDefinition::new("right", TaskKind::DataTransformation).with_dependency("in"),
            )
            .with_task(
                TaskDefinition::new("join", TaskKind::Notification)
                    .with_dependency("left")
                    .with_dependency("right"),
            );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_root_tasks_and_dependents() {
        let def = WorkflowDefinition::new("fanout")
            .with_task(TaskDefinition::new("a", TaskKind::DocumentProcessing))
            .with_task(TaskDefinition::new("b", TaskKind::DocumentProcessing))
            .with_task(
                TaskDefinition::new("c", TaskKind::Notification)
                    .with_dependency("a")
                    .with_dependency("b"),
            );

        let roots: Vec<_> = def.root_tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(roots, vec![TaskId::new("a"), TaskId::new("b")]);

        let deps: Vec<_> = def
            .dependents_of(&TaskId::new("a"))
            .iter()
            .map(|t| t.id.clone())
            .collect();
        assert_eq!(deps, vec![TaskId::new("c")]);
        assert!(def.dependents_of(&TaskId::new("c")).is_empty());
    }

    #[test]
    fn test_definition_serialization_roundtrip() {
        let def = WorkflowDefinition::new("roundtrip")
            .with_description("smoke")
            .with_task(
                TaskDefinition::new("only", TaskKind::ExternalApi)
                    .with_retry(RetryStrategy::new(2, 50)),
            );
        let json = serde_json::to_string(&def).unwrap();
        let back: WorkflowDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, def.id);
        assert_eq!(back.tasks.len(), 1);
        assert_eq!(back.tasks[0].retry, Some(RetryStrategy::new(2, 50)));
    }
}
