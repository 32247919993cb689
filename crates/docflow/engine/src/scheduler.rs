//! Synchronous task transition core.
//!
//! Every state transition — queuing with condition gating, dependency
//! propagation, execution bookkeeping, retry arming, cancellation marking and
//! completion detection — is a plain synchronous method here, invoked by the
//! orchestrator inside one instance-store write-lock section. That serializes
//! whole cascades (complete a task, queue its ready dependents, detect
//! completion) as single atomic steps.
//!
//! Methods never perform I/O. Anything that must happen outside the lock is
//! returned in [`SchedulerEffects`]: events to emit, tasks to dispatch and
//! retry timers to arm.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

use crate::condition::{resolve_path, ConditionEvaluator, ConditionVerdict};
use docflow_types::{
    ErrorPolicy, TaskDefinition, TaskFailure, TaskId, TaskInstance, TaskStatus,
    WorkflowDefinition, WorkflowEvent, WorkflowEventKind, WorkflowInstance,
};

/// Work to perform after the write lock is released.
#[derive(Debug, Default)]
pub(crate) struct SchedulerEffects {
    /// Events to publish, in order
    pub events: Vec<WorkflowEvent>,
    /// Tasks to hand to the executor
    pub dispatches: Vec<TaskId>,
    /// Retry timers to arm
    pub retries: Vec<RetryTimer>,
}

impl SchedulerEffects {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One-shot timer re-queuing a task in retry status.
#[derive(Debug)]
pub(crate) struct RetryTimer {
    pub task_id: TaskId,
    pub delay: Duration,
}

/// The transition core. Stateless apart from the condition evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TaskScheduler {
    conditions: ConditionEvaluator,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            conditions: ConditionEvaluator::new(),
        }
    }

    /// Queue every root task, in definition order.
    pub fn queue_roots(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        fx: &mut SchedulerEffects,
    ) {
        let roots: Vec<TaskId> = definition.root_tasks().iter().map(|t| t.id.clone()).collect();
        for task_id in roots {
            self.queue_task(instance, definition, &task_id, fx);
        }
    }

    /// Queue one task: idempotent, condition-gated, dispatch held while the
    /// instance is paused and refused once it is terminal.
    pub fn queue_task(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        task_id: &TaskId,
        fx: &mut SchedulerEffects,
    ) {
        if instance.is_terminal() || instance.has_current(task_id) {
            return;
        }
        let Some(task_def) = definition.task(task_id) else {
            return;
        };

        if let Some(condition) = &task_def.condition {
            let verdict = self.conditions.evaluate(condition, &instance.data);
            if let ConditionVerdict::NotSatisfied { reason } = verdict {
                debug!(
                    instance = %instance.id,
                    task = %task_id,
                    %reason,
                    "Task skipped"
                );
                instance.record_audit(
                    "task_skipped",
                    json!({ "task_id": task_id.as_str(), "reason": reason }),
                );
                // A skipped task never becomes a TaskInstance. Its dependents
                // are still examined, but readiness only consults completed
                // tasks, so a dependent gated solely on this one stays
                // ineligible.
                self.examine_dependents(instance, definition, task_id, fx);
                return;
            }
        }

        instance
            .current_tasks
            .push(TaskInstance::queued(task_id.clone()));
        instance.record_audit("task_queued", json!({ "task_id": task_id.as_str() }));
        if instance.is_running() {
            fx.dispatches.push(task_id.clone());
        }
    }

    /// Queue every dependent of `finished` whose dependencies are all
    /// completed, in definition order.
    fn examine_dependents(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        finished: &TaskId,
        fx: &mut SchedulerEffects,
    ) {
        let ready: Vec<TaskId> = definition
            .dependents_of(finished)
            .into_iter()
            .filter(|t| t.depends_on.iter().all(|d| instance.is_task_completed(d)))
            .map(|t| t.id.clone())
            .collect();
        for task_id in ready {
            self.queue_task(instance, definition, &task_id, fx);
        }
    }

    /// Begin an attempt: only a queued task on a running instance starts.
    /// Returns the data-bag snapshot the handler will see, or `None` when the
    /// dispatch is dropped.
    pub fn begin_task(
        &self,
        instance: &mut WorkflowInstance,
        task_id: &TaskId,
        fx: &mut SchedulerEffects,
    ) -> Option<serde_json::Map<String, Value>> {
        if !instance.is_running() {
            debug!(
                instance = %instance.id,
                task = %task_id,
                status = %instance.status,
                "Dispatch dropped, instance not running"
            );
            return None;
        }
        let attempt = {
            let task = instance.current_task_mut(task_id)?;
            if task.status != TaskStatus::Queued {
                return None;
            }
            task.begin();
            task.attempts
        };
        instance.record_audit(
            "task_started",
            json!({ "task_id": task_id.as_str(), "attempt": attempt }),
        );
        fx.events.push(WorkflowEvent::task(
            instance.id.clone(),
            task_id.clone(),
            WorkflowEventKind::TaskStarted,
        ));
        Some(instance.data.clone())
    }

    /// Success bookkeeping: store the result, merge mapped outputs, move the
    /// task to the completed partition, queue ready dependents, then check
    /// for completion. Discarded when the instance already reached a terminal
    /// state.
    pub fn complete_task(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        task_id: &TaskId,
        result: Value,
        fx: &mut SchedulerEffects,
    ) {
        if instance.is_terminal() {
            trace!(
                instance = %instance.id,
                task = %task_id,
                "Late completion discarded"
            );
            return;
        }
        {
            let Some(task) = instance.current_task_mut(task_id) else {
                return;
            };
            if task.status != TaskStatus::Running {
                return;
            }
            task.complete(result.clone());
        }
        if let Some(task_def) = definition.task(task_id) {
            merge_outputs(instance, task_def, &result);
        }
        instance.record_audit("task_completed", json!({ "task_id": task_id.as_str() }));
        fx.events.push(WorkflowEvent::task(
            instance.id.clone(),
            task_id.clone(),
            WorkflowEventKind::TaskCompleted,
        ));
        if let Some(task) = instance.take_current(task_id) {
            instance.completed_tasks.push(task);
        }
        self.examine_dependents(instance, definition, task_id, fx);
        self.check_completion(instance, fx);
    }

    /// Failure bookkeeping: record the error, then either arm a retry or
    /// exhaust the task and apply its error policy.
    pub fn fail_task(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        task_id: &TaskId,
        message: &str,
        fx: &mut SchedulerEffects,
    ) {
        if instance.is_terminal() {
            trace!(
                instance = %instance.id,
                task = %task_id,
                "Late failure discarded"
            );
            return;
        }
        let attempts = {
            let Some(task) = instance.current_task_mut(task_id) else {
                return;
            };
            if task.status != TaskStatus::Running {
                return;
            }
            task.attempts
        };
        let retry = definition
            .task(task_id)
            .map(|t| t.effective_retry())
            .unwrap_or_default();
        let policy = definition
            .task(task_id)
            .map(|t| t.on_error)
            .unwrap_or_default();

        instance.record_audit(
            "task_error",
            json!({ "task_id": task_id.as_str(), "attempt": attempts, "error": message }),
        );
        fx.events.push(WorkflowEvent::task(
            instance.id.clone(),
            task_id.clone(),
            WorkflowEventKind::TaskError,
        ));

        if attempts < retry.max_attempts {
            if let Some(task) = instance.current_task_mut(task_id) {
                task.schedule_retry(TaskFailure::new(message));
            }
            instance.record_audit(
                "task_retry_scheduled",
                json!({
                    "task_id": task_id.as_str(),
                    "attempt": attempts,
                    "next_attempt": attempts + 1,
                    "delay_ms": retry.delay_ms,
                }),
            );
            fx.events.push(WorkflowEvent::task(
                instance.id.clone(),
                task_id.clone(),
                WorkflowEventKind::TaskRetryScheduled,
            ));
            fx.retries.push(RetryTimer {
                task_id: task_id.clone(),
                delay: retry.delay(),
            });
            debug!(
                instance = %instance.id,
                task = %task_id,
                attempt = attempts,
                delay_ms = retry.delay_ms,
                "Task retry scheduled"
            );
            return;
        }

        if let Some(task) = instance.current_task_mut(task_id) {
            task.fail(TaskFailure::new(message));
        }
        instance.record_audit(
            "task_failed",
            json!({ "task_id": task_id.as_str(), "attempts": attempts, "error": message }),
        );
        fx.events.push(WorkflowEvent::task(
            instance.id.clone(),
            task_id.clone(),
            WorkflowEventKind::TaskFailed,
        ));
        if let Some(task) = instance.take_current(task_id) {
            instance.failed_tasks.push(task);
        }

        match policy {
            ErrorPolicy::Continue => {
                debug!(
                    instance = %instance.id,
                    task = %task_id,
                    "Continuing past failed task"
                );
                self.check_completion(instance, fx);
            }
            ErrorPolicy::FailWorkflow => {
                instance.fail(task_id, message);
                fx.events.push(WorkflowEvent::workflow(
                    instance.id.clone(),
                    WorkflowEventKind::WorkflowFailed,
                ));
                warn!(
                    instance = %instance.id,
                    task = %task_id,
                    error = message,
                    "Workflow instance failed"
                );
            }
        }
    }

    /// Retry timer fired. The running check and the re-queue happen in the
    /// same locked section, so a pause or cancel that landed while the timer
    /// slept silently drops the retry.
    pub fn requeue_task(
        &self,
        instance: &mut WorkflowInstance,
        task_id: &TaskId,
        fx: &mut SchedulerEffects,
    ) {
        if !instance.is_running() {
            debug!(
                instance = %instance.id,
                task = %task_id,
                status = %instance.status,
                "Retry dropped, instance not running"
            );
            return;
        }
        let Some(task) = instance.current_task_mut(task_id) else {
            return;
        };
        if task.status != TaskStatus::Retry {
            return;
        }
        task.requeue();
        fx.dispatches.push(task_id.clone());
    }

    /// Dispatch requests for every queued task, used at resume.
    pub fn collect_queued(&self, instance: &WorkflowInstance, fx: &mut SchedulerEffects) {
        for task in &instance.current_tasks {
            if task.status == TaskStatus::Queued {
                fx.dispatches.push(task.id.clone());
            }
        }
    }

    /// Mark every current task cancelled, auditing and emitting per task.
    pub fn cancel_tasks(&self, instance: &mut WorkflowInstance, fx: &mut SchedulerEffects) {
        let ids: Vec<TaskId> = instance.current_tasks.iter().map(|t| t.id.clone()).collect();
        for task_id in ids {
            if let Some(task) = instance.current_task_mut(&task_id) {
                task.cancel();
            }
            instance.record_audit("task_cancelled", json!({ "task_id": task_id.as_str() }));
            fx.events.push(WorkflowEvent::task(
                instance.id.clone(),
                task_id,
                WorkflowEventKind::TaskCancelled,
            ));
        }
    }

    /// Level-triggered completion: a running instance with nothing current is
    /// done. Runs after every completion cascade and at resume.
    pub fn check_completion(&self, instance: &mut WorkflowInstance, fx: &mut SchedulerEffects) {
        if instance.is_running() && instance.current_tasks.is_empty() {
            instance.complete();
            fx.events.push(WorkflowEvent::workflow(
                instance.id.clone(),
                WorkflowEventKind::WorkflowCompleted,
            ));
            info!(instance = %instance.id, "Workflow instance completed");
        }
    }
}

/// Resolve each output-map entry against the result and merge it into the
/// data bag, overwriting existing keys. Unresolvable paths are skipped.
fn merge_outputs(instance: &mut WorkflowInstance, task: &TaskDefinition, result: &Value) {
    for (key, path) in &task.output_map {
        match resolve_path(result, path) {
            Some(value) => {
                instance.data.insert(key.clone(), value.clone());
            }
            None => debug!(
                instance = %instance.id,
                task = %task.id,
                key = %key,
                path = %path,
                "Output path missing from task result"
            ),
        }
    }
}
