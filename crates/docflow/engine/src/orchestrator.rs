//! The orchestrator: public API and async execution shell.
//!
//! [`WorkflowOrchestrator`] composes the definition registry, instance store,
//! handler registry and event emitter. Lifecycle calls run a scheduler
//! section under the instance store's write lock; events are emitted before
//! the lock is released (stream order matches audit order), while dispatches
//! and retry timers are spawned afterwards. Handlers are awaited outside any
//! lock, so overlapping handler executions are the engine's only concurrency.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::definition_registry::DefinitionRegistry;
use crate::emitter::{EventEmitter, DEFAULT_EVENT_CAPACITY};
use crate::handler::{HandlerRegistry, TaskContext, TaskExecutionError, TaskHandler};
use crate::instance_store::InstanceStore;
use crate::scheduler::{RetryTimer, SchedulerEffects, TaskScheduler};
use docflow_types::{
    TaskId, WorkflowDefinition, WorkflowDefinitionId, WorkflowError, WorkflowEvent,
    WorkflowEventKind, WorkflowInstance, WorkflowInstanceId, WorkflowResult,
};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capacity of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// The workflow engine.
///
/// Cheap to clone; clones share the same registries, instances and event
/// stream. `start_workflow` is fire-and-forget: it returns the instance id
/// once the roots are queued, and callers observe progress by polling
/// [`get_instance`](Self::get_instance) or subscribing to events.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    definitions: Arc<DefinitionRegistry>,
    instances: Arc<InstanceStore>,
    handlers: HandlerRegistry,
    emitter: EventEmitter,
    scheduler: TaskScheduler,
}

impl WorkflowOrchestrator {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self {
            definitions: Arc::new(DefinitionRegistry::new()),
            instances: Arc::new(InstanceStore::new()),
            handlers: HandlerRegistry::new(),
            emitter: EventEmitter::new(config.event_capacity),
            scheduler: TaskScheduler::new(),
        }
    }

    // ---- definitions ----

    /// Validate and register a workflow definition.
    pub async fn register_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> WorkflowResult<WorkflowDefinitionId> {
        self.definitions.register(definition).await
    }

    pub async fn get_definition(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(id).await.ok()
    }

    pub async fn list_definitions(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.definitions.list().await
    }

    pub async fn definition_count(&self) -> usize {
        self.definitions.count().await
    }

    // ---- handlers & events ----

    /// Register the handler for its task kind, replacing any previous one.
    pub async fn register_handler(&self, handler: Arc<dyn TaskHandler>) {
        self.handlers.register(handler).await;
    }

    /// Subscribe to the event stream; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.emitter.subscribe()
    }

    // ---- lifecycle ----

    /// Create an instance of a registered definition and queue its root
    /// tasks. Execution proceeds in background tasks.
    pub async fn start_workflow(
        &self,
        definition_id: &WorkflowDefinitionId,
        initial_data: serde_json::Map<String, serde_json::Value>,
    ) -> WorkflowResult<WorkflowInstanceId> {
        let definition = self.definitions.get(definition_id).await?;
        let instance = WorkflowInstance::new(definition_id.clone(), initial_data);
        let instance_id = instance.id.clone();
        self.instances.insert(instance).await;

        let ((), fx) = self
            .transition(&instance_id, |instance, fx| {
                fx.events.push(WorkflowEvent::workflow(
                    instance.id.clone(),
                    WorkflowEventKind::WorkflowStarted,
                ));
                self.scheduler.queue_roots(instance, &definition, fx);
            })
            .await?;

        info!(
            instance = %instance_id,
            definition = %definition_id,
            workflow = %definition.name,
            "Workflow instance started"
        );
        self.followups(&definition, &instance_id, fx);
        Ok(instance_id)
    }

    /// Suspend dispatch. In-flight handlers run to completion and their
    /// bookkeeping still applies; nothing new starts until resume.
    pub async fn pause_instance(&self, id: &WorkflowInstanceId) -> WorkflowResult<()> {
        let (outcome, _fx) = self
            .transition(id, |instance, fx| {
                if !instance.is_running() {
                    return Err(WorkflowError::InvalidState {
                        operation: "pause",
                        expected: "running",
                        actual: instance.status,
                    });
                }
                instance.pause();
                fx.events.push(WorkflowEvent::workflow(
                    instance.id.clone(),
                    WorkflowEventKind::WorkflowPaused,
                ));
                Ok(())
            })
            .await?;
        outcome?;
        info!(instance = %id, "Workflow instance paused");
        Ok(())
    }

    /// Resume a paused instance: re-dispatch everything still queued, then
    /// check for completion in case the last task finished while paused.
    pub async fn resume_instance(&self, id: &WorkflowInstanceId) -> WorkflowResult<()> {
        let (outcome, fx) = self
            .transition(id, |instance, fx| {
                if !instance.is_paused() {
                    return Err(WorkflowError::InvalidState {
                        operation: "resume",
                        expected: "paused",
                        actual: instance.status,
                    });
                }
                instance.resume();
                fx.events.push(WorkflowEvent::workflow(
                    instance.id.clone(),
                    WorkflowEventKind::WorkflowResumed,
                ));
                self.scheduler.collect_queued(instance, fx);
                self.scheduler.check_completion(instance, fx);
                Ok(instance.definition_id.clone())
            })
            .await?;
        let definition_id = outcome?;
        let definition = self.definitions.get(&definition_id).await?;
        info!(
            instance = %id,
            dispatches = fx.dispatches.len(),
            "Workflow instance resumed"
        );
        self.followups(&definition, id, fx);
        Ok(())
    }

    /// Cancel a non-terminal instance: every current task is marked
    /// cancelled and no further processing occurs. In-flight handler results
    /// are discarded when their callbacks observe the terminal instance.
    pub async fn cancel_instance(&self, id: &WorkflowInstanceId) -> WorkflowResult<()> {
        let (outcome, _fx) = self
            .transition(id, |instance, fx| {
                if instance.is_terminal() {
                    return Err(WorkflowError::InvalidState {
                        operation: "cancel",
                        expected: "running or paused",
                        actual: instance.status,
                    });
                }
                self.scheduler.cancel_tasks(instance, fx);
                instance.cancel();
                fx.events.push(WorkflowEvent::workflow(
                    instance.id.clone(),
                    WorkflowEventKind::WorkflowCancelled,
                ));
                Ok(())
            })
            .await?;
        outcome?;
        info!(instance = %id, "Workflow instance cancelled");
        Ok(())
    }

    // ---- queries ----

    /// Read-only snapshot of an instance.
    pub async fn get_instance(&self, id: &WorkflowInstanceId) -> Option<WorkflowInstance> {
        self.instances.snapshot(id).await
    }

    /// Ids of instances not yet terminal
    pub async fn active_instances(&self) -> Vec<WorkflowInstanceId> {
        self.instances.active_ids().await
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.count().await
    }

    // ---- internals ----

    /// Run one scheduler section under the store's write lock, emitting its
    /// events before the lock is released. Dispatches and retry timers are
    /// returned for [`followups`](Self::followups).
    async fn transition<F, R>(
        &self,
        id: &WorkflowInstanceId,
        f: F,
    ) -> WorkflowResult<(R, SchedulerEffects)>
    where
        F: FnOnce(&mut WorkflowInstance, &mut SchedulerEffects) -> R,
    {
        self.instances
            .update(id, |instance| {
                let mut fx = SchedulerEffects::new();
                let outcome = f(instance, &mut fx);
                self.emitter.emit_all(std::mem::take(&mut fx.events));
                (outcome, fx)
            })
            .await
    }

    /// Spawn the dispatches and retry timers a transition produced.
    fn followups(
        &self,
        definition: &Arc<WorkflowDefinition>,
        instance_id: &WorkflowInstanceId,
        fx: SchedulerEffects,
    ) {
        for task_id in fx.dispatches {
            self.spawn_dispatch(definition.clone(), instance_id.clone(), task_id);
        }
        for timer in fx.retries {
            self.spawn_retry(definition.clone(), instance_id.clone(), timer);
        }
    }

    fn spawn_dispatch(
        &self,
        definition: Arc<WorkflowDefinition>,
        instance_id: WorkflowInstanceId,
        task_id: TaskId,
    ) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_task(definition, instance_id, task_id).await;
        });
    }

    fn spawn_retry(
        &self,
        definition: Arc<WorkflowDefinition>,
        instance_id: WorkflowInstanceId,
        timer: RetryTimer,
    ) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timer.delay).await;
            let requeued = engine
                .transition(&instance_id, |instance, fx| {
                    engine.scheduler.requeue_task(instance, &timer.task_id, fx)
                })
                .await;
            if let Ok(((), fx)) = requeued {
                engine.followups(&definition, &instance_id, fx);
            }
        });
    }

    /// One task attempt: begin under the lock, await the handler outside it,
    /// then apply completion or failure bookkeeping under the lock again.
    async fn run_task(
        &self,
        definition: Arc<WorkflowDefinition>,
        instance_id: WorkflowInstanceId,
        task_id: TaskId,
    ) {
        let begun = self
            .transition(&instance_id, |instance, fx| {
                self.scheduler.begin_task(instance, &task_id, fx)
            })
            .await;
        let Ok((snapshot, _fx)) = begun else {
            return;
        };
        // None: the dispatch was dropped (instance paused or terminal, or
        // the task no longer queued)
        let Some(data) = snapshot else {
            return;
        };
        let Some(task_def) = definition.task(&task_id) else {
            return;
        };

        let context = TaskContext::new(instance_id.clone(), task_def.clone(), data);
        let outcome = match self.handlers.get(task_def.kind).await {
            Some(handler) => handler.execute(&context).await,
            None => Err(TaskExecutionError::HandlerMissing(task_def.kind)),
        };

        let finished = match outcome {
            Ok(result) => {
                debug!(instance = %instance_id, task = %task_id, "Task completed");
                self.transition(&instance_id, |instance, fx| {
                    self.scheduler
                        .complete_task(instance, &definition, &task_id, result, fx)
                })
                .await
            }
            Err(error) => {
                warn!(
                    instance = %instance_id,
                    task = %task_id,
                    %error,
                    "Task handler failed"
                );
                let message = error.to_string();
                self.transition(&instance_id, |instance, fx| {
                    self.scheduler
                        .fail_task(instance, &definition, &task_id, &message, fx)
                })
                .await
            }
        };
        if let Ok(((), fx)) = finished {
            self.followups(&definition, &instance_id, fx);
        }
    }
}

impl Default for WorkflowOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::simulated_handlers;
    use async_trait::async_trait;
    use docflow_types::{TaskDefinition, TaskKind, TaskStatus, WorkflowStatus};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Handler that never returns, keeping its task in flight.
    struct PendingHandler;

    #[async_trait]
    impl TaskHandler for PendingHandler {
        fn kind(&self) -> TaskKind {
            TaskKind::DocumentProcessing
        }

        async fn execute(&self, _ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
            std::future::pending().await
        }
    }

    fn single_task_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("single")
            .with_task(TaskDefinition::new("work", TaskKind::DocumentProcessing))
    }

    async fn wait_until<F>(
        engine: &WorkflowOrchestrator,
        id: &WorkflowInstanceId,
        predicate: F,
    ) -> WorkflowInstance
    where
        F: Fn(&WorkflowInstance) -> bool,
    {
        for _ in 0..200 {
            if let Some(instance) = engine.get_instance(id).await {
                if predicate(&instance) {
                    return instance;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("instance never reached expected state");
    }

    #[tokio::test]
    async fn test_register_workflow_and_lookup() {
        let engine = WorkflowOrchestrator::new();
        let id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();

        assert!(engine.get_definition(&id).await.is_some());
        assert_eq!(engine.definition_count().await, 1);
        assert_eq!(engine.list_definitions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_definition() {
        let engine = WorkflowOrchestrator::new();
        let err = engine
            .register_workflow(WorkflowDefinition::new("empty"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn test_start_unknown_definition() {
        let engine = WorkflowOrchestrator::new();
        let err = engine
            .start_workflow(&WorkflowDefinitionId::generate(), serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DefinitionNotFound(_)));
    }

    #[tokio::test]
    async fn test_start_creates_running_instance() {
        let engine = WorkflowOrchestrator::new();
        engine.register_handler(Arc::new(PendingHandler)).await;
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();

        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();

        let instance = engine.get_instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Running);
        assert_eq!(instance.current_tasks.len(), 1);
        assert_eq!(engine.instance_count().await, 1);
        assert_eq!(engine.active_instances().await, vec![instance_id]);
    }

    #[tokio::test]
    async fn test_get_instance_unknown_is_none() {
        let engine = WorkflowOrchestrator::new();
        assert!(engine
            .get_instance(&WorkflowInstanceId::generate())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_pause_requires_running() {
        let engine = WorkflowOrchestrator::new();
        engine.register_handler(Arc::new(PendingHandler)).await;
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();
        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();

        engine.pause_instance(&instance_id).await.unwrap();
        let instance = engine.get_instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Paused);

        let err = engine.pause_instance(&instance_id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                operation: "pause",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_paused() {
        let engine = WorkflowOrchestrator::new();
        engine.register_handler(Arc::new(PendingHandler)).await;
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();
        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();

        let err = engine.resume_instance(&instance_id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                operation: "resume",
                ..
            }
        ));

        engine.pause_instance(&instance_id).await.unwrap();
        engine.resume_instance(&instance_id).await.unwrap();
        let instance = engine.get_instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_cancel_marks_current_tasks() {
        let engine = WorkflowOrchestrator::new();
        engine.register_handler(Arc::new(PendingHandler)).await;
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();
        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();
        wait_until(&engine, &instance_id, |i| {
            i.current_task(&TaskId::new("work"))
                .map(|t| t.status == TaskStatus::Running)
                .unwrap_or(false)
        })
        .await;

        engine.cancel_instance(&instance_id).await.unwrap();

        let instance = engine.get_instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Cancelled);
        assert!(instance.ended_at.is_some());
        assert_eq!(
            instance.current_task(&TaskId::new("work")).unwrap().status,
            TaskStatus::Cancelled
        );
        assert!(engine.active_instances().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_terminal_instance_rejected() {
        let engine = WorkflowOrchestrator::new();
        engine.register_handler(Arc::new(PendingHandler)).await;
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();
        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();

        engine.cancel_instance(&instance_id).await.unwrap();
        let err = engine.cancel_instance(&instance_id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                operation: "cancel",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_subscribe_receives_workflow_started() {
        let engine = WorkflowOrchestrator::new();
        for handler in simulated_handlers() {
            engine.register_handler(handler).await;
        }
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();

        let mut events = engine.subscribe();
        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, WorkflowEventKind::WorkflowStarted);
        assert_eq!(event.instance_id, instance_id);
    }

    #[tokio::test]
    async fn test_simulated_handlers_complete_single_task() {
        let engine = WorkflowOrchestrator::new();
        for handler in simulated_handlers() {
            engine.register_handler(handler).await;
        }
        let definition_id = engine
            .register_workflow(single_task_definition())
            .await
            .unwrap();
        let instance_id = engine
            .start_workflow(&definition_id, serde_json::Map::new())
            .await
            .unwrap();

        let instance = wait_until(&engine, &instance_id, |i| i.is_terminal()).await;
        assert_eq!(instance.status, WorkflowStatus::Completed);
        assert_eq!(instance.completed_tasks.len(), 1);
    }
}
