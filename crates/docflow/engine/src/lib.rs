//! # Docflow Engine
//!
//! In-process orchestration engine for multi-step document pipelines.
//!
//! ## Overview
//!
//! A pipeline is declared once as a [`WorkflowDefinition`](docflow_types::WorkflowDefinition)
//! (a dependency graph of tasks) and executed many times as workflow
//! instances. The engine queues tasks as their dependencies complete, gates
//! them on data-bag conditions, retries failures per task policy, and
//! records every step in the instance's audit log.
//!
//! ## Architecture
//!
//! [`WorkflowOrchestrator`] is the entry point. It composes:
//!
//! - [`DefinitionRegistry`] — validated, immutable workflow definitions
//! - [`InstanceStore`] — running instances behind one async read/write lock
//! - [`HandlerRegistry`] — one [`TaskHandler`] per task kind
//! - [`EventEmitter`] — broadcast stream of [`WorkflowEvent`](docflow_types::WorkflowEvent)s
//! - [`ConditionEvaluator`] — the condition mini-language for task gating
//!
//! All bookkeeping for an instance happens in synchronous sections under the
//! store's write lock, so a task completion and the queuing of its dependents
//! are one atomic step. Handlers alone run outside the lock, concurrently.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docflow_engine::{simulated_handlers, WorkflowOrchestrator};
//! use docflow_types::{TaskDefinition, TaskKind, WorkflowDefinition, WorkflowEventKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WorkflowOrchestrator::new();
//!     for handler in simulated_handlers() {
//!         engine.register_handler(handler).await;
//!     }
//!
//!     let definition = WorkflowDefinition::new("intake")
//!         .with_task(TaskDefinition::new("extract", TaskKind::DocumentProcessing))
//!         .with_task(
//!             TaskDefinition::new("notify", TaskKind::Notification)
//!                 .with_dependency("extract"),
//!         );
//!     let definition_id = engine.register_workflow(definition).await?;
//!
//!     let mut events = engine.subscribe();
//!     let instance_id = engine
//!         .start_workflow(&definition_id, serde_json::Map::new())
//!         .await?;
//!
//!     loop {
//!         let event = tokio::time::timeout(
//!             std::time::Duration::from_secs(5),
//!             events.recv(),
//!         )
//!         .await??;
//!         if event.instance_id == instance_id
//!             && event.kind == WorkflowEventKind::WorkflowCompleted
//!         {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

mod condition;
mod definition_registry;
mod emitter;
mod handler;
mod instance_store;
mod orchestrator;
mod scheduler;
mod simulated;

// Re-export main types for convenience
pub use condition::{ConditionEvaluator, ConditionVerdict};
pub use definition_registry::DefinitionRegistry;
pub use emitter::{EventEmitter, DEFAULT_EVENT_CAPACITY};
pub use handler::{HandlerRegistry, TaskContext, TaskExecutionError, TaskHandler};
pub use instance_store::InstanceStore;
pub use orchestrator::{OrchestratorConfig, WorkflowOrchestrator};
pub use simulated::{
    simulated_handlers, SimulatedApiClient, SimulatedDocumentProcessor, SimulatedNotifier,
    SimulatedTransformer,
};
