//! # Docflow Types
//!
//! Domain types for docflow document-processing pipelines.
//!
//! ## Key Concepts
//!
//! - **WorkflowDefinition**: a reusable pipeline template — typed tasks,
//!   dependency edges, optional data-bag conditions, retry and error policy.
//!   Validated once, then shared read-only across instances.
//! - **WorkflowInstance**: one execution of a definition — lifecycle status,
//!   the three task partitions (current / completed / failed), the shared
//!   data bag, and an append-only audit log.
//! - **TaskInstance**: the runtime record of a single task, reused across
//!   retries so attempt counts survive.
//! - **WorkflowEvent**: a lifecycle notification published on the engine's
//!   broadcast stream.
//!
//! ## Design Principles
//!
//! - Types carry no engine logic; transitions live in `docflow-engine`.
//! - Everything serializes with serde so instances and audit logs can be
//!   rendered or exported as JSON.
//! - Ids are string-backed newtypes: definition and instance ids are random
//!   v4 uuids, task ids are author-chosen and stable.

#![deny(unsafe_code)]

mod definition;
mod errors;
mod event;
mod instance;

pub use definition::{
    ErrorPolicy, RetryStrategy, TaskDefinition, TaskId, TaskKind, WorkflowDefinition,
    WorkflowDefinitionId,
};
pub use errors::{WorkflowError, WorkflowResult};
pub use event::{WorkflowEvent, WorkflowEventKind};
pub use instance::{
    AuditEntry, TaskFailure, TaskInstance, TaskStatus, WorkflowInstance, WorkflowInstanceId,
    WorkflowStatus,
};
