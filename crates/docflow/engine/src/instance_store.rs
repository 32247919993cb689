//! In-memory store of workflow instances.

use std::collections::HashMap;

use tokio::sync::RwLock;

use docflow_types::{WorkflowError, WorkflowInstance, WorkflowInstanceId, WorkflowResult};

/// Sole owner of workflow instance state.
///
/// Reads hand out cloned snapshots; mutation goes through [`update`], whose
/// closure runs synchronously under the write lock. Every scheduler
/// bookkeeping cascade executes inside one such closure, which serializes
/// transitions the way a single-threaded event loop would. Instances are
/// never deleted; terminal ones stay queryable.
///
/// [`update`]: InstanceStore::update
pub struct InstanceStore {
    instances: RwLock<HashMap<WorkflowInstanceId, WorkflowInstance>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, instance: WorkflowInstance) {
        self.instances
            .write()
            .await
            .insert(instance.id.clone(), instance);
    }

    /// Cloned snapshot of an instance
    pub async fn snapshot(&self, id: &WorkflowInstanceId) -> Option<WorkflowInstance> {
        self.instances.read().await.get(id).cloned()
    }

    /// Run a mutation atomically under the write lock.
    pub async fn update<F, R>(&self, id: &WorkflowInstanceId, f: F) -> WorkflowResult<R>
    where
        F: FnOnce(&mut WorkflowInstance) -> R,
    {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| WorkflowError::InstanceNotFound(id.clone()))?;
        Ok(f(instance))
    }

    pub async fn contains(&self, id: &WorkflowInstanceId) -> bool {
        self.instances.read().await.contains_key(id)
    }

    pub async fn count(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Ids of instances not yet in a terminal state
    pub async fn active_ids(&self) -> Vec<WorkflowInstanceId> {
        self.instances
            .read()
            .await
            .values()
            .filter(|i| !i.is_terminal())
            .map(|i| i.id.clone())
            .collect()
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}
