//! Registry of validated workflow definitions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use docflow_types::{WorkflowDefinition, WorkflowDefinitionId, WorkflowError, WorkflowResult};

/// Validate-on-register store of workflow definitions.
///
/// Definitions that pass [`WorkflowDefinition::validate`] are stored behind
/// an `Arc` and shared read-only with every instance started from them.
/// There is no removal: a registered definition lives for the process.
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<WorkflowDefinitionId, Arc<WorkflowDefinition>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and store a definition, returning its id.
    pub async fn register(
        &self,
        definition: WorkflowDefinition,
    ) -> WorkflowResult<WorkflowDefinitionId> {
        definition.validate()?;

        let id = definition.id.clone();
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&id) {
            return Err(WorkflowError::Validation(format!(
                "workflow definition '{}' already registered",
                id
            )));
        }

        info!(
            definition = %id,
            workflow = %definition.name,
            tasks = definition.task_count(),
            "Workflow definition registered"
        );
        definitions.insert(id.clone(), Arc::new(definition));
        Ok(id)
    }

    pub async fn get(&self, id: &WorkflowDefinitionId) -> WorkflowResult<Arc<WorkflowDefinition>> {
        self.definitions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::DefinitionNotFound(id.clone()))
    }

    /// All registered definitions, in no particular order
    pub async fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.definitions.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: &WorkflowDefinitionId) -> bool {
        self.definitions.read().await.contains_key(id)
    }

    pub async fn count(&self) -> usize {
        self.definitions.read().await.len()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
