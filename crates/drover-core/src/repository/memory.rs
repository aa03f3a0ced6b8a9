//! In-memory store implementations.
//!
//! DashMap-backed defaults for the execution registry and the queue/relation
//! lookups. These are the reference implementations the core runs on; they
//! double as test fakes.

use dashmap::DashMap;
use uuid::Uuid;

use drover_types::error::StoreError;
use drover_types::graph::Relation;
use drover_types::queue::{QueueEntry, WorkItemRelation};
use drover_types::workflow::WorkflowExecution;

use super::execution::ExecutionStore;
use super::queue::{QueueStore, RelationStore};

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

/// In-memory execution registry keyed by execution ID.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: DashMap<String, WorkflowExecution>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered executions.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.executions.get(execution_id).map(|e| e.value().clone()))
    }

    async fn save(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        self.executions
            .insert(execution.execution_id.clone(), execution.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

/// In-memory queue entry store.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    entries: DashMap<Uuid, QueueEntry>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: QueueEntry) {
        self.entries.insert(entry.id, entry);
    }
}

impl QueueStore for InMemoryQueueStore {
    async fn entry(&self, id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Work-item relations
// ---------------------------------------------------------------------------

/// In-memory work-item relationship store.
#[derive(Debug, Default)]
pub struct InMemoryRelationStore {
    relations: std::sync::Mutex<Vec<WorkItemRelation>>,
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, from_id: Uuid, to_id: Uuid, relation: Relation) {
        let mut relations = self.relations.lock().unwrap_or_else(|e| e.into_inner());
        relations.push(WorkItemRelation {
            from_id,
            to_id,
            relation,
        });
    }
}

impl RelationStore for InMemoryRelationStore {
    async fn relations_between(
        &self,
        work_item_ids: &[Uuid],
    ) -> Result<Vec<WorkItemRelation>, StoreError> {
        let relations = self.relations.lock().unwrap_or_else(|e| e.into_inner());
        Ok(relations
            .iter()
            .filter(|r| work_item_ids.contains(&r.from_id) && work_item_ids.contains(&r.to_id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drover_types::queue::MergeState;
    use drover_types::workflow::ExecutionStatus;
    use std::collections::HashMap;

    fn sample_execution(id: &str) -> WorkflowExecution {
        WorkflowExecution {
            execution_id: id.to_string(),
            workflow_id: "wf".to_string(),
            status: ExecutionStatus::Running,
            context: HashMap::new(),
            step_results: Vec::new(),
            current_step_index: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_execution_store_roundtrip() {
        let store = InMemoryExecutionStore::new();
        assert!(store.get("exec-1").await.unwrap().is_none());

        store.save(&sample_execution("exec-1")).await.unwrap();
        let loaded = store.get("exec-1").await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, "exec-1");
        assert_eq!(store.len(), 1);

        // Save is an upsert
        let mut updated = sample_execution("exec-1");
        updated.status = ExecutionStatus::Completed;
        store.save(&updated).await.unwrap();
        assert_eq!(
            store.get("exec-1").await.unwrap().unwrap().status,
            ExecutionStatus::Completed
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_store_lookup() {
        let store = InMemoryQueueStore::new();
        let entry = QueueEntry {
            id: Uuid::now_v7(),
            work_item_id: Uuid::now_v7(),
            state: MergeState::Queued,
        };
        store.insert(entry.clone());

        assert!(store.entry(entry.id).await.unwrap().is_some());
        assert!(store.entry(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relation_store_restricts_to_given_items() {
        let store = InMemoryRelationStore::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        store.insert(a, b, Relation::Blocks);
        store.insert(b, c, Relation::DependsOn);

        let relations = store.relations_between(&[a, b]).await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].from_id, a);

        let relations = store.relations_between(&[a, b, c]).await.unwrap();
        assert_eq!(relations.len(), 2);

        let relations = store.relations_between(&[c]).await.unwrap();
        assert!(relations.is_empty());
    }
}
