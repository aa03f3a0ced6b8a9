//! Batch dependency validation for the merge queue.
//!
//! Reuses the dependency-graph primitive over a different substrate: each
//! queue entry resolves to a work item, blocking relationships between work
//! items become edges between entries (fanned out to every entry sharing a
//! work item on either side), and the same Kahn ordering that sequences
//! workflow steps orders the queue.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use drover_types::error::StoreError;
use drover_types::graph::DependencyEdge;
use drover_types::queue::{BatchValidation, MergeState, QueueEntry, ReorderCheck};

use crate::graph::{DependencyGraph, TopoSort};
use crate::repository::{QueueStore, RelationStore};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised by queue validation operations.
///
/// Dependency violations are NOT errors -- they come back as structured
/// results (`ReorderCheck`, `BatchValidation`) because a blocked move is an
/// expected, recoverable user-facing condition.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A storage port failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An operation referenced an entry the queue does not hold.
    #[error("unknown queue entry: {0}")]
    UnknownEntry(Uuid),

    /// A reorder targeted a position outside the current order.
    #[error("position {position} is out of bounds for a queue of {len}")]
    PositionOutOfBounds { position: usize, len: usize },
}

// ---------------------------------------------------------------------------
// BatchDependencyValidator
// ---------------------------------------------------------------------------

/// Validates merge-queue reorders and batches against work-item blocking
/// relationships.
pub struct BatchDependencyValidator<Q, R> {
    queue: Arc<Q>,
    relations: Arc<R>,
}

impl<Q, R> BatchDependencyValidator<Q, R>
where
    Q: QueueStore,
    R: RelationStore,
{
    pub fn new(queue: Arc<Q>, relations: Arc<R>) -> Self {
        Self { queue, relations }
    }

    /// Build the dependency graph over a set of queue entries.
    ///
    /// Entries that don't exist are silently excluded from the graph --
    /// `validate_entries` is the operation that reports them. Edges between
    /// work items fan out to every entry pair sharing those work items.
    pub async fn build_entry_graph(
        &self,
        entry_ids: &[Uuid],
    ) -> Result<DependencyGraph<Uuid>, QueueError> {
        let entries = self.known_entries(entry_ids).await?;
        Ok(self.graph_for(&entries).await?)
    }

    /// Dependency-respecting order over the entries.
    ///
    /// Delegates to the shared Kahn implementation; check `has_cycle`
    /// before trusting the order.
    pub async fn topological_order(
        &self,
        entry_ids: &[Uuid],
    ) -> Result<TopoSort<Uuid>, QueueError> {
        let graph = self.build_entry_graph(entry_ids).await?;
        Ok(graph.topological_sort(entry_ids))
    }

    /// Simulate moving `entry_id` to `new_position` within `current_order`.
    ///
    /// The move is invalid when it would place the entry before anything it
    /// is blocked by, directly or transitively. Blockers are reported in
    /// their current-order positions.
    pub async fn validate_reorder(
        &self,
        entry_id: Uuid,
        new_position: usize,
        current_order: &[Uuid],
    ) -> Result<ReorderCheck, QueueError> {
        if !current_order.contains(&entry_id) {
            return Err(QueueError::UnknownEntry(entry_id));
        }
        if new_position >= current_order.len() {
            return Err(QueueError::PositionOutOfBounds {
                position: new_position,
                len: current_order.len(),
            });
        }

        let graph = self.build_entry_graph(current_order).await?;
        let blockers = graph.transitive_blockers(&entry_id);
        if blockers.is_empty() {
            return Ok(ReorderCheck::ok());
        }

        // Simulate the move.
        let mut simulated: Vec<Uuid> =
            current_order.iter().copied().filter(|id| *id != entry_id).collect();
        simulated.insert(new_position.min(simulated.len()), entry_id);

        let moved_index = new_position.min(simulated.len() - 1);
        let violating: Vec<Uuid> = simulated
            .iter()
            .enumerate()
            .filter(|(index, id)| *index > moved_index && blockers.contains(*id))
            .map(|(_, id)| *id)
            .collect();

        if violating.is_empty() {
            Ok(ReorderCheck::ok())
        } else {
            // Report in current-order positions for stable presentation.
            let mut blocked_by = violating;
            blocked_by.sort_by_key(|id| current_order.iter().position(|c| c == id));
            Ok(ReorderCheck::blocked(blocked_by))
        }
    }

    /// Validate a batch of entries for merging.
    ///
    /// Accumulates every problem (empty input, unknown entries, already
    /// merged entries) instead of failing fast, and always attempts the
    /// dependency order over the entries that do exist. A cycle sets
    /// `has_dependency_violations` and contributes an error.
    pub async fn validate_entries(
        &self,
        entry_ids: &[Uuid],
    ) -> Result<BatchValidation, QueueError> {
        let mut errors = Vec::new();

        if entry_ids.is_empty() {
            errors.push("batch must contain at least one entry".to_string());
        }

        let mut known: Vec<QueueEntry> = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            match self.queue.entry(*id).await? {
                Some(entry) => {
                    if entry.state == MergeState::Merged {
                        errors.push(format!("entry {id} is already merged"));
                    }
                    known.push(entry);
                }
                None => errors.push(format!("entry {id} does not exist")),
            }
        }

        let known_ids: Vec<Uuid> = known.iter().map(|e| e.id).collect();
        let graph = self.graph_for(&known).await?;
        let sorted = graph.topological_sort(&known_ids);
        if sorted.has_cycle {
            errors.push("dependency cycle among batch entries".to_string());
        }

        Ok(BatchValidation {
            valid: errors.is_empty(),
            has_dependency_violations: sorted.has_cycle,
            dependency_order: sorted.order,
            errors,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn known_entries(&self, entry_ids: &[Uuid]) -> Result<Vec<QueueEntry>, QueueError> {
        let mut entries = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            if let Some(entry) = self.queue.entry(*id).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Graph over entries, with work-item edges fanned out to entries.
    async fn graph_for(
        &self,
        entries: &[QueueEntry],
    ) -> Result<DependencyGraph<Uuid>, StoreError> {
        let entry_ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();

        // Work item -> entries carrying it (several entries may share one).
        let mut by_work_item: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for entry in entries {
            by_work_item.entry(entry.work_item_id).or_default().push(entry.id);
        }

        let work_item_ids: Vec<Uuid> = by_work_item.keys().copied().collect();
        let relations = self.relations.relations_between(&work_item_ids).await?;

        let mut edges: Vec<DependencyEdge<Uuid>> = Vec::new();
        for relation in &relations {
            let (Some(from_entries), Some(to_entries)) = (
                by_work_item.get(&relation.from_id),
                by_work_item.get(&relation.to_id),
            ) else {
                continue;
            };
            for from in from_entries {
                for to in to_entries {
                    edges.push(DependencyEdge::new(*from, *to, relation.relation));
                }
            }
        }

        Ok(DependencyGraph::build(&entry_ids, &edges))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryQueueStore, InMemoryRelationStore};
    use drover_types::graph::Relation;
    use std::sync::Arc;

    struct Fixture {
        validator: BatchDependencyValidator<InMemoryQueueStore, InMemoryRelationStore>,
        queue: Arc<InMemoryQueueStore>,
        relations: Arc<InMemoryRelationStore>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(InMemoryQueueStore::new());
        let relations = Arc::new(InMemoryRelationStore::new());
        Fixture {
            validator: BatchDependencyValidator::new(Arc::clone(&queue), Arc::clone(&relations)),
            queue,
            relations,
        }
    }

    fn entry(fixture: &Fixture, state: MergeState) -> QueueEntry {
        let entry = QueueEntry {
            id: Uuid::now_v7(),
            work_item_id: Uuid::now_v7(),
            state,
        };
        fixture.queue.insert(entry.clone());
        entry
    }

    fn queued(fixture: &Fixture) -> QueueEntry {
        entry(fixture, MergeState::Queued)
    }

    // -----------------------------------------------------------------------
    // Graph construction
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_entry_graph_maps_work_item_relations() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        // A's work item blocks B's work item.
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);

        let graph = fx.validator.build_entry_graph(&[a.id, b.id]).await.unwrap();
        assert!(graph.links(&b.id).unwrap().blocked_by.contains(&a.id));
        assert!(graph.links(&a.id).unwrap().blocks.contains(&b.id));
    }

    #[tokio::test]
    async fn test_entry_graph_fans_out_shared_work_items() {
        let fx = fixture();
        let blocker = queued(&fx);
        // Two entries for the same work item, both blocked by `blocker`.
        let shared_item = Uuid::now_v7();
        let first = QueueEntry {
            id: Uuid::now_v7(),
            work_item_id: shared_item,
            state: MergeState::Queued,
        };
        let second = QueueEntry {
            id: Uuid::now_v7(),
            work_item_id: shared_item,
            state: MergeState::Queued,
        };
        fx.queue.insert(first.clone());
        fx.queue.insert(second.clone());
        fx.relations
            .insert(blocker.work_item_id, shared_item, Relation::Blocks);

        let graph = fx
            .validator
            .build_entry_graph(&[blocker.id, first.id, second.id])
            .await
            .unwrap();
        assert!(graph.links(&first.id).unwrap().blocked_by.contains(&blocker.id));
        assert!(graph.links(&second.id).unwrap().blocked_by.contains(&blocker.id));
        assert_eq!(graph.links(&blocker.id).unwrap().blocks.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Topological order
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_topological_order_respects_blocking() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        let c = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);
        // C depends on B: C waits on B.
        fx.relations
            .insert(c.work_item_id, b.work_item_id, Relation::DependsOn);

        // Present in "wrong" order; sort must put A before B before C.
        let sorted = fx
            .validator
            .topological_order(&[c.id, b.id, a.id])
            .await
            .unwrap();
        assert!(!sorted.has_cycle);
        assert_eq!(sorted.order, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn test_topological_order_reports_cycle() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);
        fx.relations
            .insert(b.work_item_id, a.work_item_id, Relation::Blocks);

        let input = [a.id, b.id];
        let sorted = fx.validator.topological_order(&input).await.unwrap();
        assert!(sorted.has_cycle);
        assert_eq!(sorted.order, input.to_vec(), "input order preserved on cycle");
    }

    // -----------------------------------------------------------------------
    // Scenario F: reorder validation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_reorder_before_blocker_is_rejected() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);

        let order = [a.id, b.id];
        // Moving B before A violates the blocking relation.
        let check = fx.validator.validate_reorder(b.id, 0, &order).await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.blocked_by, vec![a.id]);

        // Keeping B after A is fine.
        let check = fx.validator.validate_reorder(b.id, 1, &order).await.unwrap();
        assert!(check.valid);
        assert!(check.blocked_by.is_empty());
    }

    #[tokio::test]
    async fn test_reorder_detects_transitive_blockers() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        let c = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);
        fx.relations
            .insert(b.work_item_id, c.work_item_id, Relation::Blocks);

        let order = [a.id, b.id, c.id];
        // Moving C to the front puts it before both its direct blocker B and
        // its transitive blocker A.
        let check = fx.validator.validate_reorder(c.id, 0, &order).await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.blocked_by, vec![a.id, b.id]);

        // Moving C to the middle still violates B.
        let check = fx.validator.validate_reorder(c.id, 1, &order).await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.blocked_by, vec![b.id]);
    }

    #[tokio::test]
    async fn test_reorder_unrelated_entry_moves_freely() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        let free = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);

        let order = [a.id, b.id, free.id];
        for position in 0..order.len() {
            let check = fx
                .validator
                .validate_reorder(free.id, position, &order)
                .await
                .unwrap();
            assert!(check.valid, "unrelated entry must move to position {position}");
        }
    }

    #[tokio::test]
    async fn test_reorder_input_errors() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        let order = [a.id, b.id];

        let err = fx
            .validator
            .validate_reorder(Uuid::now_v7(), 0, &order)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownEntry(_)));

        let err = fx.validator.validate_reorder(a.id, 5, &order).await.unwrap_err();
        assert!(matches!(err, QueueError::PositionOutOfBounds { .. }));
    }

    // -----------------------------------------------------------------------
    // Batch validation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_validate_entries_accepts_clean_batch() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);

        let report = fx.validator.validate_entries(&[b.id, a.id]).await.unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert!(!report.has_dependency_violations);
        assert_eq!(report.dependency_order, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_validate_entries_rejects_empty_batch() {
        let fx = fixture();
        let report = fx.validator.validate_entries(&[]).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("at least one entry"));
    }

    #[tokio::test]
    async fn test_validate_entries_accumulates_all_errors() {
        let fx = fixture();
        let good = queued(&fx);
        let merged = entry(&fx, MergeState::Merged);
        let ghost = Uuid::now_v7();

        let report = fx
            .validator
            .validate_entries(&[good.id, merged.id, ghost])
            .await
            .unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2, "merged + missing, accumulated: {:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("already merged")));
        assert!(report.errors.iter().any(|e| e.contains("does not exist")));

        // The order is still computed over the entries that exist.
        assert_eq!(report.dependency_order.len(), 2);
        assert!(!report.has_dependency_violations);
    }

    #[tokio::test]
    async fn test_validate_entries_flags_cycle() {
        let fx = fixture();
        let a = queued(&fx);
        let b = queued(&fx);
        fx.relations
            .insert(a.work_item_id, b.work_item_id, Relation::Blocks);
        fx.relations
            .insert(b.work_item_id, a.work_item_id, Relation::Blocks);

        let report = fx.validator.validate_entries(&[a.id, b.id]).await.unwrap();
        assert!(!report.valid);
        assert!(report.has_dependency_violations);
        assert!(report.errors.iter().any(|e| e.contains("cycle")));
        // Input order comes back unchanged when no valid order exists.
        assert_eq!(report.dependency_order, vec![a.id, b.id]);
    }
}
