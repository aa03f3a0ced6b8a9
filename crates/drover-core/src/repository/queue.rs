//! Merge-queue storage ports.
//!
//! `QueueStore` maps queue entries to their underlying work items;
//! `RelationStore` answers blocking-relationship queries between work
//! items. Both are read-only from the validator's point of view.

use drover_types::error::StoreError;
use drover_types::queue::{QueueEntry, WorkItemRelation};
use uuid::Uuid;

/// Storage port for queue entries.
pub trait QueueStore: Send + Sync {
    /// Look up a queue entry by ID.
    fn entry(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<QueueEntry>, StoreError>> + Send;
}

/// Storage port for work-item blocking relationships.
pub trait RelationStore: Send + Sync {
    /// Relations where both endpoints are in `work_item_ids`, restricted to
    /// the blocking kinds (`blocks`, `depends-on`).
    fn relations_between(
        &self,
        work_item_ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<Vec<WorkItemRelation>, StoreError>> + Send;
}
