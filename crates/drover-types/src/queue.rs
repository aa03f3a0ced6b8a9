//! Merge-queue domain types.
//!
//! A queue entry is a pending changeset associated with one underlying work
//! item; blocking relationships between work items constrain the order in
//! which entries may merge. Reorder and batch checks report structured
//! results rather than errors -- a blocked move is an expected user-facing
//! condition.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::Relation;

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

/// Lifecycle state of a queue entry. `Merged` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Queued,
    Merging,
    Merged,
}

/// A pending changeset awaiting merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry ID.
    pub id: Uuid,
    /// The work item whose blocking relationships order this entry.
    pub work_item_id: Uuid,
    /// Current lifecycle state.
    pub state: MergeState,
}

/// A blocking relationship between two work items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRelation {
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub relation: Relation,
}

// ---------------------------------------------------------------------------
// Validation results
// ---------------------------------------------------------------------------

/// Result of simulating a queue reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderCheck {
    /// Whether the move respects all blocking relationships.
    pub valid: bool,
    /// Entries that must merge before the moved entry, in current-order
    /// position. Empty when `valid`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<Uuid>,
}

impl ReorderCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            blocked_by: Vec::new(),
        }
    }

    pub fn blocked(blocked_by: Vec<Uuid>) -> Self {
        Self {
            valid: false,
            blocked_by,
        }
    }
}

/// Result of validating a batch of queue entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchValidation {
    /// True when no errors were accumulated.
    pub valid: bool,
    /// Every problem found, not just the first.
    pub errors: Vec<String>,
    /// Dependency-respecting order over the known entries. Untrustworthy
    /// when `has_dependency_violations` is set.
    pub dependency_order: Vec<Uuid>,
    /// Set when the entries' blocking relationships contain a cycle.
    pub has_dependency_violations: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
