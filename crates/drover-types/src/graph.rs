//! Dependency relation vocabulary shared by workflow step sequencing and
//! merge-queue ordering.
//!
//! Both relation kinds normalize onto the same `blocked_by`/`blocks`
//! adjacency when a graph is built: `Blocks` means the target waits on the
//! source, `DependsOn` means the source waits on the target.

use serde::{Deserialize, Serialize};

/// Directed relation between two nodes (work items or workflow steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// `from` blocks `to`: `to` must wait until `from` is resolved.
    #[serde(rename = "blocks")]
    Blocks,
    /// `from` depends on `to`: `from` must wait until `to` is resolved.
    #[serde(rename = "depends-on")]
    DependsOn,
}

/// A single directed dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge<Id> {
    pub from: Id,
    pub to: Id,
    pub relation: Relation,
}

impl<Id> DependencyEdge<Id> {
    pub fn new(from: Id, to: Id, relation: Relation) -> Self {
        Self { from, to, relation }
    }
}
