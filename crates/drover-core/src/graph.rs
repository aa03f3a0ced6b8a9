//! Dependency graph construction, cycle detection, and deterministic
//! topological ordering.
//!
//! The same primitive orders workflow steps and merge-queue entries. Both
//! `blocks` and `depends-on` edges normalize onto a `blocked_by`/`blocks`
//! adjacency; ordering is Kahn's algorithm with a FIFO queue seeded in
//! input order, so ties between ready nodes always resolve to the caller's
//! declaration order rather than hash-map iteration order.
//!
//! A cycle is a reported value, not an error: it is an expected validation
//! outcome for malformed input. When one is found the original input order
//! is returned unchanged and `has_cycle` is set -- callers must check the
//! flag before trusting the order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use drover_types::graph::{DependencyEdge, Relation};

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Adjacency for a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLinks<Id: Eq + Hash> {
    /// Nodes this node waits on.
    pub blocked_by: HashSet<Id>,
    /// Nodes waiting on this node.
    pub blocks: HashSet<Id>,
}

impl<Id: Eq + Hash> Default for NodeLinks<Id> {
    fn default() -> Self {
        Self {
            blocked_by: HashSet::new(),
            blocks: HashSet::new(),
        }
    }
}

/// Result of a topological sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoSort<Id> {
    /// Dependency-respecting order, or the unchanged input order when a
    /// cycle was found.
    pub order: Vec<Id>,
    /// True when no valid order exists.
    pub has_cycle: bool,
}

/// Directed dependency graph over an explicit node set.
#[derive(Debug, Clone)]
pub struct DependencyGraph<Id: Eq + Hash> {
    nodes: HashMap<Id, NodeLinks<Id>>,
}

impl<Id: Clone + Eq + Hash> DependencyGraph<Id> {
    /// Build the adjacency for `ids` from directed relation edges.
    ///
    /// Edges referencing ids outside the set are ignored: the graph is
    /// always restricted to the nodes under consideration.
    pub fn build(ids: &[Id], edges: &[DependencyEdge<Id>]) -> Self {
        let mut nodes: HashMap<Id, NodeLinks<Id>> = ids
            .iter()
            .map(|id| (id.clone(), NodeLinks::default()))
            .collect();

        for edge in edges {
            if !nodes.contains_key(&edge.from) || !nodes.contains_key(&edge.to) {
                continue;
            }
            // Normalize both relations onto the same adjacency: `waiter`
            // is blocked by `blocker`.
            let (blocker, waiter) = match edge.relation {
                Relation::Blocks => (&edge.from, &edge.to),
                Relation::DependsOn => (&edge.to, &edge.from),
            };
            if blocker == waiter {
                continue; // self-edges carry no ordering information
            }
            if let Some(links) = nodes.get_mut(waiter) {
                links.blocked_by.insert(blocker.clone());
            }
            if let Some(links) = nodes.get_mut(blocker) {
                links.blocks.insert(waiter.clone());
            }
        }

        Self { nodes }
    }

    /// Adjacency for one node, if it is in the graph.
    pub fn links(&self, id: &Id) -> Option<&NodeLinks<Id>> {
        self.nodes.get(id)
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn's algorithm over the subset `ids`.
    ///
    /// In-degree counts only `blocked_by` members inside `ids`. The ready
    /// queue is seeded in input order and drained FIFO, which makes the
    /// result deterministic for a given input slice. On a cycle, returns
    /// the input order unchanged with `has_cycle = true`.
    pub fn topological_sort(&self, ids: &[Id]) -> TopoSort<Id> {
        let in_set: HashSet<&Id> = ids.iter().collect();

        let mut in_degree: HashMap<&Id, usize> = HashMap::with_capacity(ids.len());
        for id in ids {
            let degree = self
                .nodes
                .get(id)
                .map(|links| {
                    links
                        .blocked_by
                        .iter()
                        .filter(|dep| in_set.contains(dep))
                        .count()
                })
                .unwrap_or(0);
            in_degree.insert(id, degree);
        }

        let mut queue: VecDeque<&Id> = ids
            .iter()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut order: Vec<Id> = Vec::with_capacity(ids.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            let Some(links) = self.nodes.get(id) else {
                continue;
            };
            // Release dependents in input order so same-wave ties stay
            // deterministic.
            for dependent in ids {
                if !links.blocks.contains(dependent) {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != ids.len() {
            return TopoSort {
                order: ids.to_vec(),
                has_cycle: true,
            };
        }

        TopoSort {
            order,
            has_cycle: false,
        }
    }

    /// Transitive closure of `blocked_by` for one node.
    ///
    /// Returns every node that must resolve before `id`, directly or through
    /// intermediate blockers. Unknown ids yield an empty set.
    pub fn transitive_blockers(&self, id: &Id) -> HashSet<Id> {
        let mut visited: HashSet<Id> = HashSet::new();
        let mut stack: Vec<&Id> = vec![id];

        while let Some(current) = stack.pop() {
            if let Some(links) = self.nodes.get(current) {
                for blocker in &links.blocked_by {
                    if visited.insert(blocker.clone()) {
                        stack.push(blocker);
                    }
                }
            }
        }

        visited
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn edge(from: &str, to: &str, relation: Relation) -> DependencyEdge<String> {
        DependencyEdge::new(from.to_string(), to.to_string(), relation)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn test_blocks_and_depends_on_normalize_identically() {
        let nodes = ids(&["a", "b"]);

        // "a blocks b" and "b depends-on a" describe the same constraint.
        let via_blocks =
            DependencyGraph::build(&nodes, &[edge("a", "b", Relation::Blocks)]);
        let via_depends =
            DependencyGraph::build(&nodes, &[edge("b", "a", Relation::DependsOn)]);

        for graph in [&via_blocks, &via_depends] {
            let b = graph.links(&"b".to_string()).unwrap();
            assert!(b.blocked_by.contains("a"));
            let a = graph.links(&"a".to_string()).unwrap();
            assert!(a.blocks.contains("b"));
        }
    }

    #[test]
    fn test_out_of_set_edges_ignored() {
        let nodes = ids(&["a", "b"]);
        let graph = DependencyGraph::build(
            &nodes,
            &[
                edge("a", "ghost", Relation::Blocks),
                edge("ghost", "b", Relation::Blocks),
            ],
        );
        assert!(graph.links(&"a".to_string()).unwrap().blocks.is_empty());
        assert!(graph.links(&"b".to_string()).unwrap().blocked_by.is_empty());
    }

    #[test]
    fn test_self_edges_ignored() {
        let nodes = ids(&["a"]);
        let graph = DependencyGraph::build(&nodes, &[edge("a", "a", Relation::Blocks)]);
        assert!(graph.links(&"a".to_string()).unwrap().blocked_by.is_empty());

        let sorted = graph.topological_sort(&nodes);
        assert!(!sorted.has_cycle);
    }

    // -----------------------------------------------------------------------
    // Topological sort
    // -----------------------------------------------------------------------

    #[test]
    fn test_linear_chain_order() {
        // a -> b -> c (a blocks b blocks c)
        let nodes = ids(&["c", "b", "a"]);
        let graph = DependencyGraph::build(
            &nodes,
            &[
                edge("a", "b", Relation::Blocks),
                edge("b", "c", Relation::Blocks),
            ],
        );
        let sorted = graph.topological_sort(&nodes);
        assert!(!sorted.has_cycle);
        assert_eq!(sorted.order, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_ties_resolve_to_input_order() {
        // No edges at all: order must be exactly the input order.
        let nodes = ids(&["zeta", "alpha", "mid"]);
        let graph = DependencyGraph::build(&nodes, &[]);
        let sorted = graph.topological_sort(&nodes);
        assert!(!sorted.has_cycle);
        assert_eq!(sorted.order, nodes);
    }

    #[test]
    fn test_diamond_keeps_input_order_within_wave() {
        //     a
        //    / \
        //   b   c      (declared c before b)
        //    \ /
        //     d
        let nodes = ids(&["a", "c", "b", "d"]);
        let graph = DependencyGraph::build(
            &nodes,
            &[
                edge("a", "b", Relation::Blocks),
                edge("a", "c", Relation::Blocks),
                edge("b", "d", Relation::Blocks),
                edge("c", "d", Relation::Blocks),
            ],
        );
        let sorted = graph.topological_sort(&nodes);
        assert!(!sorted.has_cycle);
        assert_eq!(sorted.order, ids(&["a", "c", "b", "d"]));
    }

    #[test]
    fn test_sort_is_deterministic_across_runs() {
        let nodes = ids(&["e", "d", "c", "b", "a"]);
        let edges = vec![
            edge("a", "c", Relation::Blocks),
            edge("b", "c", Relation::Blocks),
        ];
        let graph = DependencyGraph::build(&nodes, &edges);
        let first = graph.topological_sort(&nodes);
        for _ in 0..10 {
            assert_eq!(graph.topological_sort(&nodes).order, first.order);
        }
    }

    #[test]
    fn test_every_node_after_its_blockers() {
        let nodes = ids(&["f", "e", "d", "c", "b", "a"]);
        let edges = vec![
            edge("a", "b", Relation::Blocks),
            edge("a", "c", Relation::Blocks),
            edge("b", "d", Relation::Blocks),
            edge("c", "e", Relation::Blocks),
            edge("d", "f", Relation::Blocks),
            edge("e", "f", Relation::Blocks),
        ];
        let graph = DependencyGraph::build(&nodes, &edges);
        let sorted = graph.topological_sort(&nodes);
        assert!(!sorted.has_cycle);

        let position: HashMap<&String, usize> =
            sorted.order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        for id in &nodes {
            for blocker in &graph.links(id).unwrap().blocked_by {
                assert!(
                    position[blocker] < position[id],
                    "{blocker} must precede {id}"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    #[test]
    fn test_cycle_returns_input_order_unchanged() {
        let nodes = ids(&["x", "a", "b"]);
        let graph = DependencyGraph::build(
            &nodes,
            &[
                edge("a", "b", Relation::Blocks),
                edge("b", "a", Relation::Blocks),
            ],
        );
        let sorted = graph.topological_sort(&nodes);
        assert!(sorted.has_cycle);
        assert_eq!(sorted.order, nodes, "no partial reordering on cycle");
    }

    #[test]
    fn test_three_node_cycle_detected() {
        let nodes = ids(&["a", "b", "c"]);
        let graph = DependencyGraph::build(
            &nodes,
            &[
                edge("a", "b", Relation::Blocks),
                edge("b", "c", Relation::Blocks),
                edge("c", "a", Relation::Blocks),
            ],
        );
        assert!(graph.topological_sort(&nodes).has_cycle);
    }

    #[test]
    fn test_subset_sort_ignores_outside_blockers() {
        // b is blocked by a, but a is not in the sorted subset.
        let nodes = ids(&["a", "b", "c"]);
        let graph = DependencyGraph::build(&nodes, &[edge("a", "b", Relation::Blocks)]);

        let subset = ids(&["b", "c"]);
        let sorted = graph.topological_sort(&subset);
        assert!(!sorted.has_cycle);
        assert_eq!(sorted.order, subset);
    }

    // -----------------------------------------------------------------------
    // Transitive blockers
    // -----------------------------------------------------------------------

    #[test]
    fn test_transitive_blockers_chain() {
        let nodes = ids(&["a", "b", "c", "d"]);
        let graph = DependencyGraph::build(
            &nodes,
            &[
                edge("a", "b", Relation::Blocks),
                edge("b", "c", Relation::Blocks),
                edge("c", "d", Relation::Blocks),
            ],
        );
        let blockers = graph.transitive_blockers(&"d".to_string());
        assert_eq!(blockers.len(), 3);
        assert!(blockers.contains("a"));
        assert!(blockers.contains("b"));
        assert!(blockers.contains("c"));

        assert!(graph.transitive_blockers(&"a".to_string()).is_empty());
        assert!(graph.transitive_blockers(&"ghost".to_string()).is_empty());
    }
}
