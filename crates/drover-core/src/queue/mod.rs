//! Merge-queue ordering built on the shared dependency graph.
//!
//! Queue entries map (via the queue store) to work items whose blocking
//! relationships constrain merge order. Reorder and batch validation report
//! structured results; only store failures surface as errors.

pub mod validator;

pub use validator::{BatchDependencyValidator, QueueError};
