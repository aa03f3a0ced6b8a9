//! Storage ports and their in-memory defaults.
//!
//! The core defines the "ports" the orchestrator and queue validator
//! consume; a persistent backend can implement them, but the in-memory
//! implementations here are all this core requires.

pub mod execution;
pub mod memory;
pub mod queue;

pub use execution::ExecutionStore;
pub use memory::{InMemoryExecutionStore, InMemoryQueueStore, InMemoryRelationStore};
pub use queue::{QueueStore, RelationStore};
