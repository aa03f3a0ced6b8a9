//! Execution store port.
//!
//! The orchestrator's execution registry is injected at construction so
//! tests can substitute an in-memory fake and production can substitute a
//! persistent one. Each execution's loop is the sole writer of its record;
//! control methods only flip flags the loop polls, so implementations need
//! last-write-wins semantics, nothing stronger.

use drover_types::error::StoreError;
use drover_types::workflow::WorkflowExecution;

/// Storage port for workflow executions.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionStore: Send + Sync {
    /// Read-only snapshot of an execution, if it exists.
    fn get(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, StoreError>> + Send;

    /// Insert or replace an execution record.
    fn save(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
