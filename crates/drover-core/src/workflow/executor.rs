//! External resilient-executor port.
//!
//! The scheduler hands fully rendered tasks to an implementation of
//! `TaskExecutor` and awaits the result; retries and circuit-breaking live
//! behind this trait, opaque to the core. Results are checked against the
//! boundary contract before they feed back into the execution loop, so a
//! malformed response fails fast instead of propagating missing fields.

use drover_types::task::{RetryPolicy, TaskResult, TaskSpec};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors reported by an executor implementation.
///
/// These are infrastructure faults (the executor itself broke), distinct
/// from a task that ran and failed -- the latter is a `TaskResult` with
/// `success = false`.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor could not run the task at all.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// The executor was asked to cancel the task.
    #[error("task cancelled")]
    Cancelled,

    /// Any other executor-side failure.
    #[error("executor error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// TaskExecutor trait
// ---------------------------------------------------------------------------

/// Port to the external resilient executor.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait TaskExecutor: Send + Sync {
    /// Execute one task to completion and report the result.
    ///
    /// `retry_policy` is pass-through configuration; the implementation
    /// decides whether and how to honor it.
    fn execute_task(
        &self,
        task: &TaskSpec,
        retry_policy: Option<&RetryPolicy>,
    ) -> impl std::future::Future<Output = Result<TaskResult, ExecutorError>> + Send;
}

// ---------------------------------------------------------------------------
// Boundary contract
// ---------------------------------------------------------------------------

/// Check a `TaskResult` against the submitted `TaskSpec`.
///
/// Violations are integration bugs, not task failures: the orchestrator
/// escalates them to workflow failure regardless of the failure policy.
pub fn check_result_contract(task: &TaskSpec, result: &TaskResult) -> Result<(), String> {
    if result.task_id != task.id {
        return Err(format!(
            "result task_id '{}' does not match submitted task '{}'",
            result.task_id, task.id
        ));
    }
    if result.total_attempts == 0 {
        return Err("total_attempts must be >= 1".to_string());
    }
    if !result.attempts.is_empty() && result.attempts.len() as u32 != result.total_attempts {
        return Err(format!(
            "attempts list has {} entries but total_attempts is {}",
            result.attempts.len(),
            result.total_attempts
        ));
    }
    if result.final_attempt == 0 || result.final_attempt > result.total_attempts {
        return Err(format!(
            "final_attempt {} is outside 1..={}",
            result.final_attempt, result.total_attempts
        ));
    }
    if result.completed_at < result.started_at {
        return Err("completed_at precedes started_at".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
