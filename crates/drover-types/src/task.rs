//! Executor boundary types.
//!
//! The scheduler hands a `TaskSpec` to the external resilient executor and
//! receives a `TaskResult` back. Both sides are fully typed so a malformed
//! executor response is rejected at the boundary instead of propagating
//! missing fields into the execution loop. Retry behavior lives entirely in
//! the executor; `RetryPolicy` is pass-through configuration.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task spec
// ---------------------------------------------------------------------------

/// A single unit of work submitted to the external executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task ID, scoped to the execution ("<execution_id>:<step_id>").
    pub id: String,
    /// Task type from the step definition.
    pub task_type: String,
    /// Fully rendered prompt (no remaining placeholders).
    pub prompt: String,
    /// Working directory the executor runs the task in.
    pub work_dir: PathBuf,
    /// Executor-facing configuration.
    pub config: TaskConfig,
    /// Step IDs the originating step waited on, for executor bookkeeping.
    pub dependencies: Vec<String>,
    /// When the scheduler built this task.
    pub created_at: DateTime<Utc>,
}

/// Executor-facing task configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Agent to run the task with, if one was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Retry policy forwarded to the executor, opaque to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = no retry).
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    #[serde(default)]
    pub backoff_ms: u64,
}

// ---------------------------------------------------------------------------
// Task result
// ---------------------------------------------------------------------------

/// One attempt recorded by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Final result reported by the external executor for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Echoes `TaskSpec.id`.
    pub task_id: String,
    /// Executor-side execution identifier.
    pub execution_id: String,
    /// Whether the task ultimately succeeded.
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Collected task output.
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Per-attempt breakdown, oldest first.
    #[serde(default)]
    pub attempts: Vec<TaskAttempt>,
    /// Total attempts made (>= 1).
    pub total_attempts: u32,
    /// Attempt number that produced the final outcome.
    pub final_attempt: u32,
}

impl TaskResult {
    /// Best error detail for a failed result: the last attempt's error,
    /// falling back to the exit code.
    pub fn failure_reason(&self) -> String {
        if let Some(err) = self.attempts.iter().rev().find_map(|a| a.error.as_deref()) {
            return err.to_string();
        }
        match self.exit_code {
            Some(code) => format!("task exited with code {code}"),
            None => "task failed without error detail".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
