//! Workflow domain types for Drover.
//!
//! Defines the canonical workflow definition consumed by the orchestrator
//! and the execution tracking types (`WorkflowExecution`, `StepResult`) it
//! mutates while driving a run. Definitions are immutable once a run starts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::RetryPolicy;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A named sequence of steps with dependencies, executed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identifier (e.g. "release-pipeline"). Alphanumeric + hyphens.
    pub id: String,
    /// Ordered list of step definitions. Declaration order is the execution
    /// order in sequential mode and the tie-break for graph ordering.
    pub steps: Vec<WorkflowStep>,
    /// Optional execution configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<WorkflowConfig>,
}

/// One unit of work within a workflow, mapped to a single external task
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// User-defined step ID, unique within the workflow.
    pub id: String,
    /// Task type handed to the external executor (e.g. "implement", "review").
    pub task_type: String,
    /// Prompt template. `{{key}}` placeholders resolve against the execution
    /// context at the moment the step starts.
    pub prompt: String,
    /// Step IDs this step waits on. A step runs only if every dependency
    /// recorded a successful result.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Optional condition template. Evaluated against the context before the
    /// step runs; false marks the step skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Mapping of context key -> top-level field of the task result. Applied
    /// to the context after the step completes successfully.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output_mapping: HashMap<String, String>,
    /// Agent override for this step (falls back to the workflow's or the
    /// orchestrator's default agent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Per-workflow execution configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// When true, a failed step is absorbed and the loop advances; when
    /// false the workflow fails on the first step failure.
    #[serde(default)]
    pub continue_on_step_failure: bool,
    /// Declared concurrency ceiling. The reference scheduler executes
    /// sequentially; this is configuration surface only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_steps: Option<u32>,
    /// Default agent for steps that don't name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    /// Retry policy passed through to the external executor, opaque to the
    /// scheduler itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
///
/// Transitions are monotonic except `Paused -> Running` (resume) and the
/// rewind performed by an explicit step retry. `Completed`, `Failed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of an individual step within an execution.
///
/// `Blocked` and `Skipped` are terminal for that step but only affect steps
/// that declare it as a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    Blocked,
}

// ---------------------------------------------------------------------------
// Execution tracking
// ---------------------------------------------------------------------------

/// Outcome of one step within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step ID matching `WorkflowStep.id`.
    pub step_id: String,
    /// Final status of the step.
    pub status: StepStatus,
    /// True only for `Completed` steps. Dependents gate on this flag.
    pub success: bool,
    /// Task output, if the step executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error detail for failed/blocked steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the step was started (or visited, for blocked/skipped steps).
    pub started_at: DateTime<Utc>,
    /// When the step reached its final status.
    pub completed_at: DateTime<Utc>,
}

/// The runtime instance of a workflow run.
///
/// Created by `start_workflow`, mutated only by the execution loop and the
/// control operations, destroyed with the registry (no persistence
/// guarantee in this core).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Generated, prefixed execution ID ("exec-<uuid>").
    pub execution_id: String,
    /// ID of the workflow definition being executed.
    pub workflow_id: String,
    /// Current run status.
    pub status: ExecutionStatus,
    /// Key-value store passed between steps, updated via output mapping.
    pub context: HashMap<String, Value>,
    /// Per-step outcomes in visit order.
    pub step_results: Vec<StepResult>,
    /// Index of the next step the loop will visit.
    pub current_step_index: usize,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// The most recent recorded result for a step, if any.
    pub fn result_for(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().rev().find(|r| r.step_id == step_id)
    }
}

/// Summary handed to `on_workflow_complete` listeners.
///
/// A run can reach `Completed` with absorbed step failures under
/// `continue_on_step_failure`; `success` and the per-status counts let
/// callers observe that distinction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// True when no step failed.
    pub success: bool,
    pub steps_total: usize,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub steps_blocked: usize,
}

impl WorkflowResult {
    /// Summarize a finished execution against its definition.
    pub fn summarize(execution: &WorkflowExecution, steps_total: usize) -> Self {
        let count = |status: StepStatus| {
            execution
                .step_results
                .iter()
                .filter(|r| r.status == status)
                .count()
        };
        let steps_failed = count(StepStatus::Failed);
        Self {
            execution_id: execution.execution_id.clone(),
            status: execution.status,
            success: steps_failed == 0 && execution.status == ExecutionStatus::Completed,
            steps_total,
            steps_completed: count(StepStatus::Completed),
            steps_failed,
            steps_skipped: count(StepStatus::Skipped),
            steps_blocked: count(StepStatus::Blocked),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
