//! Orchestrator configuration.
//!
//! `OrchestratorConfig` represents the `drover.toml` section that controls
//! scheduler-wide defaults. All fields have sensible defaults so an empty
//! file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::task::RetryPolicy;

/// Scheduler-wide defaults applied when a workflow's own config is silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Agent used when neither the step nor the workflow names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,

    /// Default failure policy for workflows without a config block.
    #[serde(default)]
    pub continue_on_step_failure: bool,

    /// Retry policy forwarded to the executor when the workflow doesn't set
    /// one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,

    /// Maximum size of a single mapped step output before truncation.
    #[serde(default = "default_max_step_output_bytes")]
    pub max_step_output_bytes: usize,

    /// Maximum total serialized size of an execution's context.
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,
}

fn default_max_step_output_bytes() -> usize {
    1_048_576 // 1 MB
}

fn default_max_context_bytes() -> usize {
    10_485_760 // 10 MB
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_agent: None,
            continue_on_step_failure: false,
            retry_policy: None,
            max_step_output_bytes: default_max_step_output_bytes(),
            max_context_bytes: default_max_context_bytes(),
        }
    }
}
