//! Workflow orchestrator: owns the execution state machine, drives steps
//! through the external executor, and emits lifecycle events.
//!
//! `start_workflow` validates synchronously, registers the execution, then
//! spawns the execution loop as a detached tokio task -- callers observe
//! progress through `get_execution` or event listeners. The orchestrator
//! retains a `CancellationToken` and a pause flag per execution: cancel
//! flips the stored status immediately and aborts the in-flight executor
//! await; pause is cooperative and only takes effect at step boundaries.
//!
//! Execution is sequential. `max_parallel_steps` is accepted as declared
//! configuration but does not change the reference behavior.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use drover_types::config::OrchestratorConfig;
use drover_types::task::{RetryPolicy, TaskConfig, TaskSpec};
use drover_types::workflow::{
    ExecutionStatus, StepResult, StepStatus, WorkflowDefinition, WorkflowExecution,
    WorkflowResult, WorkflowStep,
};

use crate::context::{
    bounded_value, evaluate_condition, extract_value, merge_context, render_template, Context,
};
use crate::event::WorkflowEvents;
use crate::repository::ExecutionStore;

use super::definition::{validate_definition, WorkflowError};
use super::executor::{check_result_contract, TaskExecutor};

// ---------------------------------------------------------------------------
// Execution control
// ---------------------------------------------------------------------------

/// Per-execution control state retained by the orchestrator.
///
/// The loop holds its own clone; control methods only flip the flags the
/// loop polls, so there is no writer contention on the execution record.
#[derive(Clone)]
struct ExecutionControl {
    pause: Arc<AtomicBool>,
    cancel: CancellationToken,
    definition: Arc<WorkflowDefinition>,
    base_dir: PathBuf,
}

impl ExecutionControl {
    fn new(definition: WorkflowDefinition, base_dir: PathBuf) -> Self {
        Self {
            pause: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            definition: Arc::new(definition),
            base_dir,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

/// The scheduler: validates definitions, drives executions step by step,
/// and exposes the control surface (pause/resume/cancel/retry).
///
/// Generic over the executor and the execution store so tests can
/// substitute fakes and production can substitute persistent backends.
pub struct WorkflowOrchestrator<E, S> {
    executor: Arc<E>,
    store: Arc<S>,
    events: Arc<WorkflowEvents>,
    config: Arc<OrchestratorConfig>,
    controls: Arc<DashMap<String, ExecutionControl>>,
}

impl<E, S> WorkflowOrchestrator<E, S>
where
    E: TaskExecutor + 'static,
    S: ExecutionStore + 'static,
{
    pub fn new(executor: Arc<E>, store: Arc<S>, config: OrchestratorConfig) -> Self {
        Self {
            executor,
            store,
            events: Arc::new(WorkflowEvents::new()),
            config: Arc::new(config),
            controls: Arc::new(DashMap::new()),
        }
    }

    /// Lifecycle event registry for subscriptions.
    pub fn events(&self) -> &WorkflowEvents {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Validate a definition, register a new execution, and begin driving it.
    ///
    /// Validation errors (cycle, unknown dependency, duplicate step id) are
    /// raised here, before any execution state exists. On success the
    /// execution id is returned immediately; the loop runs detached.
    pub async fn start_workflow(
        &self,
        definition: WorkflowDefinition,
        base_dir: impl Into<PathBuf>,
        initial_context: Option<Context>,
    ) -> Result<String, WorkflowError> {
        validate_definition(&definition)?;

        let execution_id = format!("exec-{}", Uuid::now_v7());
        let execution = WorkflowExecution {
            execution_id: execution_id.clone(),
            workflow_id: definition.id.clone(),
            status: ExecutionStatus::Running,
            context: initial_context.unwrap_or_default(),
            step_results: Vec::new(),
            current_step_index: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.store.save(&execution).await?;

        let control = ExecutionControl::new(definition, base_dir.into());
        self.controls.insert(execution_id.clone(), control.clone());

        tracing::info!(
            execution_id = %execution_id,
            workflow = execution.workflow_id.as_str(),
            steps = control.definition.steps.len(),
            "starting workflow execution"
        );
        self.events
            .emit_workflow_start(&execution_id, &execution.workflow_id);

        self.spawn_loop(execution_id.clone(), control);
        Ok(execution_id)
    }

    /// Read-only snapshot of an execution.
    pub async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<WorkflowExecution>, WorkflowError> {
        Ok(self.store.get(execution_id).await?)
    }

    /// Request a cooperative pause.
    ///
    /// The loop observes the flag at the next step boundary and transitions
    /// the execution to `Paused`; an in-flight step is not interrupted.
    pub async fn pause_workflow(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let execution = self.require_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Running {
            return Err(WorkflowError::InvalidState(format!(
                "cannot pause execution in status {:?}",
                execution.status
            )));
        }
        let control = self.require_control(execution_id)?;
        control.pause.store(true, Ordering::SeqCst);
        tracing::info!(execution_id, "pause requested");
        Ok(())
    }

    /// Clear the pause flag and resume from `current_step_index`.
    pub async fn resume_workflow(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let mut execution = self.require_execution(execution_id).await?;
        match execution.status {
            // Pause was requested but the loop never parked; clearing the
            // flag is enough.
            ExecutionStatus::Running => {
                let control = self.require_control(execution_id)?;
                control.pause.store(false, Ordering::SeqCst);
                Ok(())
            }
            ExecutionStatus::Paused => {
                let control = self.require_control(execution_id)?;
                control.pause.store(false, Ordering::SeqCst);
                execution.status = ExecutionStatus::Running;
                self.store.save(&execution).await?;
                tracing::info!(
                    execution_id,
                    step_index = execution.current_step_index,
                    "resuming workflow execution"
                );
                self.spawn_loop(execution_id.to_string(), control);
                Ok(())
            }
            status => Err(WorkflowError::InvalidState(format!(
                "cannot resume execution in status {status:?}"
            ))),
        }
    }

    /// Cancel an execution.
    ///
    /// The stored status flips to `Cancelled` immediately (observable via
    /// `get_execution` right away); the cancellation token aborts the
    /// orchestrator's await on any in-flight executor call.
    pub async fn cancel_workflow(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let mut execution = self.require_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(WorkflowError::InvalidState(format!(
                "cannot cancel execution in status {:?}",
                execution.status
            )));
        }
        execution.status = ExecutionStatus::Cancelled;
        execution.completed_at = Some(Utc::now());
        self.store.save(&execution).await?;

        if let Some((_, control)) = self.controls.remove(execution_id) {
            control.cancel.cancel();
        }
        tracing::info!(execution_id, "workflow cancelled");
        Ok(())
    }

    /// Re-run a failed step of a failed workflow.
    ///
    /// Rewinds `current_step_index` to the step, clears the workflow error,
    /// and resumes the loop. Only valid while the execution is `Failed` and
    /// the step's recorded result is `Failed`.
    pub async fn retry_step(
        &self,
        execution_id: &str,
        step_id: &str,
    ) -> Result<(), WorkflowError> {
        let mut execution = self.require_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Failed {
            return Err(WorkflowError::InvalidState(format!(
                "cannot retry a step of an execution in status {:?}",
                execution.status
            )));
        }
        match execution.result_for(step_id) {
            Some(result) if result.status == StepStatus::Failed => {}
            Some(result) => {
                return Err(WorkflowError::InvalidState(format!(
                    "step '{step_id}' is {:?}, not failed",
                    result.status
                )));
            }
            None => {
                return Err(WorkflowError::InvalidState(format!(
                    "step '{step_id}' has no recorded result"
                )));
            }
        }

        let control = self.require_control(execution_id)?;
        let step_index = control
            .definition
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| {
                WorkflowError::ValidationError(format!("unknown step '{step_id}'"))
            })?;

        control.pause.store(false, Ordering::SeqCst);
        execution.status = ExecutionStatus::Running;
        execution.current_step_index = step_index;
        execution.error = None;
        execution.completed_at = None;
        self.store.save(&execution).await?;

        tracing::info!(execution_id, step_id, "retrying failed step");
        self.spawn_loop(execution_id.to_string(), control);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn require_execution(
        &self,
        execution_id: &str,
    ) -> Result<WorkflowExecution, WorkflowError> {
        self.store
            .get(execution_id)
            .await?
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))
    }

    fn require_control(&self, execution_id: &str) -> Result<ExecutionControl, WorkflowError> {
        self.controls
            .get(execution_id)
            .map(|c| c.clone())
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))
    }

    fn spawn_loop(&self, execution_id: String, control: ExecutionControl) {
        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        let config = Arc::clone(&self.config);
        let controls = Arc::clone(&self.controls);
        tokio::spawn(run_loop(
            executor,
            store,
            events,
            config,
            controls,
            control,
            execution_id,
        ));
    }
}

// ---------------------------------------------------------------------------
// Execution loop
// ---------------------------------------------------------------------------

/// What the loop decided to do after visiting one step.
enum StepOutcome {
    Advance,
    FailWorkflow(String),
    Stop,
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<E, S>(
    executor: Arc<E>,
    store: Arc<S>,
    events: Arc<WorkflowEvents>,
    config: Arc<OrchestratorConfig>,
    controls: Arc<DashMap<String, ExecutionControl>>,
    control: ExecutionControl,
    execution_id: String,
) where
    E: TaskExecutor + 'static,
    S: ExecutionStore + 'static,
{
    let steps = &control.definition.steps;
    loop {
        let mut execution = match store.get(&execution_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                tracing::warn!(
                    execution_id = execution_id.as_str(),
                    "execution disappeared from store; stopping loop"
                );
                controls.remove(&execution_id);
                return;
            }
            Err(e) => {
                tracing::error!(
                    execution_id = execution_id.as_str(),
                    error = %e,
                    "execution store failure; stopping loop"
                );
                controls.remove(&execution_id);
                return;
            }
        };

        // Cancellation wins over everything else.
        if execution.status == ExecutionStatus::Cancelled || control.cancel.is_cancelled() {
            if execution.status != ExecutionStatus::Cancelled {
                execution.status = ExecutionStatus::Cancelled;
            }
            if execution.completed_at.is_none() {
                execution.completed_at = Some(Utc::now());
            }
            let _ = store.save(&execution).await;
            controls.remove(&execution_id);
            tracing::info!(
                execution_id = execution_id.as_str(),
                "execution loop stopped: cancelled"
            );
            return;
        }

        // Some other writer moved the execution to a terminal or paused
        // state; this loop has nothing left to do.
        if execution.status != ExecutionStatus::Running {
            return;
        }

        // Cooperative pause, observed only at step boundaries.
        if control.pause.load(Ordering::SeqCst) {
            execution.status = ExecutionStatus::Paused;
            if save_or_stop(&store, &execution).await.is_err() {
                controls.remove(&execution_id);
                return;
            }
            tracing::info!(
                execution_id = execution_id.as_str(),
                step_index = execution.current_step_index,
                "execution paused"
            );
            return;
        }

        // All steps visited: the workflow completed.
        if execution.current_step_index >= steps.len() {
            execution.status = ExecutionStatus::Completed;
            execution.completed_at = Some(Utc::now());
            if save_or_stop(&store, &execution).await.is_err() {
                controls.remove(&execution_id);
                return;
            }
            let result = WorkflowResult::summarize(&execution, steps.len());
            tracing::info!(
                execution_id = execution_id.as_str(),
                success = result.success,
                completed = result.steps_completed,
                failed = result.steps_failed,
                "workflow completed"
            );
            events.emit_workflow_complete(&execution_id, &result);
            controls.remove(&execution_id);
            return;
        }

        let step = steps[execution.current_step_index].clone();
        let outcome = visit_step(
            &executor,
            &events,
            &config,
            &control,
            &mut execution,
            &step,
        )
        .await;

        match outcome {
            StepOutcome::Advance => {
                execution.current_step_index += 1;
                if save_or_stop(&store, &execution).await.is_err() {
                    controls.remove(&execution_id);
                    return;
                }
            }
            StepOutcome::FailWorkflow(error) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(error.clone());
                execution.completed_at = Some(Utc::now());
                let _ = store.save(&execution).await;
                tracing::error!(
                    execution_id = execution_id.as_str(),
                    error = error.as_str(),
                    "workflow failed"
                );
                events.emit_workflow_failed(&execution_id, &error);
                // Control state is retained so a failed step can be retried.
                return;
            }
            StepOutcome::Stop => {
                // Cancelled mid-step; the next iteration finalizes.
            }
        }
    }
}

/// Visit the step at the loop's cursor: gate on dependencies, evaluate the
/// condition, execute, and record the result.
async fn visit_step<E: TaskExecutor>(
    executor: &Arc<E>,
    events: &Arc<WorkflowEvents>,
    config: &Arc<OrchestratorConfig>,
    control: &ExecutionControl,
    execution: &mut WorkflowExecution,
    step: &WorkflowStep,
) -> StepOutcome {
    let execution_id = execution.execution_id.clone();
    let wf_config = control.definition.config.as_ref();
    let continue_on_failure = wf_config
        .map(|c| c.continue_on_step_failure)
        .unwrap_or(config.continue_on_step_failure);

    // Dependency gate: every declared dependency must have a successful
    // result. A blocked step is recorded and skipped over without failing
    // the workflow.
    let unmet: Vec<&String> = step
        .dependencies
        .iter()
        .filter(|dep| !execution.result_for(dep).map(|r| r.success).unwrap_or(false))
        .collect();
    if !unmet.is_empty() {
        let detail = format!(
            "dependencies did not complete successfully: {}",
            unmet.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        );
        tracing::warn!(
            execution_id = execution_id.as_str(),
            step_id = step.id.as_str(),
            detail = detail.as_str(),
            "step blocked"
        );
        record_visit(execution, step, StepStatus::Blocked, Some(detail));
        return StepOutcome::Advance;
    }

    // Conditional execution.
    if let Some(condition) = &step.condition {
        if !evaluate_condition(condition, &execution.context) {
            tracing::debug!(
                execution_id = execution_id.as_str(),
                step_id = step.id.as_str(),
                "condition false, skipping step"
            );
            record_visit(execution, step, StepStatus::Skipped, None);
            return StepOutcome::Advance;
        }
    }

    // Build and dispatch the task.
    events.emit_step_start(&execution_id, &step.id);
    let agent = step
        .agent
        .clone()
        .or_else(|| wf_config.and_then(|c| c.default_agent.clone()))
        .or_else(|| config.default_agent.clone());
    let retry_policy: Option<RetryPolicy> = wf_config
        .and_then(|c| c.retry_policy)
        .or(config.retry_policy);
    let task = TaskSpec {
        id: format!("{execution_id}:{}", step.id),
        task_type: step.task_type.clone(),
        prompt: render_template(&step.prompt, &execution.context),
        work_dir: control.base_dir.clone(),
        config: TaskConfig { agent },
        dependencies: step.dependencies.clone(),
        created_at: Utc::now(),
    };
    let started_at = Utc::now();

    tracing::debug!(
        execution_id = execution_id.as_str(),
        step_id = step.id.as_str(),
        task_type = step.task_type.as_str(),
        "executing step"
    );

    let response = tokio::select! {
        _ = control.cancel.cancelled() => {
            tracing::info!(
                execution_id = execution_id.as_str(),
                step_id = step.id.as_str(),
                "cancellation requested while step in flight"
            );
            return StepOutcome::Stop;
        }
        response = executor.execute_task(&task, retry_policy.as_ref()) => response,
    };

    let failure = match response {
        Ok(result) => {
            if let Err(violation) = check_result_contract(&task, &result) {
                // An integration bug, not a task failure: never absorbed.
                let error = format!("executor contract violation: {violation}");
                execution.step_results.push(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Failed,
                    success: false,
                    output: None,
                    error: Some(error.clone()),
                    started_at,
                    completed_at: Utc::now(),
                });
                events.emit_step_failed(&execution_id, &step.id, &error);
                return StepOutcome::FailWorkflow(error);
            }

            if result.success {
                execution.step_results.push(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Completed,
                    success: true,
                    output: Some(Value::String(result.output.clone())),
                    error: None,
                    started_at,
                    completed_at: Utc::now(),
                });

                if !step.output_mapping.is_empty() {
                    if let Err(error) = apply_output_mapping(execution, step, &result, config) {
                        events.emit_step_failed(&execution_id, &step.id, &error);
                        return StepOutcome::FailWorkflow(error);
                    }
                }

                events.emit_step_complete(&execution_id, &step.id);
                return StepOutcome::Advance;
            }

            result.failure_reason()
        }
        Err(e) => e.to_string(),
    };

    execution.step_results.push(StepResult {
        step_id: step.id.clone(),
        status: StepStatus::Failed,
        success: false,
        output: None,
        error: Some(failure.clone()),
        started_at,
        completed_at: Utc::now(),
    });
    events.emit_step_failed(&execution_id, &step.id, &failure);

    if continue_on_failure {
        tracing::warn!(
            execution_id = execution_id.as_str(),
            step_id = step.id.as_str(),
            error = failure.as_str(),
            "step failed, continuing per failure policy"
        );
        StepOutcome::Advance
    } else {
        StepOutcome::FailWorkflow(format!("step '{}' failed: {failure}", step.id))
    }
}

/// Extract mapped fields from the task result and merge them into the
/// context, enforcing the configured size limits.
fn apply_output_mapping(
    execution: &mut WorkflowExecution,
    step: &WorkflowStep,
    result: &drover_types::task::TaskResult,
    config: &OrchestratorConfig,
) -> Result<(), String> {
    let result_value = serde_json::to_value(result)
        .map_err(|e| format!("failed to serialize task result: {e}"))?;

    let mut updates = Context::new();
    for (context_key, path) in &step.output_mapping {
        match extract_value(&result_value, path) {
            Some(value) => {
                updates.insert(
                    context_key.clone(),
                    bounded_value(value, config.max_step_output_bytes),
                );
            }
            None => {
                tracing::warn!(
                    step_id = step.id.as_str(),
                    path = path.as_str(),
                    "output mapping path not found in task result"
                );
            }
        }
    }
    merge_context(&mut execution.context, updates);

    let total: usize = execution
        .context
        .values()
        .map(|v| serde_json::to_string(v).map(|s| s.len()).unwrap_or(0))
        .sum();
    if total > config.max_context_bytes {
        return Err(format!(
            "total context size ({total} bytes) exceeds maximum ({} bytes)",
            config.max_context_bytes
        ));
    }
    Ok(())
}

/// Record a blocked or skipped visit without executing the step.
fn record_visit(
    execution: &mut WorkflowExecution,
    step: &WorkflowStep,
    status: StepStatus,
    error: Option<String>,
) {
    let now = Utc::now();
    execution.step_results.push(StepResult {
        step_id: step.id.clone(),
        status,
        success: false,
        output: None,
        error,
        started_at: now,
        completed_at: now,
    });
}

async fn save_or_stop<S: ExecutionStore>(
    store: &Arc<S>,
    execution: &WorkflowExecution,
) -> Result<(), ()> {
    if let Err(e) = store.save(execution).await {
        tracing::error!(
            execution_id = execution.execution_id.as_str(),
            error = %e,
            "failed to persist execution; stopping loop"
        );
        return Err(());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
