// ABOUTME: Sequential workflow executor with per-step retry and continue-on-error
// ABOUTME: Fires workflow and step lifecycle hook points around execution

use crate::context::WorkflowExecutionContext;
use crate::result::WorkflowResult;
use crate::steps::StepRunner;
use crate::types::{WorkflowDefinition, WorkflowStep};
use agentflow_state::ExecutionState;
use agentflow_hooks::HookPoint;
use serde_json::{json, Value as JsonValue};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Tunables for sequential execution.
#[derive(Debug, Clone)]
pub struct SequentialConfig {
    /// Ceiling on per-step extra attempts: effective retries are
    /// `min(step.retry_count, max_step_retries)`.
    pub max_step_retries: u32,
    /// Executor-wide continue-on-error; a step-level flag also suffices.
    pub continue_on_error: bool,
    /// Pause between steps.
    pub step_delay_ms: u64,
    /// Wall-clock budget for the whole run.
    pub timeout_ms: Option<u64>,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            max_step_retries: 3,
            continue_on_error: false,
            step_delay_ms: 0,
            timeout_ms: None,
        }
    }
}

/// Executes workflow steps strictly in order.
#[derive(Clone, Default)]
pub struct SequentialExecutor {
    config: SequentialConfig,
    runner: StepRunner,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SequentialConfig) -> Self {
        Self {
            config,
            runner: StepRunner::new(),
        }
    }

    pub fn with_runner(mut self, runner: StepRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    /// Runs a workflow from scratch: creates the execution context, fires
    /// the workflow lifecycle hook points, and returns the terminal result.
    pub async fn execute(&self, workflow: &WorkflowDefinition, input: JsonValue) -> WorkflowResult {
        let mut ctx = WorkflowExecutionContext::new(workflow, input.clone());
        self.execute_with_context(workflow, input, &mut ctx).await
    }

    /// Like [`execute`](Self::execute) but over a caller-provided context,
    /// enabling resume-from-checkpoint flows.
    pub async fn execute_with_context(
        &self,
        workflow: &WorkflowDefinition,
        input: JsonValue,
        ctx: &mut WorkflowExecutionContext,
    ) -> WorkflowResult {
        ctx.execution_state = ExecutionState::Running;
        info!(workflow = %workflow.id, instance = %ctx.instance_id, "workflow starting");

        let start = self
            .runner
            .hooks()
            .fire(HookPoint::WorkflowStart, ctx.run_id, input, None)
            .await;
        if !start.should_continue() {
            ctx.execution_state = ExecutionState::Cancelled;
            return WorkflowResult::failed(
                0,
                workflow.id.clone(),
                "workflow cancelled by hook",
                ctx.step_results.clone(),
                ctx.elapsed_ms(),
            );
        }

        let result = self.execute_steps(&workflow.steps, ctx).await;

        if result.success {
            ctx.execution_state = ExecutionState::Completed;
            self.runner
                .hooks()
                .fire(
                    HookPoint::WorkflowComplete,
                    ctx.run_id,
                    json!({ "completed_steps": result.completed_steps }),
                    None,
                )
                .await;
        } else {
            ctx.execution_state = ExecutionState::Failed;
            self.runner
                .hooks()
                .fire(
                    HookPoint::WorkflowError,
                    ctx.run_id,
                    json!({ "error": result.error_message }),
                    None,
                )
                .await;
        }
        result
    }

    /// Executes a list of steps against an existing context. Used both at
    /// the top level and by nested sequential/conditional steps.
    pub async fn execute_steps(
        &self,
        steps: &[WorkflowStep],
        ctx: &mut WorkflowExecutionContext,
    ) -> WorkflowResult {
        let started = Instant::now();
        let mut completed = 0usize;
        let total = steps.len();

        for (index, step) in steps.iter().enumerate() {
            if let Some(timeout_ms) = self.config.timeout_ms {
                if ctx.elapsed_ms() > timeout_ms {
                    return WorkflowResult::failed(
                        completed,
                        step.id.clone(),
                        format!("workflow timeout of {} ms exceeded", timeout_ms),
                        ctx.step_results.clone(),
                        started.elapsed().as_millis() as u64,
                    );
                }
            }

            ctx.current_step = Some(step.id.clone());
            self.runner
                .hooks()
                .fire(
                    HookPoint::WorkflowStepStart,
                    ctx.run_id,
                    json!({ "step_id": step.id }),
                    Some(&step.id),
                )
                .await;

            let attempts = step.retry_count.min(self.config.max_step_retries) + 1;
            let mut succeeded = None;
            let mut last_error = None;
            for attempt in 1..=attempts {
                match self.runner.run_step(step, ctx, true).await {
                    Ok(value) => {
                        succeeded = Some(value);
                        break;
                    }
                    Err(error) => {
                        warn!(
                            step = %step.id,
                            attempt,
                            attempts,
                            error = %error,
                            "step attempt failed"
                        );
                        let exhausted = attempt == attempts;
                        last_error = Some(error);
                        if !exhausted && step.retry_delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(step.retry_delay_ms)).await;
                        }
                    }
                }
            }

            match succeeded {
                Some(value) => {
                    ctx.record_step_result(step.id.clone(), value);
                    completed += 1;
                    self.runner
                        .hooks()
                        .fire(
                            HookPoint::WorkflowStepComplete,
                            ctx.run_id,
                            json!({ "step_id": step.id }),
                            Some(&step.id),
                        )
                        .await;
                }
                None => {
                    let error = last_error.unwrap_or_else(|| {
                        crate::error::WorkflowError::Other("step ran no attempts".to_string())
                    });
                    self.runner
                        .hooks()
                        .fire(
                            HookPoint::WorkflowStepError,
                            ctx.run_id,
                            json!({ "step_id": step.id, "error": error.to_string() }),
                            Some(&step.id),
                        )
                        .await;

                    if step.continue_on_error || self.config.continue_on_error {
                        ctx.record_step_result(step.id.clone(), JsonValue::Null);
                        completed += 1;
                    } else {
                        return WorkflowResult::failed(
                            completed,
                            step.id.clone(),
                            error.to_string(),
                            ctx.step_results.clone(),
                            started.elapsed().as_millis() as u64,
                        );
                    }
                }
            }

            if self.config.step_delay_ms > 0 && index + 1 < total {
                tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
            }
        }

        WorkflowResult::succeeded(
            completed,
            ctx.step_results.clone(),
            started.elapsed().as_millis() as u64,
        )
    }
}
