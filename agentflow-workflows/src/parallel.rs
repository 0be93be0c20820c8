// ABOUTME: Parallel workflow executor with bounded concurrency and fail-fast
// ABOUTME: Workers fill per-step result slots; the wait loop polls completion flags

use crate::context::WorkflowExecutionContext;
use crate::result::WorkflowResult;
use crate::steps::StepRunner;
use crate::types::{WorkflowDefinition, WorkflowStep};
use agentflow_hooks::HookPoint;
use agentflow_state::ExecutionState;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Tunables for parallel execution.
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Concurrency bound; effective bound is `min(max_concurrency ?? N, N)`.
    pub max_concurrency: Option<usize>,
    /// Return on the first failed step without waiting for the rest.
    pub fail_fast: bool,
    /// When false, return as soon as any step completes.
    pub wait_for_all: bool,
    /// Hard ceiling on the wait loop.
    pub timeout_ms: Option<u64>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            fail_fast: true,
            wait_for_all: true,
            timeout_ms: None,
        }
    }
}

/// Executes steps concurrently on spawned tasks bounded by a semaphore.
///
/// Each worker owns a clone of the execution context and touches only its
/// own result slot; results merge into the caller's context afterwards.
/// Fail-fast and timeout exits leave outstanding workers running; their
/// results are discarded.
#[derive(Clone, Default)]
pub struct ParallelExecutor {
    config: ParallelConfig,
    runner: StepRunner,
}

struct WorkItem {
    result: Arc<Mutex<Option<JsonValue>>>,
    error: Arc<Mutex<Option<String>>>,
    done: Arc<AtomicBool>,
}

impl WorkItem {
    fn new() -> Self {
        Self {
            result: Arc::new(Mutex::new(None)),
            error: Arc::new(Mutex::new(None)),
            done: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ParallelExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParallelConfig) -> Self {
        Self {
            config,
            runner: StepRunner::new(),
        }
    }

    pub fn with_runner(mut self, runner: StepRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Runs a whole workflow with every top-level step in parallel.
    pub async fn execute(&self, workflow: &WorkflowDefinition, input: JsonValue) -> WorkflowResult {
        let mut ctx = WorkflowExecutionContext::new(workflow, input.clone());
        ctx.execution_state = ExecutionState::Running;
        info!(workflow = %workflow.id, instance = %ctx.instance_id, "parallel workflow starting");

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

        let result = self.execute_steps(&workflow.steps, &mut ctx, true).await;

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

    /// Executes `steps` concurrently against `ctx`. With `use_pool` false
    /// (nested parallel inside a worker) the steps run in batched mode on
    /// the current task instead, so a worker never blocks on its own pool.
    pub async fn execute_steps(
        &self,
        steps: &[WorkflowStep],
        ctx: &mut WorkflowExecutionContext,
        use_pool: bool,
    ) -> WorkflowResult {
        if steps.is_empty() {
            return WorkflowResult::succeeded(0, ctx.step_results.clone(), 0);
        }
        if !use_pool {
            return self.execute_batched(steps, ctx).await;
        }

        let started = Instant::now();
        let total = steps.len();
        let bound = self
            .config
            .max_concurrency
            .unwrap_or(total)
            .clamp(1, total);
        let semaphore = Arc::new(Semaphore::new(bound));
        let items: Vec<WorkItem> = (0..total).map(|_| WorkItem::new()).collect();

        for (step, item) in steps.iter().zip(items.iter()) {
            let step = step.clone();
            let mut worker_ctx = ctx.clone();
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            let result_slot = item.result.clone();
            let error_slot = item.error.clone();
            let done = item.done.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();

                runner
                    .hooks()
                    .fire(
                        HookPoint::WorkflowStepStart,
                        worker_ctx.run_id,
                        json!({ "step_id": step.id }),
                        Some(&step.id),
                    )
                    .await;

                match runner.run_step(&step, &mut worker_ctx, false).await {
                    Ok(value) => {
                        *result_slot.lock() = Some(value);
                        runner
                            .hooks()
                            .fire(
                                HookPoint::WorkflowStepComplete,
                                worker_ctx.run_id,
                                json!({ "step_id": step.id }),
                                Some(&step.id),
                            )
                            .await;
                    }
                    Err(error) => {
                        *error_slot.lock() = Some(error.to_string());
                        runner
                            .hooks()
                            .fire(
                                HookPoint::WorkflowStepError,
                                worker_ctx.run_id,
                                json!({ "step_id": step.id, "error": error.to_string() }),
                                Some(&step.id),
                            )
                            .await;
                    }
                }
                done.store(true, Ordering::SeqCst);
            });
        }

        // Completion-polling wait loop: 1 ms granularity, hard timeout.
        loop {
            let completed = items
                .iter()
                .filter(|item| item.done.load(Ordering::SeqCst))
                .count();

            if self.config.fail_fast {
                let first_error = steps
                    .iter()
                    .zip(items.iter())
                    .find_map(|(step, item)| {
                        item.error.lock().clone().map(|message| (step, message))
                    });
                if let Some((failed, message)) = first_error {
                    warn!(step = %failed.id, "parallel execution failing fast");
                    let completed_steps = self.collect(steps, &items, ctx);
                    return WorkflowResult::failed(
                        completed_steps,
                        failed.id.clone(),
                        message,
                        ctx.step_results.clone(),
                        started.elapsed().as_millis() as u64,
                    );
                }
            }

            if completed == total {
                break;
            }
            if !self.config.wait_for_all && completed > 0 {
                break;
            }
            if let Some(timeout_ms) = self.config.timeout_ms {
                if started.elapsed() > Duration::from_millis(timeout_ms) {
                    let completed_steps = self.collect(steps, &items, ctx);
                    return WorkflowResult::failed(
                        completed_steps,
                        "parallel".to_string(),
                        format!("parallel execution timeout of {} ms exceeded", timeout_ms),
                        ctx.step_results.clone(),
                        started.elapsed().as_millis() as u64,
                    );
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let completed_steps = self.collect(steps, &items, ctx);
        let failure = steps.iter().zip(items.iter()).find_map(|(step, item)| {
            item.error.lock().clone().map(|message| (step.id.clone(), message))
        });

        match failure {
            Some((failed_step, message)) => WorkflowResult::failed(
                completed_steps,
                failed_step,
                message,
                ctx.step_results.clone(),
                started.elapsed().as_millis() as u64,
            ),
            None => WorkflowResult::succeeded(
                completed_steps,
                ctx.step_results.clone(),
                started.elapsed().as_millis() as u64,
            ),
        }
    }

    /// Merges populated result slots into the context. Returns the number
    /// of steps that produced a result.
    fn collect(
        &self,
        steps: &[WorkflowStep],
        items: &[WorkItem],
        ctx: &mut WorkflowExecutionContext,
    ) -> usize {
        let mut completed = 0;
        for (step, item) in steps.iter().zip(items.iter()) {
            if let Some(value) = item.result.lock().take() {
                ctx.record_step_result(step.id.clone(), value);
                completed += 1;
            }
        }
        completed
    }

    /// Non-pool fallback: runs steps concurrently on the current task in
    /// chunks of the concurrency bound.
    async fn execute_batched(
        &self,
        steps: &[WorkflowStep],
        ctx: &mut WorkflowExecutionContext,
    ) -> WorkflowResult {
        let started = Instant::now();
        let total = steps.len();
        let bound = self
            .config
            .max_concurrency
            .unwrap_or(total)
            .clamp(1, total);

        let mut completed = 0usize;
        let mut failure: Option<(String, String)> = None;
        for chunk in steps.chunks(bound) {
            let futures = chunk.iter().map(|step| {
                let step = step.clone();
                let mut worker_ctx = ctx.clone();
                let runner = self.runner.clone();
                async move {
                    let outcome = runner.run_step(&step, &mut worker_ctx, false).await;
                    (step.id.clone(), outcome)
                }
            });

            for (step_id, outcome) in futures::future::join_all(futures).await {
                match outcome {
                    Ok(value) => {
                        ctx.record_step_result(step_id, value);
                        completed += 1;
                    }
                    Err(error) => {
                        if self.config.fail_fast {
                            return WorkflowResult::failed(
                                completed,
                                step_id,
                                error.to_string(),
                                ctx.step_results.clone(),
                                started.elapsed().as_millis() as u64,
                            );
                        }
                        warn!(step = %step_id, error = %error, "batched step failed");
                        if failure.is_none() {
                            failure = Some((step_id, error.to_string()));
                        }
                    }
                }
            }
        }

        match failure {
            Some((failed_step, message)) => WorkflowResult::failed(
                completed,
                failed_step,
                message,
                ctx.step_results.clone(),
                started.elapsed().as_millis() as u64,
            ),
            None => WorkflowResult::succeeded(
                completed,
                ctx.step_results.clone(),
                started.elapsed().as_millis() as u64,
            ),
        }
    }
}
