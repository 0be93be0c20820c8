// ABOUTME: StepRunner dispatching workflow steps by kind, including nested composites
// ABOUTME: Applies per-step timeouts and $path input substitution from the context

use crate::conditional::ConditionalExecutor;
use crate::context::WorkflowExecutionContext;
use crate::error::WorkflowError;
use crate::hooks::WorkflowHooks;
use crate::loops::LoopExecutor;
use crate::parallel::{ParallelConfig, ParallelExecutor};
use crate::script::run_script;
use crate::sequential::SequentialExecutor;
use crate::traits::ComponentRegistry;
use crate::types::{StepType, WorkflowStep};
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Executes individual steps. Composite steps (sequential, parallel,
/// condition, loop) recurse through nested executors sharing this runner.
#[derive(Clone, Default)]
pub struct StepRunner {
    components: Option<Arc<dyn ComponentRegistry>>,
    hooks: WorkflowHooks,
}

impl StepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_components(mut self, components: Arc<dyn ComponentRegistry>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_hooks(mut self, hooks: WorkflowHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hooks(&self) -> &WorkflowHooks {
        &self.hooks
    }

    /// Runs one step against the context. `use_pool` is false when already
    /// inside a parallel worker, forcing nested parallel steps into batched
    /// execution so workers never wait on their own pool.
    pub fn run_step<'a>(
        &'a self,
        step: &'a WorkflowStep,
        ctx: &'a mut WorkflowExecutionContext,
        use_pool: bool,
    ) -> BoxFuture<'a, Result<JsonValue, WorkflowError>> {
        async move {
            debug!(step = %step.id, "running step");
            match step.timeout_ms {
                Some(timeout_ms) => {
                    tokio::time::timeout(
                        Duration::from_millis(timeout_ms),
                        self.dispatch(step, ctx, use_pool),
                    )
                    .await
                    .map_err(|_| {
                        WorkflowError::TimeoutExceeded(format!("step '{}'", step.id))
                    })?
                }
                None => self.dispatch(step, ctx, use_pool).await,
            }
        }
        .boxed()
    }

    async fn dispatch(
        &self,
        step: &WorkflowStep,
        ctx: &mut WorkflowExecutionContext,
        use_pool: bool,
    ) -> Result<JsonValue, WorkflowError> {
        match &step.step_type {
            StepType::Delay {
                duration_ms,
                jitter_percent,
            } => {
                let jitter_ms = if *jitter_percent > 0.0 {
                    let fraction: f64 = rand::thread_rng().gen_range(0.0..=1.0);
                    (*duration_ms as f64 * jitter_percent / 100.0 * fraction) as u64
                } else {
                    0
                };
                let total = duration_ms + jitter_ms;
                tokio::time::sleep(Duration::from_millis(total)).await;
                Ok(json!({ "delayed_ms": total }))
            }

            StepType::Agent { agent_name, input } => {
                let agent = self
                    .components
                    .as_ref()
                    .and_then(|c| c.agent(agent_name))
                    .ok_or_else(|| WorkflowError::ComponentNotFound(agent_name.clone()))?;
                let resolved = substitute(input.clone(), &ctx.projection());
                agent
                    .execute(resolved)
                    .await
                    .map_err(|err| WorkflowError::StepExecutionFailed {
                        step_id: step.id.clone(),
                        message: err.to_string(),
                    })
            }

            StepType::Tool {
                tool_name,
                parameters,
            } => {
                let tool = self
                    .components
                    .as_ref()
                    .and_then(|c| c.tool(tool_name))
                    .ok_or_else(|| WorkflowError::ComponentNotFound(tool_name.clone()))?;
                let resolved = substitute(parameters.clone(), &ctx.projection());
                tool.invoke(resolved)
                    .await
                    .map_err(|err| WorkflowError::StepExecutionFailed {
                        step_id: step.id.clone(),
                        message: err.to_string(),
                    })
            }

            StepType::Sequential { steps } => {
                let executor = SequentialExecutor::new().with_runner(self.clone());
                let result = executor.execute_steps(steps, ctx).await;
                if result.success {
                    Ok(json!({ "completed_steps": result.completed_steps }))
                } else {
                    Err(WorkflowError::SubWorkflowFailed(
                        result
                            .error_message
                            .unwrap_or_else(|| "nested sequential steps failed".to_string()),
                    ))
                }
            }

            StepType::Parallel { steps } => {
                let executor =
                    ParallelExecutor::with_config(ParallelConfig::default()).with_runner(self.clone());
                let result = executor.execute_steps(steps, ctx, use_pool).await;
                if result.success {
                    Ok(json!({ "completed_steps": result.completed_steps }))
                } else {
                    Err(WorkflowError::SubWorkflowFailed(
                        result
                            .error_message
                            .unwrap_or_else(|| "nested parallel steps failed".to_string()),
                    ))
                }
            }

            StepType::Condition {
                expression,
                true_steps,
                false_steps,
            } => {
                let executor = ConditionalExecutor::with_runner(self.clone());
                let outcome = executor
                    .execute(expression, true_steps, false_steps, ctx)
                    .await?;
                if outcome.result.success {
                    Ok(json!({
                        "condition": outcome.condition,
                        "branch": outcome.branch,
                        "completed_steps": outcome.result.completed_steps,
                    }))
                } else {
                    Err(WorkflowError::SubWorkflowFailed(
                        outcome
                            .result
                            .error_message
                            .unwrap_or_else(|| "conditional branch failed".to_string()),
                    ))
                }
            }

            StepType::Loop {
                kind,
                body,
                max_iterations,
                break_on_error,
            } => {
                let executor = LoopExecutor::with_runner(self.clone());
                let outcome = executor
                    .execute(kind, body, *max_iterations, *break_on_error, ctx)
                    .await?;
                Ok(json!({
                    "iterations_completed": outcome.iterations_completed,
                    "break_reason": outcome.break_reason,
                }))
            }

            StepType::Script {
                interpreter,
                script,
                stdout_cap,
                stderr_cap,
            } => {
                run_script(
                    &step.id,
                    *interpreter,
                    script,
                    &ctx.projection(),
                    *stdout_cap,
                    *stderr_cap,
                )
                .await
            }

            StepType::Transform { mappings } => {
                let projection = ctx.projection();
                let mut output = serde_json::Map::new();
                for (key, path) in mappings {
                    output.insert(key.clone(), lookup(&projection, path));
                }
                Ok(JsonValue::Object(output))
            }
        }
    }
}

/// Replaces `$dot.path` strings with values from the projection,
/// recursively through arrays and objects. Unresolvable paths become null.
fn substitute(value: JsonValue, projection: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) if s.starts_with('$') => lookup(projection, &s[1..]),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|item| substitute(item, projection))
                .collect(),
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute(v, projection)))
                .collect(),
        ),
        other => other,
    }
}

fn lookup(projection: &JsonValue, path: &str) -> JsonValue {
    let mut current = projection;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => match map.get(segment) {
                Some(value) => value,
                None => return JsonValue::Null,
            },
            JsonValue::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i))
            {
                Some(value) => value,
                None => return JsonValue::Null,
            },
            _ => return JsonValue::Null,
        };
    }
    current.clone()
}
