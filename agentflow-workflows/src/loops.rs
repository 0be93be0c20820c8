// ABOUTME: LoopExecutor running while/for/foreach iteration over a step body
// ABOUTME: Iteration results are keyed iter_<i>_<step_id> in the surrounding context

use crate::conditions::evaluate;
use crate::context::WorkflowExecutionContext;
use crate::error::{ExpressionError, WorkflowError};
use crate::steps::StepRunner;
use crate::types::{LoopKind, WorkflowStep};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, warn};

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    ConditionFalse,
    MaxIterationsReached,
    IterationError,
    Timeout,
    ExplicitBreak,
    CompletedNaturally,
}

/// Loop result: how far it got and why it stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub iterations_completed: u64,
    pub break_reason: BreakReason,
}

/// Variable a body step sets (to true) to break out of the loop.
pub const BREAK_VARIABLE: &str = "loop_break";

/// Tunables applying to every loop this executor runs.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Iteration count for `for` loops that specify none.
    pub default_for_count: u64,
    /// Global iteration ceiling, also capping per-step overrides.
    pub max_iterations: u64,
    /// Wall-clock budget across all iterations.
    pub timeout_ms: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            default_for_count: 100,
            max_iterations: 1000,
            timeout_ms: None,
        }
    }
}

/// Executes while/for/foreach loops.
#[derive(Clone, Default)]
pub struct LoopExecutor {
    config: LoopConfig,
    runner: StepRunner,
}

impl LoopExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            config,
            runner: StepRunner::new(),
        }
    }

    pub fn with_runner(runner: StepRunner) -> Self {
        Self {
            config: LoopConfig::default(),
            runner,
        }
    }

    /// Runs the loop body per iteration, keying each step's result as
    /// `iter_<i>_<step_id>`. With `break_on_error` false, a failing body
    /// step records null and iteration continues.
    pub async fn execute(
        &self,
        kind: &LoopKind,
        body: &[WorkflowStep],
        max_iterations: Option<u64>,
        break_on_error: bool,
        ctx: &mut WorkflowExecutionContext,
    ) -> Result<LoopOutcome, WorkflowError> {
        let iteration_cap = max_iterations
            .unwrap_or(self.config.max_iterations)
            .min(self.config.max_iterations);
        let started = std::time::Instant::now();

        // Foreach snapshot is taken once; body mutations of the variable
        // do not change the iteration set.
        let foreach_items: Option<Vec<JsonValue>> = match kind {
            LoopKind::ForEach => {
                let items = ctx
                    .get_variable("items")
                    .ok_or_else(|| ExpressionError::PathNotFound("variables.items".to_string()))?;
                let array = items.as_array().ok_or_else(|| {
                    ExpressionError::InvalidExpression("variables.items is not an array".to_string())
                })?;
                Some(array.clone())
            }
            _ => None,
        };

        let for_requested = match kind {
            LoopKind::For { count } => Some(count.unwrap_or(self.config.default_for_count)),
            _ => None,
        };
        let for_count = for_requested.map(|requested| requested.min(iteration_cap));

        let mut iteration: u64 = 0;
        loop {
            if let Some(timeout_ms) = self.config.timeout_ms {
                if started.elapsed() > Duration::from_millis(timeout_ms) {
                    return Ok(LoopOutcome {
                        iterations_completed: iteration,
                        break_reason: BreakReason::Timeout,
                    });
                }
            }

            // Natural termination per kind, then the global ceiling.
            match kind {
                LoopKind::While { condition } => {
                    if iteration >= iteration_cap {
                        return Ok(LoopOutcome {
                            iterations_completed: iteration,
                            break_reason: BreakReason::MaxIterationsReached,
                        });
                    }
                    if !evaluate(condition, &ctx.projection())? {
                        return Ok(LoopOutcome {
                            iterations_completed: iteration,
                            break_reason: BreakReason::ConditionFalse,
                        });
                    }
                }
                LoopKind::For { .. } => {
                    let count = for_count.unwrap_or(0);
                    if iteration >= count {
                        let capped = for_requested.unwrap_or(0) > count;
                        return Ok(LoopOutcome {
                            iterations_completed: iteration,
                            break_reason: if capped {
                                BreakReason::MaxIterationsReached
                            } else {
                                BreakReason::CompletedNaturally
                            },
                        });
                    }
                }
                LoopKind::ForEach => {
                    let items = foreach_items.as_ref().map(Vec::len).unwrap_or(0) as u64;
                    if iteration >= items {
                        return Ok(LoopOutcome {
                            iterations_completed: iteration,
                            break_reason: BreakReason::CompletedNaturally,
                        });
                    }
                    if iteration >= iteration_cap {
                        return Ok(LoopOutcome {
                            iterations_completed: iteration,
                            break_reason: BreakReason::MaxIterationsReached,
                        });
                    }
                }
            }

            ctx.set_variable("loop_index", json!(iteration));
            if let Some(items) = &foreach_items {
                ctx.set_variable("loop_item", items[iteration as usize].clone());
            }

            for step in body {
                match self.runner.run_step(step, ctx, true).await {
                    Ok(value) => {
                        ctx.record_step_result(format!("iter_{}_{}", iteration, step.id), value);
                    }
                    Err(error) => {
                        warn!(
                            step = %step.id,
                            iteration,
                            error = %error,
                            "loop body step failed"
                        );
                        if break_on_error {
                            return Ok(LoopOutcome {
                                iterations_completed: iteration,
                                break_reason: BreakReason::IterationError,
                            });
                        }
                        ctx.record_step_result(
                            format!("iter_{}_{}", iteration, step.id),
                            JsonValue::Null,
                        );
                    }
                }
            }

            iteration += 1;
            debug!(iteration, "loop iteration complete");

            if ctx.get_variable(BREAK_VARIABLE) == Some(&json!(true)) {
                ctx.variables.remove(BREAK_VARIABLE);
                return Ok(LoopOutcome {
                    iterations_completed: iteration,
                    break_reason: BreakReason::ExplicitBreak,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConditionExpression, WorkflowDefinition};
    use serde_json::json;

    fn context() -> WorkflowExecutionContext {
        let workflow = WorkflowDefinition::builder("wf").build();
        WorkflowExecutionContext::new(&workflow, json!(null))
    }

    #[tokio::test]
    async fn test_for_loop_sets_index_and_completes() {
        let executor = LoopExecutor::new();
        let mut ctx = context();

        let outcome = executor
            .execute(
                &LoopKind::For { count: Some(3) },
                &[WorkflowStep::delay("tick", 1)],
                None,
                false,
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations_completed, 3);
        assert_eq!(outcome.break_reason, BreakReason::CompletedNaturally);
        assert_eq!(ctx.variables["loop_index"], json!(2));
        assert!(ctx.step_results.contains_key("iter_0_tick"));
        assert!(ctx.step_results.contains_key("iter_2_tick"));
    }

    #[tokio::test]
    async fn test_foreach_iterates_items() {
        let executor = LoopExecutor::new();
        let mut ctx = context();
        ctx.set_variable("items", json!(["a", "b", "c"]));

        let outcome = executor
            .execute(
                &LoopKind::ForEach,
                &[WorkflowStep::delay("body", 1)],
                None,
                false,
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations_completed, 3);
        assert_eq!(outcome.break_reason, BreakReason::CompletedNaturally);
        assert_eq!(ctx.variables["loop_item"], json!("c"));
    }

    #[tokio::test]
    async fn test_foreach_requires_items_array() {
        let executor = LoopExecutor::new();
        let mut ctx = context();

        let err = executor
            .execute(&LoopKind::ForEach, &[], None, false, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Expression(ExpressionError::PathNotFound(_))
        ));

        ctx.set_variable("items", json!("not an array"));
        let err = executor
            .execute(&LoopKind::ForEach, &[], None, false, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Expression(ExpressionError::InvalidExpression(_))
        ));
    }

    #[tokio::test]
    async fn test_while_loop_condition_false() {
        let executor = LoopExecutor::new();
        let mut ctx = context();
        ctx.set_variable("countdown", json!(0));

        let outcome = executor
            .execute(
                &LoopKind::While {
                    condition: ConditionExpression::simple("variables.countdown > 0"),
                },
                &[WorkflowStep::delay("never", 1)],
                None,
                false,
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations_completed, 0);
        assert_eq!(outcome.break_reason, BreakReason::ConditionFalse);
    }

    #[tokio::test]
    async fn test_while_loop_max_iterations() {
        let executor = LoopExecutor::new();
        let mut ctx = context();
        ctx.set_variable("always", json!(true));

        let outcome = executor
            .execute(
                &LoopKind::While {
                    condition: ConditionExpression::simple("variables.always == true"),
                },
                &[],
                Some(5),
                false,
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations_completed, 5);
        assert_eq!(outcome.break_reason, BreakReason::MaxIterationsReached);
    }

    #[tokio::test]
    async fn test_explicit_break_variable() {
        let executor = LoopExecutor::new();
        let mut ctx = context();

        // A tool-free body that sets the break variable is simulated by a
        // transform writing nothing; instead seed the break up front and
        // confirm the first iteration stops the loop.
        ctx.set_variable(BREAK_VARIABLE, json!(true));

        let outcome = executor
            .execute(
                &LoopKind::For { count: Some(10) },
                &[WorkflowStep::delay("tick", 1)],
                None,
                false,
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations_completed, 1);
        assert_eq!(outcome.break_reason, BreakReason::ExplicitBreak);
        assert!(!ctx.variables.contains_key(BREAK_VARIABLE));
    }
}
