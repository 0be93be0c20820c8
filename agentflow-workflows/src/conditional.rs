// ABOUTME: ConditionalExecutor branching on an evaluated expression
// ABOUTME: Runs the chosen branch sequentially and records which side executed

use crate::conditions::evaluate;
use crate::context::WorkflowExecutionContext;
use crate::error::WorkflowError;
use crate::result::WorkflowResult;
use crate::sequential::SequentialExecutor;
use crate::steps::StepRunner;
use crate::types::{ConditionExpression, WorkflowStep};
use tracing::debug;

/// What a conditional step did.
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub condition: bool,
    /// `"true"` or `"false"`, the branch that ran.
    pub branch: &'static str,
    pub result: WorkflowResult,
}

/// Evaluates a condition and executes the matching branch.
#[derive(Clone, Default)]
pub struct ConditionalExecutor {
    runner: StepRunner,
}

impl ConditionalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(runner: StepRunner) -> Self {
        Self { runner }
    }

    /// Evaluator errors fail the conditional step; branch steps run through
    /// a nested sequential executor sharing this runner.
    pub async fn execute(
        &self,
        expression: &ConditionExpression,
        true_steps: &[WorkflowStep],
        false_steps: &[WorkflowStep],
        ctx: &mut WorkflowExecutionContext,
    ) -> Result<BranchOutcome, WorkflowError> {
        let condition = evaluate(expression, &ctx.projection())?;
        let (branch, steps) = if condition {
            ("true", true_steps)
        } else {
            ("false", false_steps)
        };
        debug!(condition, branch, "conditional step branching");

        let executor = SequentialExecutor::new().with_runner(self.runner.clone());
        let result = executor.execute_steps(steps, ctx).await;

        Ok(BranchOutcome {
            condition,
            branch,
            result,
        })
    }
}
