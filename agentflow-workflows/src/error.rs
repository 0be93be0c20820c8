// ABOUTME: Workflow error taxonomy plus condition-expression evaluation errors
// ABOUTME: Executors convert step failures into these kinds for callers

use thiserror::Error;

/// Condition-expression evaluation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("not a number: {0}")]
    NotANumber(String),

    /// JSONPath and JavaScript dialects are declared but not implemented;
    /// they reject instead of silently evaluating to true.
    #[error("expression dialect not implemented: {0}")]
    ExpressionNotImplemented(String),
}

/// Errors produced by workflow executors and error handling.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("step '{step_id}' failed: {message}")]
    StepExecutionFailed { step_id: String, message: String },

    #[error("sub-workflow failed: {0}")]
    SubWorkflowFailed(String),

    #[error("retry limit exceeded for step '{step_id}' after {attempts} attempts")]
    RetryLimitExceeded { step_id: String, attempts: u32 },

    #[error("timeout exceeded: {0}")]
    TimeoutExceeded(String),

    #[error("compensation failed: {0}")]
    CompensationFailed(String),

    #[error("circuit breaker open")]
    CircuitBreakerOpen,

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    State(#[from] agentflow_state::StateError),

    #[error("{0}")]
    Other(String),
}

impl WorkflowError {
    /// Error kind name used when matching against retriable error sets.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::StepExecutionFailed { .. } => "StepExecutionFailed",
            WorkflowError::SubWorkflowFailed(_) => "SubWorkflowFailed",
            WorkflowError::RetryLimitExceeded { .. } => "RetryLimitExceeded",
            WorkflowError::TimeoutExceeded(_) => "TimeoutExceeded",
            WorkflowError::CompensationFailed(_) => "CompensationFailed",
            WorkflowError::CircuitBreakerOpen => "CircuitBreakerOpen",
            WorkflowError::ComponentNotFound(_) => "ComponentNotFound",
            WorkflowError::Expression(_) => "ExpressionError",
            WorkflowError::State(_) => "StateError",
            WorkflowError::Other(_) => "Other",
        }
    }
}
