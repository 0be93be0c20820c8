// ABOUTME: Entry point for agentflow-workflows: executors, conditions, and error handling
// ABOUTME: Re-exports the workflow data model and every executor at the crate root

//! # Agentflow Workflows
//!
//! Multi-step workflow orchestration over the hook system: sequential,
//! parallel, conditional, and loop executors with retry, circuit breaking,
//! compensation, and checkpointing through `agentflow-state`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentflow_workflows::{SequentialExecutor, WorkflowDefinition, WorkflowStep};
//! use serde_json::json;
//!
//! # async fn run() {
//! let workflow = WorkflowDefinition::builder("greeting")
//!     .step(WorkflowStep::delay("warmup", 10))
//!     .build();
//!
//! let executor = SequentialExecutor::new();
//! let result = executor.execute(&workflow, json!({"user": "ada"})).await;
//! assert!(result.success);
//! # }
//! ```

pub mod conditional;
pub mod conditions;
pub mod context;
pub mod error;
pub mod error_handling;
pub mod hooks;
pub mod loops;
pub mod parallel;
pub mod result;
pub mod script;
pub mod sequential;
pub mod steps;
pub mod traits;
pub mod types;

pub use conditional::{BranchOutcome, ConditionalExecutor};
pub use conditions::evaluate;
pub use context::WorkflowExecutionContext;
pub use error::{ExpressionError, WorkflowError};
pub use error_handling::{
    BackoffStrategy, BreakerConfig, BreakerState, CircuitBreaker, CompensationAction,
    CompensationKind, ErrorDirective, ErrorRecord, FallbackStrategy, RetryPolicy,
    WorkflowErrorHandler,
};
pub use hooks::WorkflowHooks;
pub use loops::{BreakReason, LoopConfig, LoopExecutor, LoopOutcome};
pub use parallel::{ParallelConfig, ParallelExecutor};
pub use result::WorkflowResult;
pub use script::ScriptInterpreter;
pub use sequential::{SequentialConfig, SequentialExecutor};
pub use steps::StepRunner;
pub use traits::{
    AgentHandle, ComponentRegistry, FnAgent, FnTool, InMemoryComponentRegistry, ToolHandle,
};
pub use types::{
    ConditionExpression, LoopKind, StepType, WorkflowDefinition, WorkflowDefinitionBuilder,
    WorkflowStep,
};

// Re-exported so callers manage persistence without a direct dependency.
pub use agentflow_state::{
    Checkpoint, CheckpointStrategy, ExecutionState, RecoveryStrategy, StateManager,
    WorkflowStateSnapshot,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
