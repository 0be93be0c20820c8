//! Integration tests for the parallel executor: concurrency speedup,
//! fail-fast, wait-for-all, and timeout behavior.

use agentflow_workflows::{
    FnTool, InMemoryComponentRegistry, ParallelConfig, ParallelExecutor, StepRunner, StepType,
    WorkflowDefinition, WorkflowStep,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn three_delays_run_concurrently() {
    let workflow = WorkflowDefinition::builder("fan_out")
        .step(WorkflowStep::delay("a", 10))
        .step(WorkflowStep::delay("b", 15))
        .step(WorkflowStep::delay("c", 5))
        .build();

    let executor = ParallelExecutor::with_config(ParallelConfig {
        max_concurrency: Some(3),
        ..ParallelConfig::default()
    });
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 3);
    // Sequential execution would need >= 30 ms; concurrent needs ~15.
    assert!(
        result.execution_time_ms < 25,
        "took {} ms",
        result.execution_time_ms
    );
    assert!(result.step_results.contains_key("a"));
    assert!(result.step_results.contains_key("b"));
    assert!(result.step_results.contains_key("c"));
}

#[tokio::test]
async fn concurrency_bound_serializes_excess_steps() {
    let workflow = WorkflowDefinition::builder("bounded")
        .step(WorkflowStep::delay("a", 10))
        .step(WorkflowStep::delay("b", 10))
        .step(WorkflowStep::delay("c", 10))
        .step(WorkflowStep::delay("d", 10))
        .build();

    let executor = ParallelExecutor::with_config(ParallelConfig {
        max_concurrency: Some(2),
        ..ParallelConfig::default()
    });
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 4);
    // Two at a time: at least two 10 ms waves.
    assert!(
        result.execution_time_ms >= 20,
        "took {} ms",
        result.execution_time_ms
    );
}

#[tokio::test]
async fn fail_fast_returns_on_first_error() {
    let mut components = InMemoryComponentRegistry::new();
    components.register_tool(Arc::new(FnTool::new("explode", |_params| {
        anyhow::bail!("instant failure")
    })));

    let workflow = WorkflowDefinition::builder("failing_fast")
        .step(WorkflowStep::new(
            "bomb",
            StepType::Tool {
                tool_name: "explode".to_string(),
                parameters: json!({}),
            },
        ))
        .step(WorkflowStep::delay("slow_sibling", 200))
        .build();

    let executor = ParallelExecutor::with_config(ParallelConfig {
        fail_fast: true,
        ..ParallelConfig::default()
    })
    .with_runner(StepRunner::new().with_components(Arc::new(components)));

    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    assert_eq!(result.failed_step.as_deref(), Some("bomb"));
    // Returned without waiting for the 200 ms sibling; its result is
    // discarded, not cancelled.
    assert!(
        result.execution_time_ms < 150,
        "took {} ms",
        result.execution_time_ms
    );
}

#[tokio::test]
async fn without_fail_fast_all_steps_finish() {
    let mut components = InMemoryComponentRegistry::new();
    components.register_tool(Arc::new(FnTool::new("explode", |_params| {
        anyhow::bail!("boom")
    })));

    let workflow = WorkflowDefinition::builder("collect_all")
        .step(WorkflowStep::new(
            "bomb",
            StepType::Tool {
                tool_name: "explode".to_string(),
                parameters: json!({}),
            },
        ))
        .step(WorkflowStep::delay("survivor", 10))
        .build();

    let executor = ParallelExecutor::with_config(ParallelConfig {
        fail_fast: false,
        ..ParallelConfig::default()
    })
    .with_runner(StepRunner::new().with_components(Arc::new(components)));

    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    assert_eq!(result.completed_steps, 1);
    assert!(result.step_results.contains_key("survivor"));
    assert_eq!(result.failed_step.as_deref(), Some("bomb"));
}

#[tokio::test]
async fn timeout_abandons_outstanding_work() {
    let workflow = WorkflowDefinition::builder("stuck")
        .step(WorkflowStep::delay("fast", 5))
        .step(WorkflowStep::delay("endless", 500))
        .build();

    let executor = ParallelExecutor::with_config(ParallelConfig {
        timeout_ms: Some(50),
        ..ParallelConfig::default()
    });
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("timeout"));
    // The fast step's result was collected before the deadline.
    assert_eq!(result.completed_steps, 1);
    assert!(result.step_results.contains_key("fast"));
}

#[tokio::test]
async fn nested_parallel_inside_parallel_completes() {
    // A parallel step inside a parallel workflow falls back to batched
    // execution instead of re-entering the pool.
    let inner = StepType::Parallel {
        steps: vec![
            WorkflowStep::delay("inner_a", 5),
            WorkflowStep::delay("inner_b", 5),
        ],
    };

    let workflow = WorkflowDefinition::builder("nested")
        .step(WorkflowStep::new("outer", inner))
        .step(WorkflowStep::delay("sibling", 5))
        .build();

    let executor = ParallelExecutor::new();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute(&workflow, json!(null)),
    )
    .await
    .expect("nested parallel must not deadlock");

    assert!(result.success);
    assert_eq!(result.completed_steps, 2);
    assert_eq!(result.step_results["outer"]["completed_steps"], json!(2));
}
