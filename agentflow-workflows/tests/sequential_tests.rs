//! Integration tests for the sequential executor: ordering, retries,
//! continue-on-error, and timeouts.

use agentflow_workflows::{
    FnTool, InMemoryComponentRegistry, SequentialConfig, SequentialExecutor, StepRunner, StepType,
    WorkflowDefinition, WorkflowStep,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn runner_with_tools(registry: InMemoryComponentRegistry) -> StepRunner {
    StepRunner::new().with_components(Arc::new(registry))
}

#[tokio::test]
async fn delay_workflow_completes_and_takes_time() {
    let workflow = WorkflowDefinition::builder("single_delay")
        .step(WorkflowStep::delay("pause", 10))
        .build();

    let executor = SequentialExecutor::new();
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 1);
    assert!(result.failed_step.is_none());
    assert!(result.execution_time_ms >= 10);
    assert!(result.step_results.contains_key("pause"));
}

#[tokio::test]
async fn steps_run_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let order_clone = order.clone();

    let mut components = InMemoryComponentRegistry::new();
    components.register_tool(Arc::new(FnTool::new("record", move |params| {
        order_clone.lock().push(params["label"].as_str().unwrap_or("").to_string());
        Ok(json!("ok"))
    })));

    let tool_step = |id: &str| {
        WorkflowStep::new(
            id,
            StepType::Tool {
                tool_name: "record".to_string(),
                parameters: json!({"label": id}),
            },
        )
    };

    let workflow = WorkflowDefinition::builder("ordered")
        .step(tool_step("first"))
        .step(tool_step("second"))
        .step(tool_step("third"))
        .build();

    let executor = SequentialExecutor::new().with_runner(runner_with_tools(components));
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 3);
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn step_retries_until_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();

    let mut components = InMemoryComponentRegistry::new();
    components.register_tool(Arc::new(FnTool::new("flaky", move |_params| {
        if attempts_clone.fetch_add(1, Ordering::SeqCst) < 2 {
            anyhow::bail!("transient failure")
        }
        Ok(json!("recovered"))
    })));

    let workflow = WorkflowDefinition::builder("retrying")
        .step(
            WorkflowStep::new(
                "unstable",
                StepType::Tool {
                    tool_name: "flaky".to_string(),
                    parameters: json!({}),
                },
            )
            .with_retries(3, 1),
        )
        .build();

    let executor = SequentialExecutor::new().with_runner(runner_with_tools(components));
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.step_results["unstable"], json!("recovered"));
}

#[tokio::test]
async fn failure_without_continue_on_error_aborts() {
    let mut components = InMemoryComponentRegistry::new();
    components.register_tool(Arc::new(FnTool::new("broken", |_params| {
        anyhow::bail!("permanently broken")
    })));

    let workflow = WorkflowDefinition::builder("aborting")
        .step(WorkflowStep::delay("ok_step", 1))
        .step(WorkflowStep::new(
            "bad_step",
            StepType::Tool {
                tool_name: "broken".to_string(),
                parameters: json!({}),
            },
        ))
        .step(WorkflowStep::delay("never_runs", 1))
        .build();

    let executor = SequentialExecutor::new().with_runner(runner_with_tools(components));
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    assert_eq!(result.completed_steps, 1);
    assert_eq!(result.failed_step.as_deref(), Some("bad_step"));
    assert!(result.error_message.is_some());
    assert!(!result.step_results.contains_key("never_runs"));
}

#[tokio::test]
async fn continue_on_error_records_null_and_proceeds() {
    let mut components = InMemoryComponentRegistry::new();
    components.register_tool(Arc::new(FnTool::new("broken", |_params| {
        anyhow::bail!("still broken")
    })));

    let workflow = WorkflowDefinition::builder("tolerant")
        .step(
            WorkflowStep::new(
                "bad_step",
                StepType::Tool {
                    tool_name: "broken".to_string(),
                    parameters: json!({}),
                },
            )
            .with_continue_on_error(true),
        )
        .step(WorkflowStep::delay("tail", 1))
        .build();

    let executor = SequentialExecutor::new().with_runner(runner_with_tools(components));
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 2);
    assert_eq!(result.step_results["bad_step"], json!(null));
    assert!(result.step_results.contains_key("tail"));
}

#[tokio::test]
async fn workflow_timeout_fails_before_remaining_steps() {
    let workflow = WorkflowDefinition::builder("slow")
        .step(WorkflowStep::delay("long", 50))
        .step(WorkflowStep::delay("after_deadline", 1))
        .build();

    let executor = SequentialExecutor::with_config(SequentialConfig {
        timeout_ms: Some(20),
        ..SequentialConfig::default()
    });
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    assert_eq!(result.failed_step.as_deref(), Some("after_deadline"));
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("timeout"));
}

#[tokio::test]
async fn conditional_step_selects_branch_from_variables() {
    let workflow = WorkflowDefinition::builder("branching")
        .variable_default("threshold", json!(10))
        .step(WorkflowStep::new(
            "decide",
            StepType::Condition {
                expression: agentflow_workflows::ConditionExpression::simple(
                    "variables.threshold >= 10",
                ),
                true_steps: vec![WorkflowStep::delay("big", 1)],
                false_steps: vec![WorkflowStep::delay("small", 1)],
            },
        ))
        .build();

    let executor = SequentialExecutor::new();
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.step_results["decide"]["branch"], json!("true"));
    assert!(result.step_results.contains_key("big"));
    assert!(!result.step_results.contains_key("small"));
}
