//! Integration tests for hook points fired during workflow execution.

use agentflow_hooks::{
    FnHook, HookContext, HookMetadata, HookPoint, HookRegistry, HookResult,
};
use agentflow_workflows::{
    SequentialExecutor, StepRunner, WorkflowDefinition, WorkflowHooks, WorkflowStep,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

async fn registry_with_observer(log: Arc<Mutex<Vec<HookPoint>>>) -> Arc<HookRegistry> {
    let registry = Arc::new(HookRegistry::new());
    registry
        .register_hook(Arc::new(FnHook::new("observer", move |ctx: &mut HookContext| {
            log.lock().push(ctx.point);
            Ok(HookResult::ok())
        })))
        .await
        .unwrap();
    registry
}

#[tokio::test]
async fn lifecycle_points_fire_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_observer(log.clone()).await;

    let workflow = WorkflowDefinition::builder("observed")
        .step(WorkflowStep::delay("only_step", 1))
        .build();

    let runner = StepRunner::new().with_hooks(WorkflowHooks::new(registry));
    let executor = SequentialExecutor::new().with_runner(runner);
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(result.success);
    assert_eq!(
        *log.lock(),
        vec![
            HookPoint::WorkflowStart,
            HookPoint::WorkflowStepStart,
            HookPoint::WorkflowStepComplete,
            HookPoint::WorkflowComplete,
        ]
    );
}

#[tokio::test]
async fn step_error_point_fires_on_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_observer(log.clone()).await;

    // A foreach loop without items fails its step.
    let workflow = WorkflowDefinition::builder("failing")
        .step(WorkflowStep::new(
            "broken",
            agentflow_workflows::StepType::Loop {
                kind: agentflow_workflows::LoopKind::ForEach,
                body: vec![],
                max_iterations: None,
                break_on_error: false,
            },
        ))
        .build();

    let runner = StepRunner::new().with_hooks(WorkflowHooks::new(registry));
    let executor = SequentialExecutor::new().with_runner(runner);
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    let seen = log.lock();
    assert!(seen.contains(&HookPoint::WorkflowStepError));
    assert!(seen.contains(&HookPoint::WorkflowError));
    assert!(!seen.contains(&HookPoint::WorkflowComplete));
}

#[tokio::test]
async fn workflow_start_hook_can_cancel_the_run() {
    let registry = Arc::new(HookRegistry::new());
    registry
        .register_hook(Arc::new(
            FnHook::new("gatekeeper", |_ctx: &mut HookContext| Ok(HookResult::halt()))
                .with_metadata(
                    HookMetadata::new("gatekeeper").with_points(vec![HookPoint::WorkflowStart]),
                ),
        ))
        .await
        .unwrap();

    let workflow = WorkflowDefinition::builder("vetoed")
        .step(WorkflowStep::delay("never_runs", 1))
        .build();

    let runner = StepRunner::new().with_hooks(WorkflowHooks::new(registry));
    let executor = SequentialExecutor::new().with_runner(runner);
    let result = executor.execute(&workflow, json!(null)).await;

    assert!(!result.success);
    assert_eq!(result.completed_steps, 0);
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("cancelled"));
}
