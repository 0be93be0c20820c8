//! Integration tests for checkpointing workflow execution contexts
//! through the state manager, over memory and file backends.

use agentflow_workflows::{
    StateManager, WorkflowDefinition, WorkflowExecutionContext, WorkflowStateSnapshot,
};
use agentflow_state::{ExecutionState, FileBackend, MemoryBackend};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn fresh_context() -> WorkflowExecutionContext {
    let workflow = WorkflowDefinition::builder("pipeline").build();
    WorkflowExecutionContext::new(&workflow, json!({"document": "report.pdf"}))
}

#[tokio::test]
async fn checkpoint_restore_reverts_mutations() {
    let manager = StateManager::new(Arc::new(MemoryBackend::new()));
    let mut ctx = fresh_context();

    ctx.set_variable("step", json!(1));
    manager
        .create_checkpoint("cp1", ctx.to_snapshot(), HashMap::new())
        .await
        .unwrap();

    ctx.set_variable("step", json!(2));
    ctx.record_step_result("late_step", json!("should disappear"));

    let checkpoint = manager
        .restore_checkpoint(&ctx.workflow_id, &ctx.instance_id, "cp1")
        .await
        .unwrap();
    ctx.apply_snapshot(checkpoint.snapshot);

    assert_eq!(ctx.variables["step"], json!(1));
    assert!(!ctx.step_results.contains_key("late_step"));
}

#[tokio::test]
async fn full_state_round_trip_preserves_everything() {
    let manager = StateManager::new(Arc::new(MemoryBackend::new()));
    let mut ctx = fresh_context();

    ctx.execution_state = ExecutionState::Running;
    ctx.current_step = Some("transform".to_string());
    ctx.set_variable("count", json!(7));
    ctx.record_step_result("fetch", json!({"rows": 12}));

    manager.save_state(&ctx.to_snapshot()).await.unwrap();

    let loaded: WorkflowStateSnapshot = manager
        .load_state(&ctx.workflow_id, &ctx.instance_id)
        .await
        .unwrap();

    assert_eq!(loaded.execution_state, ExecutionState::Running);
    assert_eq!(loaded.current_step.as_deref(), Some("transform"));
    assert_eq!(loaded.variables["count"], json!(7));
    assert_eq!(loaded.step_results["fetch"], json!({"rows": 12}));
}

#[tokio::test]
async fn file_backend_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = fresh_context();
    ctx.set_variable("phase", json!("ingest"));

    {
        let backend = FileBackend::new(dir.path()).await.unwrap();
        let manager = StateManager::new(Arc::new(backend));
        manager
            .create_checkpoint("cp1", ctx.to_snapshot(), HashMap::new())
            .await
            .unwrap();
    }

    // A new backend over the same directory sees the checkpoint.
    let backend = FileBackend::new(dir.path()).await.unwrap();
    let manager = StateManager::new(Arc::new(backend));

    let ids = manager
        .list_checkpoints(&ctx.workflow_id, &ctx.instance_id)
        .await
        .unwrap();
    assert_eq!(ids, vec!["cp1"]);

    let checkpoint = manager
        .restore_checkpoint(&ctx.workflow_id, &ctx.instance_id, "cp1")
        .await
        .unwrap();
    assert_eq!(checkpoint.snapshot.variables["phase"], json!("ingest"));
}

#[tokio::test]
async fn missing_state_reports_key_not_found() {
    let manager = StateManager::new(Arc::new(MemoryBackend::new()));
    let err = manager.load_state("ghost", "nope").await.unwrap_err();
    assert!(matches!(err, agentflow_state::StateError::KeyNotFound(_)));
}
