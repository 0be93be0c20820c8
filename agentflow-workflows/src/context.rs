// ABOUTME: WorkflowExecutionContext holding variables, step results, and lifecycle state
// ABOUTME: Converts to and from the persistable snapshot shape for checkpointing

use crate::types::WorkflowDefinition;
use agentflow_state::{ExecutionState, WorkflowStateSnapshot};
use agentflow_state::StateManager;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Mutable state of one workflow run. Owned by exactly one executor at a
/// time; parallel execution hands each worker its own clone and merges the
/// per-step results afterwards.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionContext {
    pub workflow_id: String,
    pub instance_id: String,
    /// Correlates hook contexts fired during this run.
    pub run_id: Uuid,
    pub variables: HashMap<String, JsonValue>,
    pub step_results: HashMap<String, JsonValue>,
    pub execution_state: ExecutionState,
    pub current_step: Option<String>,
    pub started_at: Instant,
}

impl WorkflowExecutionContext {
    /// Fresh context seeded with the workflow's variable defaults and
    /// `variables["input"] = input`.
    pub fn new(workflow: &WorkflowDefinition, input: JsonValue) -> Self {
        let mut variables = workflow.variable_defaults.clone();
        variables.insert("input".to_string(), input);

        Self {
            workflow_id: workflow.id.clone(),
            instance_id: StateManager::generate_instance_id(),
            run_id: Uuid::new_v4(),
            variables,
            step_results: HashMap::new(),
            execution_state: ExecutionState::Ready,
            current_step: None,
            started_at: Instant::now(),
        }
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: JsonValue) {
        self.variables.insert(key.into(), value);
    }

    pub fn get_variable(&self, key: &str) -> Option<&JsonValue> {
        self.variables.get(key)
    }

    pub fn record_step_result(&mut self, step_id: impl Into<String>, result: JsonValue) {
        self.step_results.insert(step_id.into(), result);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// JSON projection evaluated by condition expressions:
    /// `{variables, step_results, execution_state, current_step}`.
    pub fn projection(&self) -> JsonValue {
        json!({
            "variables": self.variables,
            "step_results": self.step_results,
            "execution_state": self.execution_state,
            "current_step": self.current_step,
        })
    }

    /// Snapshot for persistence and checkpoints.
    pub fn to_snapshot(&self) -> WorkflowStateSnapshot {
        WorkflowStateSnapshot {
            workflow_id: self.workflow_id.clone(),
            instance_id: self.instance_id.clone(),
            execution_state: self.execution_state,
            current_step: self.current_step.clone(),
            variables: self.variables.clone(),
            step_results: self.step_results.clone(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Replaces live state verbatim from a snapshot (checkpoint restore).
    pub fn apply_snapshot(&mut self, snapshot: WorkflowStateSnapshot) {
        self.workflow_id = snapshot.workflow_id;
        self.instance_id = snapshot.instance_id;
        self.execution_state = snapshot.execution_state;
        self.current_step = snapshot.current_step;
        self.variables = snapshot.variables;
        self.step_results = snapshot.step_results;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkflowDefinition;
    use serde_json::json;

    fn workflow() -> WorkflowDefinition {
        WorkflowDefinition::builder("wf")
            .variable_default("region", json!("eu"))
            .build()
    }

    #[test]
    fn test_new_context_seeds_input_and_defaults() {
        let ctx = WorkflowExecutionContext::new(&workflow(), json!({"q": 7}));

        assert_eq!(ctx.variables["input"], json!({"q": 7}));
        assert_eq!(ctx.variables["region"], json!("eu"));
        assert_eq!(ctx.execution_state, ExecutionState::Ready);
        assert!(ctx.current_step.is_none());
    }

    #[test]
    fn test_projection_shape() {
        let mut ctx = WorkflowExecutionContext::new(&workflow(), json!(null));
        ctx.execution_state = ExecutionState::Running;
        ctx.current_step = Some("s1".to_string());
        ctx.record_step_result("s0", json!("done"));

        let projection = ctx.projection();
        assert_eq!(projection["execution_state"], json!("running"));
        assert_eq!(projection["current_step"], json!("s1"));
        assert_eq!(projection["step_results"]["s0"], json!("done"));
        assert_eq!(projection["variables"]["region"], json!("eu"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut ctx = WorkflowExecutionContext::new(&workflow(), json!(1));
        ctx.execution_state = ExecutionState::Running;
        ctx.set_variable("step", json!(1));

        let snapshot = ctx.to_snapshot();

        ctx.set_variable("step", json!(2));
        ctx.execution_state = ExecutionState::Failed;

        ctx.apply_snapshot(snapshot);
        assert_eq!(ctx.variables["step"], json!(1));
        assert_eq!(ctx.execution_state, ExecutionState::Running);
    }
}
