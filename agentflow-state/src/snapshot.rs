// ABOUTME: Serializable workflow state snapshots and immutable checkpoints
// ABOUTME: Shared data model between the state manager and the workflow executors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Ready,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

/// Point-in-time serialization of a workflow execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStateSnapshot {
    pub workflow_id: String,
    pub instance_id: String,
    pub execution_state: ExecutionState,
    pub current_step: Option<String>,
    pub variables: HashMap<String, JsonValue>,
    pub step_results: HashMap<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowStateSnapshot {
    pub fn new(workflow_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            instance_id: instance_id.into(),
            execution_state: ExecutionState::Ready,
            current_step: None,
            variables: HashMap::new(),
            step_results: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Storage key for the live state of this instance.
    pub fn state_key(&self) -> String {
        format!("{}:{}", self.workflow_id, self.instance_id)
    }
}

/// Immutable checkpoint of a workflow execution. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: WorkflowStateSnapshot,
    pub metadata: HashMap<String, JsonValue>,
}

impl Checkpoint {
    pub fn new(id: impl Into<String>, snapshot: WorkflowStateSnapshot) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            snapshot,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Storage key for this checkpoint.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:checkpoint:{}",
            self.snapshot.workflow_id, self.snapshot.instance_id, self.id
        )
    }
}
