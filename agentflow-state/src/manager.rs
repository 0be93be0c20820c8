// ABOUTME: StateManager persisting workflow snapshots and checkpoints over a StateBackend
// ABOUTME: Owns key layout, instance-id generation, and checkpoint/recovery strategy types

use crate::backend::StateBackend;
use crate::error::{StateError, StateResult};
use crate::snapshot::{Checkpoint, WorkflowStateSnapshot};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// When the executor should write checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStrategy {
    #[default]
    Never,
    OnStepCompletion,
    OnMilestone,
    Periodic,
    OnStateChange,
}

/// How a restarted workflow instance resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    #[default]
    RestartFromBeginning,
    ResumeFromCheckpoint,
    ResumeFromLastSuccessfulStep,
    Custom,
}

/// Persists workflow execution state through a pluggable backend.
///
/// Live state lives under `<workflow_id>:<instance_id>`; checkpoints under
/// `<workflow_id>:<instance_id>:checkpoint:<cp_id>`.
#[derive(Debug, Clone)]
pub struct StateManager {
    backend: Arc<dyn StateBackend>,
}

impl StateManager {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }

    /// Fresh instance id: microsecond timestamp plus a random 32-bit
    /// suffix, both hex.
    pub fn generate_instance_id() -> String {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let suffix: u32 = rand::thread_rng().gen();
        format!("{:x}-{:08x}", micros, suffix)
    }

    pub async fn save_state(&self, snapshot: &WorkflowStateSnapshot) -> StateResult<()> {
        let key = snapshot.state_key();
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        self.backend.save(&key, &bytes).await?;
        debug!(key = %key, state = ?snapshot.execution_state, "saved workflow state");
        Ok(())
    }

    pub async fn load_state(
        &self,
        workflow_id: &str,
        instance_id: &str,
    ) -> StateResult<WorkflowStateSnapshot> {
        let key = format!("{}:{}", workflow_id, instance_id);
        let bytes = self
            .backend
            .load(&key)
            .await?
            .ok_or_else(|| StateError::KeyNotFound(key.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| StateError::Serialization(e.to_string()))
    }

    pub async fn delete_state(&self, workflow_id: &str, instance_id: &str) -> StateResult<bool> {
        let key = format!("{}:{}", workflow_id, instance_id);
        self.backend.delete(&key).await
    }

    /// Writes an immutable checkpoint of the given snapshot and returns it.
    pub async fn create_checkpoint(
        &self,
        checkpoint_id: &str,
        snapshot: WorkflowStateSnapshot,
        metadata: HashMap<String, JsonValue>,
    ) -> StateResult<Checkpoint> {
        let mut checkpoint = Checkpoint::new(checkpoint_id, snapshot);
        checkpoint.metadata = metadata;

        let key = checkpoint.storage_key();
        let bytes = serde_json::to_vec(&checkpoint)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        self.backend.save(&key, &bytes).await?;
        info!(key = %key, "created checkpoint");
        Ok(checkpoint)
    }

    /// Loads a checkpoint; the returned snapshot replaces live context state
    /// verbatim on restore.
    pub async fn restore_checkpoint(
        &self,
        workflow_id: &str,
        instance_id: &str,
        checkpoint_id: &str,
    ) -> StateResult<Checkpoint> {
        let key = format!("{}:{}:checkpoint:{}", workflow_id, instance_id, checkpoint_id);
        let bytes = self
            .backend
            .load(&key)
            .await?
            .ok_or_else(|| StateError::KeyNotFound(key.clone()))?;
        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Serialization(e.to_string()))?;
        info!(key = %key, "restored checkpoint");
        Ok(checkpoint)
    }

    /// Checkpoint ids recorded for an instance, in key order.
    pub async fn list_checkpoints(
        &self,
        workflow_id: &str,
        instance_id: &str,
    ) -> StateResult<Vec<String>> {
        let prefix = format!("{}:{}:checkpoint:", workflow_id, instance_id);
        let pattern = format!("{}*", prefix);
        let keys = self.backend.list_keys(&pattern).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}
