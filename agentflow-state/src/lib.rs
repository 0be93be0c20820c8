// ABOUTME: State persistence for agentflow providing checkpoint and restore over pluggable backends
// ABOUTME: Exports the StateBackend trait, memory/file backends, and the workflow StateManager

//! # Agentflow State
//!
//! Persistent state for workflow execution: full-state save/restore and
//! immutable checkpoints over a pluggable key/value backend.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentflow_state::{MemoryBackend, StateManager, StateResult, WorkflowStateSnapshot};
//! use std::sync::Arc;
//!
//! # async fn run() -> StateResult<()> {
//! let manager = StateManager::new(Arc::new(MemoryBackend::new()));
//! let snapshot = WorkflowStateSnapshot::new("pipeline", StateManager::generate_instance_id());
//! manager.save_state(&snapshot).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod manager;
pub mod snapshot;

pub use backend::{FileBackend, MemoryBackend, StateBackend};
pub use error::{StateError, StateResult};
pub use manager::{CheckpointStrategy, RecoveryStrategy, StateManager};
pub use snapshot::{Checkpoint, ExecutionState, WorkflowStateSnapshot};
