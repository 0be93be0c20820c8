// ABOUTME: WorkflowResult record returned by top-level workflow invocations
// ABOUTME: Carries success flag, per-step results, and wall-clock timing

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Outcome of one workflow (or nested step-list) execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub completed_steps: usize,
    pub failed_step: Option<String>,
    pub error_message: Option<String>,
    pub step_results: HashMap<String, JsonValue>,
    pub execution_time_ms: u64,
}

impl WorkflowResult {
    pub fn succeeded(
        completed_steps: usize,
        step_results: HashMap<String, JsonValue>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: true,
            completed_steps,
            failed_step: None,
            error_message: None,
            step_results,
            execution_time_ms,
        }
    }

    pub fn failed(
        completed_steps: usize,
        failed_step: impl Into<String>,
        error_message: impl Into<String>,
        step_results: HashMap<String, JsonValue>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            completed_steps,
            failed_step: Some(failed_step.into()),
            error_message: Some(error_message.into()),
            step_results,
            execution_time_ms,
        }
    }
}
