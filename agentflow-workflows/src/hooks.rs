// ABOUTME: Bridge firing hook points from workflow executors into a hook registry
// ABOUTME: Hook failures are logged, never fatal; non-continue results cancel the run

use agentflow_hooks::{HookContext, HookPoint, HookRegistry, HookResult};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Optional hook dispatch used by every executor. With no registry
/// attached, every fire is a no-op continue.
#[derive(Clone, Default)]
pub struct WorkflowHooks {
    registry: Option<Arc<HookRegistry>>,
}

impl WorkflowHooks {
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn disabled() -> Self {
        Self { registry: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.is_some()
    }

    /// Fires the global and point chains for `point`. The step id, when
    /// present, lands in the context metadata so span pairing and filters
    /// can key on it.
    pub async fn fire(
        &self,
        point: HookPoint,
        run_id: Uuid,
        payload: JsonValue,
        step_id: Option<&str>,
    ) -> HookResult {
        let Some(registry) = &self.registry else {
            return HookResult::ok();
        };

        let mut context = HookContext::new(point)
            .with_run_id(run_id)
            .with_input(payload);
        if let Some(step_id) = step_id {
            context.insert_metadata("step_id", json!(step_id));
        }

        let executor = registry.executor_for_point(point);
        match executor.execute(&mut context).await {
            Ok(result) => result,
            Err(err) => {
                warn!(point = %point, error = %err, "hook dispatch failed");
                HookResult::ok()
            }
        }
    }
}
