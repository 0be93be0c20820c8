// ABOUTME: Priority-ordered HookChain executing hooks with payload propagation
// ABOUTME: Re-sorts on every mutation; equal priorities keep insertion order

use crate::context::HookContext;
use crate::result::HookResult;
use crate::traits::ArcHook;
use crate::types::HookMetadata;
use anyhow::Result;
use tracing::{debug, trace};

#[derive(Clone)]
struct ChainEntry {
    hook: ArcHook,
    metadata: HookMetadata,
    sequence: u64,
}

/// Ordered sequence of hooks for one point (or the global position).
///
/// Entries are kept sorted by ascending priority; entries with equal
/// priority run in insertion order. Chains are small, so a full re-sort on
/// every mutation is fine.
#[derive(Clone, Default)]
pub struct HookChain {
    entries: Vec<ChainEntry>,
    next_sequence: u64,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hook: ArcHook) {
        let metadata = hook.metadata();
        self.entries.push(ChainEntry {
            hook,
            metadata,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        self.entries
            .sort_by_key(|entry| (entry.metadata.priority, entry.sequence));
    }

    /// Removes a hook by id. Returns true when the hook was present.
    pub fn remove(&mut self, hook_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.metadata.id != hook_id);
        before != self.entries.len()
    }

    pub fn contains(&self, hook_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.metadata.id == hook_id)
    }

    pub fn set_enabled(&mut self, hook_id: &str, enabled: bool) -> bool {
        let mut found = false;
        for entry in &mut self.entries {
            if entry.metadata.id == hook_id {
                entry.metadata.enabled = enabled;
                found = true;
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hook ids in execution order.
    pub fn hook_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.metadata.id.clone())
            .collect()
    }

    /// Executes the chain against the context.
    ///
    /// Each hook's `modified_data` is merged into the aggregate result and
    /// copied into `context.input_data` for the next hook. A hook returning
    /// `continue_processing = false` stops iteration. Disabled hooks and
    /// hooks whose supported points exclude the context's point are skipped
    /// with an implicit continue.
    pub async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        let mut aggregate = HookResult::ok();
        context.total_hooks = self.entries.len();

        for (index, entry) in self.entries.iter().enumerate() {
            context.hook_index = index;

            if !entry.metadata.enabled || !entry.metadata.applies_to(context.point) {
                trace!(hook = %entry.metadata.id, point = %context.point, "skipping hook");
                continue;
            }

            let result = entry.hook.execute(context).await?;

            if let Some(data) = result.modified_data {
                context.input_data = data.clone();
                aggregate.modified_data = Some(data);
            }
            if let Some(metrics) = result.metrics {
                aggregate.metrics = Some(metrics);
            }
            if let Some(error) = result.error_info {
                aggregate.continue_processing = error.recoverable;
                aggregate.error_info = Some(error);
            }

            if !result.continue_processing {
                debug!(
                    hook = %entry.metadata.id,
                    point = %context.point,
                    "hook stopped chain execution"
                );
                aggregate.continue_processing = false;
                break;
            }
        }

        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ErrorInfo;
    use crate::traits::FnHook;
    use crate::types::{HookPoint, Priority};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ordered_hook(id: &str, priority: Priority, log: Arc<parking_lot::Mutex<Vec<String>>>) -> ArcHook {
        let id_owned = id.to_string();
        Arc::new(
            FnHook::new(id, move |_ctx| {
                log.lock().push(id_owned.clone());
                Ok(HookResult::ok())
            })
            .with_metadata(
                HookMetadata::new(id)
                    .with_priority(priority)
                    .with_points(vec![HookPoint::AgentBeforeRun]),
            ),
        )
    }

    #[tokio::test]
    async fn test_priority_ordering_with_insertion_tiebreak() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut chain = HookChain::new();

        // Insert out of order; same-priority hooks keep insertion order.
        chain.add(ordered_hook("low", Priority::LOW, log.clone()));
        chain.add(ordered_hook("high", Priority::HIGH, log.clone()));
        chain.add(ordered_hook("normal_a", Priority::NORMAL, log.clone()));
        chain.add(ordered_hook("normal_b", Priority::NORMAL, log.clone()));

        let mut context = HookContext::new(HookPoint::AgentBeforeRun);
        let result = chain.execute(&mut context).await.unwrap();

        assert!(result.should_continue());
        assert_eq!(
            *log.lock(),
            vec!["high", "normal_a", "normal_b", "low"]
        );
        assert_eq!(context.total_hooks, 4);
    }

    #[tokio::test]
    async fn test_modified_data_feeds_next_hook() {
        let mut chain = HookChain::new();
        chain.add(Arc::new(FnHook::new("producer", |_ctx| {
            Ok(HookResult::modified(json!({"count": 1})))
        })));
        chain.add(Arc::new(FnHook::new("consumer", |ctx: &mut HookContext| {
            let count = ctx.input_data["count"].as_i64().unwrap_or(0);
            Ok(HookResult::modified(json!({"count": count + 1})))
        })));

        let mut context = HookContext::new(HookPoint::ToolBeforeExecute);
        let result = chain.execute(&mut context).await.unwrap();

        assert_eq!(result.modified_data, Some(json!({"count": 2})));
        assert_eq!(context.input_data, json!({"count": 2}));
    }

    #[tokio::test]
    async fn test_non_continue_stops_iteration() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();

        let mut chain = HookChain::new();
        chain.add(Arc::new(FnHook::new("halter", |_ctx| Ok(HookResult::halt()))));
        chain.add(Arc::new(FnHook::new("unreachable", move |_ctx| {
            invoked_clone.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::ok())
        })));

        let mut context = HookContext::new(HookPoint::AgentBeforeRun);
        let result = chain.execute(&mut context).await.unwrap();

        assert!(!result.continue_processing);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_point_not_invoked() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();

        let mut chain = HookChain::new();
        chain.add(Arc::new(
            FnHook::new("tool_only", move |_ctx| {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                Ok(HookResult::ok())
            })
            .with_metadata(
                HookMetadata::new("tool_only").with_points(vec![HookPoint::ToolBeforeExecute]),
            ),
        ));

        let mut context = HookContext::new(HookPoint::AgentBeforeRun);
        let result = chain.execute(&mut context).await.unwrap();

        assert!(result.should_continue());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recoverable_error_keeps_chain_alive() {
        let mut chain = HookChain::new();
        chain.add(Arc::new(FnHook::new("soft_failure", |_ctx| {
            Ok(HookResult {
                continue_processing: true,
                error_info: Some(ErrorInfo::new("transient", "Transient").recoverable()),
                ..HookResult::ok()
            })
        })));
        chain.add(Arc::new(FnHook::new("tail", |_ctx| {
            Ok(HookResult::modified(json!("tail ran")))
        })));

        let mut context = HookContext::new(HookPoint::AgentBeforeRun);
        let result = chain.execute(&mut context).await.unwrap();

        assert!(result.continue_processing);
        assert!(result.error_info.is_some());
        assert_eq!(result.modified_data, Some(json!("tail ran")));
    }

    #[tokio::test]
    async fn test_remove_and_disable() {
        let mut chain = HookChain::new();
        chain.add(Arc::new(FnHook::new("target", |_ctx| Ok(HookResult::ok()))));

        assert!(chain.contains("target"));
        assert!(chain.set_enabled("target", false));
        assert!(chain.remove("target"));
        assert!(!chain.remove("target"));
        assert!(chain.is_empty());
    }
}
