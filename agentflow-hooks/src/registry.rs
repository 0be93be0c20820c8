// ABOUTME: HookRegistry owning factories, instances, per-point chains, and the global chain
// ABOUTME: Provides PointExecutor running the global chain before the point-specific chain

use crate::chain::HookChain;
use crate::context::HookContext;
use crate::error::HookError;
use crate::result::HookResult;
use crate::traits::ArcHook;
use crate::types::{HookMetadata, HookPoint};
use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Factory constructing a hook instance from opaque configuration.
pub type HookFactory = Arc<dyn Fn(Option<JsonValue>) -> Result<ArcHook> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    factories: HashMap<String, HookFactory>,
    instances: HashMap<String, ArcHook>,
    metadata: HashMap<String, HookMetadata>,
    point_chains: HashMap<HookPoint, HookChain>,
    global_chain: HookChain,
}

/// Registry statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub total_hooks: usize,
    pub global_hooks: usize,
    pub hooks_by_point: HashMap<HookPoint, usize>,
    pub registered_factories: usize,
}

/// Thread-safe hook registry.
///
/// A registered hook lands in the chain of every explicit supported point,
/// or in the global chain when it declares no explicit points (or the
/// wildcard). All mutation and lookup is serialized under one mutex; chain
/// execution runs on cloned snapshots so no lock is held while hooks run.
#[derive(Clone, Default)]
pub struct HookRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a hook type id.
    pub fn register_factory(&self, type_id: impl Into<String>, factory: HookFactory) {
        let type_id = type_id.into();
        debug!(type_id = %type_id, "registered hook factory");
        self.inner.lock().factories.insert(type_id, factory);
    }

    /// Creates a hook through its factory and registers the instance.
    /// Returns the new hook's id.
    pub async fn create_hook(
        &self,
        type_id: &str,
        config: Option<JsonValue>,
    ) -> Result<String> {
        let factory = self
            .inner
            .lock()
            .factories
            .get(type_id)
            .cloned()
            .ok_or_else(|| HookError::HookTypeNotFound(type_id.to_string()))?;

        let hook = factory(config.clone())?;
        if let Some(ref config) = config {
            hook.validate_config(config)?;
        }

        let id = hook.metadata().id.clone();
        self.register_hook(hook).await?;
        Ok(id)
    }

    /// Registers a hook instance, placing it in the chains matching its
    /// supported points. A duplicate id replaces the prior instance, which
    /// is deinitialized.
    pub async fn register_hook(&self, hook: ArcHook) -> Result<()> {
        hook.init().await?;

        let metadata = hook.metadata();
        let replaced = {
            let mut inner = self.inner.lock();

            let replaced = inner.instances.remove(&metadata.id);
            if replaced.is_some() {
                Self::remove_from_chains(&mut inner, &metadata.id);
            }

            if metadata.is_global() {
                inner.global_chain.add(hook.clone());
            } else {
                for point in &metadata.supported_points {
                    inner
                        .point_chains
                        .entry(*point)
                        .or_default()
                        .add(hook.clone());
                }
            }

            inner.instances.insert(metadata.id.clone(), hook);
            inner.metadata.insert(metadata.id.clone(), metadata.clone());
            replaced
        };

        if let Some(old) = replaced {
            warn!(hook = %metadata.id, "replaced existing hook instance");
            if let Err(err) = old.deinit().await {
                warn!(hook = %metadata.id, error = %err, "deinit of replaced hook failed");
            }
        }

        info!(
            hook = %metadata.id,
            priority = metadata.priority.0,
            points = metadata.supported_points.len(),
            "registered hook"
        );
        Ok(())
    }

    /// Removes a hook instance from the registry and all chains.
    pub async fn remove_hook(&self, hook_id: &str) -> Result<()> {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner
                .instances
                .remove(hook_id)
                .ok_or_else(|| HookError::HookNotFound(hook_id.to_string()))?;
            inner.metadata.remove(hook_id);
            Self::remove_from_chains(&mut inner, hook_id);
            removed
        };

        removed.deinit().await?;
        info!(hook = %hook_id, "removed hook");
        Ok(())
    }

    fn remove_from_chains(inner: &mut RegistryInner, hook_id: &str) {
        inner.global_chain.remove(hook_id);
        for chain in inner.point_chains.values_mut() {
            chain.remove(hook_id);
        }
        inner.point_chains.retain(|_, chain| !chain.is_empty());
    }

    /// Enables or disables a hook in every chain it belongs to.
    pub fn set_hook_enabled(&self, hook_id: &str, enabled: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let metadata = inner
            .metadata
            .get_mut(hook_id)
            .ok_or_else(|| HookError::HookNotFound(hook_id.to_string()))?;
        metadata.enabled = enabled;

        inner.global_chain.set_enabled(hook_id, enabled);
        for chain in inner.point_chains.values_mut() {
            chain.set_enabled(hook_id, enabled);
        }
        Ok(())
    }

    pub fn has_hook(&self, hook_id: &str) -> bool {
        self.inner.lock().instances.contains_key(hook_id)
    }

    pub fn hook_metadata(&self, hook_id: &str) -> Option<HookMetadata> {
        self.inner.lock().metadata.get(hook_id).cloned()
    }

    /// Binds the global chain and the point-specific chain into one
    /// executor. The snapshots are taken under the registry lock; execution
    /// itself holds no lock.
    pub fn executor_for_point(&self, point: HookPoint) -> PointExecutor {
        let inner = self.inner.lock();
        PointExecutor {
            point,
            global_chain: inner.global_chain.clone(),
            point_chain: inner.point_chains.get(&point).cloned().unwrap_or_default(),
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            total_hooks: inner.instances.len(),
            global_hooks: inner.global_chain.len(),
            hooks_by_point: inner
                .point_chains
                .iter()
                .map(|(point, chain)| (*point, chain.len()))
                .collect(),
            registered_factories: inner.factories.len(),
        }
    }

    /// Convenience lookup of the ids registered for a point, highest
    /// priority first.
    pub fn hook_ids_for_point(&self, point: HookPoint) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .point_chains
            .get(&point)
            .map(|chain| chain.hook_ids())
            .unwrap_or_default()
    }
}

/// Runs the global chain, then the point chain, for one hook point.
///
/// Modified data and metrics from the global chain feed the point chain;
/// an error or halt from either stops further execution.
pub struct PointExecutor {
    point: HookPoint,
    global_chain: HookChain,
    point_chain: HookChain,
}

impl PointExecutor {
    pub fn point(&self) -> HookPoint {
        self.point
    }

    pub fn hook_count(&self) -> usize {
        self.global_chain.len() + self.point_chain.len()
    }

    pub async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        let global_result = self.global_chain.execute(context).await?;
        if !global_result.should_continue() {
            return Ok(global_result);
        }

        let point_result = self.point_chain.execute(context).await?;
        Ok(Self::merge(global_result, point_result))
    }

    fn merge(global: HookResult, point: HookResult) -> HookResult {
        HookResult {
            continue_processing: point.continue_processing,
            modified_data: point.modified_data.or(global.modified_data),
            metrics: point.metrics.or(global.metrics),
            error_info: point.error_info.or(global.error_info),
        }
    }
}
