// ABOUTME: CachingHook intercepting chain execution with fingerprint lookups
// ABOUTME: Returns hits verbatim; population is the surrounding orchestrator's job

//! ## Composition contract
//!
//! The caching hook only *checks* the cache. On a hit it returns the stored
//! result, short-circuiting the rest of the chain. On a miss it records the
//! fingerprint under `cache.key` in the context metadata and continues; the
//! orchestrator that produced the downstream result is responsible for
//! writing it back through [`CachingHook::store`].

use super::{fingerprint, CacheStorage, EvictionPolicy, InMemoryCacheStorage};
use crate::context::HookContext;
use crate::result::HookResult;
use crate::traits::Hook;
use crate::types::{HookMetadata, HookPoint, Priority};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for [`CachingHook`].
#[derive(Clone)]
pub struct CacheHookConfig {
    /// Points at which lookups happen; other points pass through.
    pub cache_points: HashSet<HookPoint>,
    pub default_ttl: Option<Duration>,
    pub max_bytes: usize,
    pub max_entries: usize,
    pub eviction_policy: EvictionPolicy,
    /// Whether context metadata participates in the fingerprint.
    pub include_metadata_in_key: bool,
}

impl Default for CacheHookConfig {
    fn default() -> Self {
        Self {
            cache_points: [
                HookPoint::AgentBeforeRun,
                HookPoint::ToolBeforeExecute,
                HookPoint::ProviderBeforeRequest,
            ]
            .into_iter()
            .collect(),
            default_ttl: Some(Duration::from_secs(300)),
            max_bytes: 4 * 1024 * 1024,
            max_entries: 10_000,
            eviction_policy: EvictionPolicy::Lru,
            include_metadata_in_key: false,
        }
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheHookStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheHookStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hook storing chain results by input fingerprint.
pub struct CachingHook {
    storage: Arc<dyn CacheStorage>,
    config: CacheHookConfig,
    stats: Mutex<CacheHookStats>,
    metadata: HookMetadata,
}

impl CachingHook {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(InMemoryCacheStorage::new()), CacheHookConfig::default())
    }

    pub fn with_storage(storage: Arc<dyn CacheStorage>, config: CacheHookConfig) -> Self {
        Self {
            storage,
            config,
            stats: Mutex::new(CacheHookStats::default()),
            metadata: HookMetadata {
                name: "caching".to_string(),
                description: Some("Fingerprint cache over hook chain results".to_string()),
                // Runs early so hits skip as much work as possible, but
                // after rate limiting.
                priority: Priority::HIGH,
                tags: vec!["builtin".to_string(), "cache".to_string()],
                ..HookMetadata::new("caching_hook")
            },
        }
    }

    pub fn storage(&self) -> Arc<dyn CacheStorage> {
        self.storage.clone()
    }

    pub fn stats(&self) -> CacheHookStats {
        *self.stats.lock()
    }

    /// Computes the fingerprint for a context the same way `execute` does.
    pub fn key_for(&self, context: &HookContext) -> String {
        let metadata = self
            .config
            .include_metadata_in_key
            .then_some(&context.metadata);
        fingerprint(context.point, &context.input_data, metadata)
    }

    /// Population entry point for the orchestrator (see module docs).
    pub fn store(&self, key: String, result: HookResult) {
        self.storage.put(key, result, self.config.default_ttl);
    }

    fn over_limits(&self) -> bool {
        self.storage.total_bytes() > self.config.max_bytes
            || self.storage.len() > self.config.max_entries
    }
}

impl Default for CachingHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for CachingHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        if !self.metadata.enabled || !self.config.cache_points.contains(&context.point) {
            return Ok(HookResult::ok());
        }

        let key = self.key_for(context);

        if let Some(cached) = self.storage.get(&key) {
            self.stats.lock().hits += 1;
            debug!(key = %key, point = %context.point, "cache hit");
            context.insert_metadata("cache.hit", json!(true));
            return Ok(cached);
        }

        self.stats.lock().misses += 1;
        if self.over_limits() {
            // Evict down to 90% of the byte budget before new entries land.
            let target = self.config.max_bytes / 10 * 9;
            self.storage.evict(self.config.eviction_policy, target);
        }

        context.insert_metadata("cache.hit", json!(false));
        context.insert_metadata("cache.key", json!(key));
        Ok(HookResult::ok())
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }

    fn metrics(&self) -> Option<serde_json::Value> {
        let stats = self.stats();
        Some(json!({
            "hits": stats.hits,
            "misses": stats.misses,
            "hit_ratio": stats.hit_ratio(),
            "entries": self.storage.len(),
            "total_bytes": self.storage.total_bytes(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hook_for_point(point: HookPoint) -> CachingHook {
        let config = CacheHookConfig {
            cache_points: [point].into_iter().collect(),
            default_ttl: Some(Duration::from_secs(1)),
            ..CacheHookConfig::default()
        };
        CachingHook::with_storage(Arc::new(InMemoryCacheStorage::new()), config)
    }

    #[tokio::test]
    async fn test_cache_hit_returns_stored_result_verbatim() {
        let hook = hook_for_point(HookPoint::AgentBeforeRun);
        let input = json!({"prompt": "what is 2+2"});

        // Seed the cache the way an orchestrator would.
        let mut context = HookContext::new(HookPoint::AgentBeforeRun).with_input(input.clone());
        let key = hook.key_for(&context);
        hook.store(key, HookResult::halt().with_metrics(json!({"cached": true})));

        let result = hook.execute(&mut context).await.unwrap();
        assert!(!result.continue_processing);
        assert_eq!(result.metrics, Some(json!({"cached": true})));

        let stats = hook.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_cache_miss_marks_context_for_population() {
        let hook = hook_for_point(HookPoint::AgentBeforeRun);
        let mut context =
            HookContext::new(HookPoint::AgentBeforeRun).with_input(json!({"prompt": "hi"}));

        let result = hook.execute(&mut context).await.unwrap();
        assert!(result.should_continue());
        assert_eq!(context.get_metadata("cache.hit"), Some(&json!(false)));
        assert!(context.get_metadata("cache.key").is_some());
        assert_eq!(hook.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_point_passes_through() {
        let hook = hook_for_point(HookPoint::AgentBeforeRun);
        let mut context = HookContext::new(HookPoint::ToolBeforeExecute);

        let result = hook.execute(&mut context).await.unwrap();
        assert!(result.should_continue());
        assert!(context.get_metadata("cache.key").is_none());

        let stats = hook.stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[tokio::test]
    async fn test_hit_ratio() {
        let hook = hook_for_point(HookPoint::AgentBeforeRun);
        let mut context =
            HookContext::new(HookPoint::AgentBeforeRun).with_input(json!({"q": 1}));

        hook.execute(&mut context).await.unwrap(); // miss
        let key = hook.key_for(&context);
        hook.store(key, HookResult::halt());
        hook.execute(&mut context).await.unwrap(); // hit

        assert!((hook.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
