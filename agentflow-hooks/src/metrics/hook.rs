// ABOUTME: MetricsHook counting executions per point plus TimingMiddleware for durations
// ABOUTME: Durations are measured around the downstream next call, not inside the hook

use super::MetricsRegistry;
use crate::context::HookContext;
use crate::middleware::{Middleware, Next};
use crate::result::HookResult;
use crate::traits::Hook;
use crate::types::{HookMetadata, Priority};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

fn point_labels(context: &HookContext) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("point".to_string(), context.point.to_string());
    labels
}

/// Counts chain executions per hook point in a shared registry.
///
/// This hook deliberately does not time anything: a hook only sees its own
/// invocation, so a meaningful duration has to be measured by middleware
/// wrapping the downstream call. Pair with [`TimingMiddleware`].
pub struct MetricsHook {
    registry: Arc<MetricsRegistry>,
    metadata: HookMetadata,
}

impl MetricsHook {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            metadata: HookMetadata {
                name: "metrics".to_string(),
                description: Some("Execution counters per hook point".to_string()),
                priority: Priority::LOW,
                tags: vec!["builtin".to_string(), "metrics".to_string()],
                ..HookMetadata::new("metrics_hook")
            },
        }
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        self.registry.clone()
    }
}

#[async_trait]
impl Hook for MetricsHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        self.registry
            .increment_counter("hook_point_executions_total", point_labels(context), 1);
        if context.point.is_error_point() {
            self.registry
                .increment_counter("hook_point_errors_total", point_labels(context), 1);
        }
        Ok(HookResult::ok())
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }
}

/// Observes downstream execution time into a histogram series
/// `hook_duration_seconds{point=...}`.
pub struct TimingMiddleware {
    registry: Arc<MetricsRegistry>,
    bounds: Vec<f64>,
}

impl TimingMiddleware {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            bounds: vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
        }
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult> {
        let labels = point_labels(context);
        // Series must exist before the first observation.
        self.registry.register_histogram(
            "hook_duration_seconds",
            "Hook execution duration",
            labels.clone(),
            self.bounds.clone(),
        );

        let started = Instant::now();
        let outcome = next.run(hook, context).await;
        self.registry.observe_histogram(
            "hook_duration_seconds",
            labels,
            started.elapsed().as_secs_f64(),
        );
        outcome
    }

    fn name(&self) -> &str {
        "timing"
    }
}
