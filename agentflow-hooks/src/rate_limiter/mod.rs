// ABOUTME: Rate limiter capability with token-bucket and sliding-window algorithms
// ABOUTME: RateLimitHook short-circuits chains early and attaches X-RateLimit metadata

pub mod sliding_window;
pub mod token_bucket;

pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use crate::context::HookContext;
use crate::result::{ErrorInfo, HookResult};
use crate::traits::Hook;
use crate::types::{HookMetadata, Priority};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: f64,
    /// When the limiter's budget is fully available again.
    pub reset_time: DateTime<Utc>,
    /// How long to wait before retrying a denied request.
    pub retry_after: Option<Duration>,
}

/// Limiter capability shared by both algorithms.
pub trait RateLimiter: Send + Sync {
    /// Checks and, when allowed, consumes `cost` from the budget of `key`.
    fn check_limit(&self, key: &str, cost: f64) -> RateLimitDecision;

    /// Restores the key's budget to full.
    fn reset(&self, key: &str);

    /// Non-consuming view of a key's budget.
    fn status(&self, key: &str) -> RateLimitDecision;

    /// Configured request budget, for reporting headers.
    fn limit(&self) -> f64;
}

/// How the per-request limiter key is derived from the context.
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// One shared bucket for everything.
    #[default]
    Global,
    /// Per-agent buckets from the context's agent reference.
    AgentId,
    /// One bucket per hook point.
    HookPoint,
    /// Caller-supplied derivation.
    Custom(Arc<dyn Fn(&HookContext) -> String + Send + Sync>),
}

impl KeyStrategy {
    pub fn derive(&self, context: &HookContext) -> String {
        match self {
            KeyStrategy::Global => "global".to_string(),
            KeyStrategy::AgentId => context
                .agent
                .as_ref()
                .map(|a| a.agent_id.clone())
                .unwrap_or_else(|| "unknown-agent".to_string()),
            KeyStrategy::HookPoint => context.point.to_string(),
            KeyStrategy::Custom(f) => f(context),
        }
    }
}

/// Counters kept by the rate-limit hook.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub requests: u64,
    pub blocked: u64,
    pub total_cost: f64,
}

impl RateLimitStats {
    pub fn block_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.blocked as f64 / self.requests as f64
        }
    }
}

/// Hook denying over-limit requests before any other work happens.
///
/// Runs at `Priority::HIGHEST` so a denial short-circuits the rest of the
/// chain. Denials carry `error_type = "RateLimitError"` plus the
/// standard `X-RateLimit-*` metadata entries.
pub struct RateLimitHook {
    limiter: Arc<dyn RateLimiter>,
    key_strategy: KeyStrategy,
    cost_per_request: f64,
    block_on_limit: bool,
    stats: Mutex<RateLimitStats>,
    metadata: HookMetadata,
}

impl RateLimitHook {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            key_strategy: KeyStrategy::Global,
            cost_per_request: 1.0,
            block_on_limit: true,
            stats: Mutex::new(RateLimitStats::default()),
            metadata: HookMetadata {
                name: "rate_limit".to_string(),
                description: Some("Request admission control".to_string()),
                priority: Priority::HIGHEST,
                tags: vec!["builtin".to_string(), "rate-limit".to_string()],
                ..HookMetadata::new("rate_limit_hook")
            },
        }
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_per_request = cost;
        self
    }

    /// When false, over-limit requests are only observed, never blocked.
    pub fn with_block_on_limit(mut self, block: bool) -> Self {
        self.block_on_limit = block;
        self
    }

    pub fn stats(&self) -> RateLimitStats {
        *self.stats.lock()
    }

    fn attach_headers(context: &mut HookContext, limit: f64, decision: &RateLimitDecision) {
        context.insert_metadata("X-RateLimit-Limit", json!(limit));
        context.insert_metadata("X-RateLimit-Remaining", json!(decision.remaining.max(0.0)));
        context.insert_metadata(
            "X-RateLimit-Reset",
            json!(decision.reset_time.timestamp()),
        );
        if let Some(retry_after) = decision.retry_after {
            context.insert_metadata(
                "X-RateLimit-Retry-After",
                json!(retry_after.as_millis() as u64),
            );
        }
    }
}

#[async_trait]
impl Hook for RateLimitHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        let key = self.key_strategy.derive(context);
        let decision = self.limiter.check_limit(&key, self.cost_per_request);

        {
            let mut stats = self.stats.lock();
            stats.requests += 1;
            stats.total_cost += self.cost_per_request;
            if !decision.allowed {
                stats.blocked += 1;
            }
        }

        Self::attach_headers(context, self.limiter.limit(), &decision);

        if decision.allowed {
            debug!(key = %key, remaining = decision.remaining, "rate limit allowed");
            return Ok(HookResult::ok());
        }

        warn!(key = %key, retry_after = ?decision.retry_after, "rate limit exceeded");
        if !self.block_on_limit {
            return Ok(HookResult::ok());
        }

        let mut error = ErrorInfo::new(
            format!("rate limit exceeded for key '{}'", key),
            "RateLimitError",
        )
        .recoverable();
        if let Some(retry_after) = decision.retry_after {
            error = error.with_retry_after_ms(retry_after.as_millis() as u64);
        }

        Ok(HookResult {
            continue_processing: false,
            error_info: Some(error),
            ..HookResult::ok()
        })
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }

    fn metrics(&self) -> Option<serde_json::Value> {
        let stats = self.stats();
        Some(json!({
            "requests": stats.requests,
            "blocked": stats.blocked,
            "total_cost": stats.total_cost,
            "block_rate": stats.block_rate(),
        }))
    }
}
