// ABOUTME: Entry point for agentflow-hooks: chains, registry, middleware, filters, and built-ins
// ABOUTME: Re-exports the core types, traits, and implementations at the crate root

//! # Agentflow Hooks
//!
//! Interceptors for the agent/tool/provider/workflow lifecycle: priority
//! ordered chains, a thread-safe registry, an onion-model middleware
//! pipeline, filters, and cross-cutting built-ins (caching, rate limiting,
//! metrics, tracing, validation).
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentflow_hooks::{Hook, HookContext, HookPoint, HookResult, HookRegistry, FnHook};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = HookRegistry::new();
//! registry
//!     .register_hook(std::sync::Arc::new(FnHook::new("greeter", |ctx: &mut HookContext| {
//!         println!("hook at {}", ctx.point);
//!         Ok(HookResult::ok())
//!     })))
//!     .await?;
//!
//! let executor = registry.executor_for_point(HookPoint::AgentBeforeRun);
//! let mut context = HookContext::new(HookPoint::AgentBeforeRun);
//! let result = executor.execute(&mut context).await?;
//! assert!(result.should_continue());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chain;
pub mod composite;
pub mod context;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;
pub mod registry;
pub mod result;
pub mod trace;
pub mod traits;
pub mod types;
pub mod validation;

pub use cache::{CacheStorage, CachingHook, EvictionPolicy, InMemoryCacheStorage};
pub use chain::HookChain;
pub use composite::{CompositeHook, CompositionPattern};
pub use context::{
    AgentReference, EnhancedHookContext, HookContext, HookContextBuilder, SharedStateStore,
};
pub use error::HookError;
pub use filters::{
    CompositeFilter, FilteredHook, HookFilter, MetadataFilter, MetadataMatch, PointFilter,
    PredicateFilter, RateLimitFilter, TimeWindowFilter,
};
pub use metrics::{Collector, MetricsHook, MetricsRegistry, TimingMiddleware};
pub use middleware::{
    CacheMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, Next, RetryMiddleware,
    TransformMiddleware, ValidationMiddleware, ValidationPolicy,
};
pub use rate_limiter::{
    KeyStrategy, RateLimitDecision, RateLimitHook, RateLimiter, SlidingWindowLimiter,
    TokenBucketLimiter,
};
pub use registry::{HookFactory, HookRegistry, PointExecutor, RegistryStats};
pub use result::{ErrorInfo, HookResult};
pub use trace::{
    BatchSpanProcessor, Span, SpanExporter, SpanProcessor, TracingHook,
};
pub use traits::{ArcHook, BoxedHook, FnHook, Hook, HookExt};
pub use types::{HookMetadata, HookPoint, Priority};
pub use validation::{
    CompositeMode, CompositeValidator, CustomValidator, SchemaValidator, ValidationHook,
    ValidationIssue, ValidationResult, Validator,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        ArcHook, FnHook, Hook, HookChain, HookContext, HookExt, HookMetadata, HookPoint,
        HookRegistry, HookResult, Priority,
    };
    pub use anyhow::Result;
    pub use async_trait::async_trait;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _point = HookPoint::AgentBeforeRun;
        let _priority = Priority::HIGH;
        let _result = HookResult::ok();
        let _context = HookContext::new(HookPoint::WorkflowStart);
        let _registry = HookRegistry::new();
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
