// ABOUTME: Onion-model middleware pipeline wrapping hook execution with a next continuation
// ABOUTME: Ships logging, retry, caching, transformation, and validation middleware

use crate::context::HookContext;
use crate::result::HookResult;
use crate::traits::Hook;
use crate::validation::Validator;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Continuation into the remainder of the pipeline.
///
/// Copyable so middleware may invoke the downstream stack zero or more
/// times (retry middleware runs it repeatedly; caching middleware may skip
/// it entirely).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub async fn run(self, hook: &dyn Hook, context: &mut HookContext) -> Result<HookResult> {
        match self.middleware.split_first() {
            Some((head, rest)) => {
                head.process(hook, context, Next { middleware: rest })
                    .await
            }
            None => hook.execute(context).await,
        }
    }
}

/// Wrapper with access to the context and the `next` continuation.
/// Middleware executes outside-in; results propagate inside-out.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult>;

    fn name(&self) -> &str {
        "middleware"
    }
}

/// Composes middleware around a terminal hook invocation.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.add(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub async fn execute(&self, hook: &dyn Hook, context: &mut HookContext) -> Result<HookResult> {
        Next {
            middleware: &self.middleware,
        }
        .run(hook, context)
        .await
    }
}

/// Records start, end, duration, and outcome of each hook invocation.
///
/// Duration is measured here, around the downstream `next` call, so it
/// covers the hook itself plus any inner middleware.
pub struct LoggingMiddleware {
    verbose: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult> {
        let hook_id = hook.metadata().id;
        if self.verbose {
            info!(hook = %hook_id, point = %context.point, "hook starting");
        } else {
            debug!(hook = %hook_id, point = %context.point, "hook starting");
        }

        let started = Instant::now();
        let outcome = next.run(hook, context).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(result) => {
                debug!(
                    hook = %hook_id,
                    point = %context.point,
                    elapsed_ms = elapsed.as_millis() as u64,
                    continues = result.continue_processing,
                    "hook finished"
                );
            }
            Err(err) => {
                warn!(
                    hook = %hook_id,
                    point = %context.point,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "hook failed"
                );
            }
        }
        outcome
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Retries a failing downstream invocation with linear delay; on
/// exhaustion returns the configured fallback or propagates the error.
pub struct RetryMiddleware {
    retry_count: u32,
    retry_delay: Duration,
    fallback: Option<HookResult>,
}

impl RetryMiddleware {
    pub fn new(retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            retry_count,
            retry_delay,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: HookResult) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult> {
        let mut last_error = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                // Linear delay: base * attempt number.
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match next.run(hook, context).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!(
                        hook = %hook.metadata().id,
                        attempt = attempt + 1,
                        error = %err,
                        "hook attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        match (&self.fallback, last_error) {
            (Some(fallback), _) => Ok(fallback.clone()),
            (None, Some(err)) => Err(err),
            (None, None) => Ok(HookResult::ok()),
        }
    }

    fn name(&self) -> &str {
        "retry"
    }
}

/// Cache key function: defaults to (hook id, point).
pub type CacheKeyFn = Arc<dyn Fn(&dyn Hook, &HookContext) -> String + Send + Sync>;

struct CachedResult {
    result: HookResult,
    stored_at: Instant,
}

/// Caches downstream results keyed on (hook id, point) or a user-supplied
/// key function. Entries honor a TTL; when the cache is full the oldest
/// entry (FIFO) is evicted. Unlike [`crate::cache::CachingHook`], this
/// middleware populates the cache itself.
pub struct CacheMiddleware {
    ttl: Duration,
    max_entries: usize,
    key_fn: Option<CacheKeyFn>,
    entries: Mutex<HashMap<String, CachedResult>>,
    insertion_order: Mutex<VecDeque<String>>,
}

impl CacheMiddleware {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            key_fn: None,
            entries: Mutex::new(HashMap::new()),
            insertion_order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_key_fn(mut self, key_fn: CacheKeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    fn key_for(&self, hook: &dyn Hook, context: &HookContext) -> String {
        match &self.key_fn {
            Some(f) => f(hook, context),
            None => format!("{}:{}", hook.metadata().id, context.point),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult> {
        let key = self.key_for(hook, context);

        if let Some(cached) = self.entries.lock().get(&key) {
            if cached.stored_at.elapsed() <= self.ttl {
                debug!(key = %key, "middleware cache hit");
                return Ok(cached.result.clone());
            }
        }

        let result = next.run(hook, context).await?;

        {
            let mut entries = self.entries.lock();
            let mut order = self.insertion_order.lock();

            if !entries.contains_key(&key) && entries.len() >= self.max_entries {
                if let Some(oldest) = order.pop_front() {
                    entries.remove(&oldest);
                }
            }
            if !entries.contains_key(&key) {
                order.push_back(key.clone());
            }
            entries.insert(
                key,
                CachedResult {
                    result: result.clone(),
                    stored_at: Instant::now(),
                },
            );
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "cache"
    }
}

/// JSON transformation applied around the downstream call.
pub type TransformFn = Arc<dyn Fn(JsonValue) -> JsonValue + Send + Sync>;

/// Pre-transforms `context.input_data`, post-transforms the result's
/// `modified_data`.
pub struct TransformMiddleware {
    pre: Option<TransformFn>,
    post: Option<TransformFn>,
}

impl TransformMiddleware {
    pub fn new() -> Self {
        Self {
            pre: None,
            post: None,
        }
    }

    pub fn with_pre(mut self, f: TransformFn) -> Self {
        self.pre = Some(f);
        self
    }

    pub fn with_post(mut self, f: TransformFn) -> Self {
        self.post = Some(f);
        self
    }
}

impl Default for TransformMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for TransformMiddleware {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult> {
        if let Some(pre) = &self.pre {
            context.input_data = pre(std::mem::take(&mut context.input_data));
        }

        let mut result = next.run(hook, context).await?;

        if let Some(post) = &self.post {
            if let Some(data) = result.modified_data.take() {
                result.modified_data = Some(post(data));
            }
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "transform"
    }
}

/// What to do when validation fails.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationPolicy {
    /// Return the validation failure to the caller.
    Propagate,
    /// Skip the hook and continue the chain.
    SkipHook,
    /// Return a configured default result.
    UseDefault(HookResult),
}

/// Validates input before and output after the downstream invocation.
pub struct ValidationMiddleware {
    input_validator: Option<Arc<dyn Validator>>,
    output_validator: Option<Arc<dyn Validator>>,
    policy: ValidationPolicy,
}

impl ValidationMiddleware {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            input_validator: None,
            output_validator: None,
            policy,
        }
    }

    pub fn with_input_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.input_validator = Some(validator);
        self
    }

    pub fn with_output_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.output_validator = Some(validator);
        self
    }

    fn on_invalid(&self, what: &str, summary: String) -> Result<HookResult> {
        match &self.policy {
            ValidationPolicy::Propagate => Ok(HookResult::from_error(
                crate::result::ErrorInfo::new(
                    format!("{} validation failed: {}", what, summary),
                    "ValidationError",
                ),
            )),
            ValidationPolicy::SkipHook => {
                debug!(what = %what, "validation failed; skipping hook");
                Ok(HookResult::ok())
            }
            ValidationPolicy::UseDefault(default) => Ok(default.clone()),
        }
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    async fn process(
        &self,
        hook: &dyn Hook,
        context: &mut HookContext,
        next: Next<'_>,
    ) -> Result<HookResult> {
        if let Some(validator) = &self.input_validator {
            let report = validator.validate(&context.input_data);
            if !report.valid {
                return self.on_invalid("input", report.summary());
            }
        }

        let result = next.run(hook, context).await?;

        if let (Some(validator), Some(data)) = (&self.output_validator, &result.modified_data) {
            let report = validator.validate(data);
            if !report.valid {
                return self.on_invalid("output", report.summary());
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "validation"
    }
}
