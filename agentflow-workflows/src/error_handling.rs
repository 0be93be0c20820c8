// ABOUTME: Retry policy, circuit breaker, fallback strategies, and compensation
// ABOUTME: WorkflowErrorHandler turns step failures into retry/fallback/compensate directives

use crate::context::WorkflowExecutionContext;
use crate::error::WorkflowError;
use crate::steps::StepRunner;
use crate::types::WorkflowStep;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
    Fibonacci,
}

/// When and how often a failed step is retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: BackoffStrategy,
    /// Adds up to ±10% of the computed delay.
    pub jitter: bool,
    /// When set, only these error kinds retry.
    pub retriable_errors: Option<HashSet<String>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff: BackoffStrategy::default(),
            jitter: false,
            retriable_errors: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), capped at
    /// `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.initial_delay_ms;
        let raw = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Exponential => {
                base.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX))
            }
            BackoffStrategy::Fibonacci => base.saturating_mul(fibonacci(retry)),
        };
        let capped = raw.min(self.max_delay_ms);

        let with_jitter = if self.jitter && capped > 0 {
            let spread = (capped as f64) * 0.1;
            let offset: f64 = rand::thread_rng().gen_range(-spread..=spread);
            ((capped as f64) + offset).max(0.0) as u64
        } else {
            capped
        };
        Duration::from_millis(with_jitter)
    }

    /// Whether this error kind retries at all.
    pub fn retries(&self, error: &WorkflowError) -> bool {
        match &self.retriable_errors {
            Some(kinds) => kinds.contains(error.kind()),
            None => true,
        }
    }
}

/// Classic 1, 1, 2, 3, 5, ... multiplier sequence.
fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// How long the circuit stays open before probing.
    pub timeout_ms: u64,
    /// Probe budget while half-open.
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 30_000,
            half_open_max_attempts: 3,
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    half_open_attempts: u32,
    state_changed_at: Instant,
}

/// Three-state breaker shedding load after consecutive failures.
///
/// All transitions are serialized under one mutex.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_attempts: 0,
                state_changed_at: Instant::now(),
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a request may proceed. An open circuit transitions to
    /// half-open once `timeout_ms` has elapsed; half-open admits up to
    /// `half_open_max_attempts` probes.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if inner.state_changed_at.elapsed()
                    >= Duration::from_millis(self.config.timeout_ms)
                {
                    info!("circuit breaker probing: open -> half_open");
                    inner.state = BreakerState::HalfOpen;
                    inner.state_changed_at = Instant::now();
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.half_open_attempts = 1;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_attempts < self.config.half_open_max_attempts {
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    info!("circuit breaker recovered: half_open -> closed");
                    inner.state = BreakerState::Closed;
                    inner.state_changed_at = Instant::now();
                    inner.failure_count = 0;
                    inner.success_count = 0;
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!("circuit breaker tripped: closed -> open");
                    inner.state = BreakerState::Open;
                    inner.state_changed_at = Instant::now();
                }
            }
            BreakerState::HalfOpen => {
                warn!("circuit breaker probe failed: half_open -> open");
                inner.state = BreakerState::Open;
                inner.state_changed_at = Instant::now();
                inner.success_count = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_attempts = 0;
        inner.state_changed_at = Instant::now();
    }
}

/// What to produce when retries are exhausted.
#[derive(Clone)]
pub enum FallbackStrategy {
    /// Use this value as the step result.
    DefaultValue(JsonValue),
    /// Run a replacement step.
    FallbackStep(WorkflowStep),
    /// Delegate to another workflow by id (resolved by the caller).
    FallbackWorkflow(String),
    /// Arbitrary handler over the failure.
    CustomHandler(std::sync::Arc<dyn Fn(&WorkflowError) -> Option<JsonValue> + Send + Sync>),
}

impl std::fmt::Debug for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackStrategy::DefaultValue(v) => write!(f, "DefaultValue({})", v),
            FallbackStrategy::FallbackStep(s) => write!(f, "FallbackStep({})", s.id),
            FallbackStrategy::FallbackWorkflow(id) => write!(f, "FallbackWorkflow({})", id),
            FallbackStrategy::CustomHandler(_) => write!(f, "CustomHandler"),
        }
    }
}

/// Corrective action attached to a step, run in reverse order on failure.
#[derive(Clone)]
pub struct CompensationAction {
    pub step_id: String,
    pub action: CompensationKind,
    /// Higher order runs first during compensation.
    pub order: i32,
}

#[derive(Clone)]
pub enum CompensationKind {
    /// Run a dedicated undo step.
    UndoStep(WorkflowStep),
    /// Delegate to a compensation workflow by id (resolved by the caller).
    RunWorkflow(String),
    /// Arbitrary handler.
    CustomHandler(std::sync::Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>),
}

/// One recorded step failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub step_id: String,
    pub error_kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
}

/// What the caller should do about a step failure.
#[derive(Debug)]
pub enum ErrorDirective {
    /// Sleep the given delay, then retry the step.
    Retry { delay: Duration },
    /// Use this value as the step's result and move on.
    Fallback(JsonValue),
    /// Give up; compensation (if registered) has already run.
    Fail(WorkflowError),
}

/// Coordinates retry, breaker, fallback, and compensation for one workflow.
pub struct WorkflowErrorHandler {
    retry_policy: Option<RetryPolicy>,
    breaker: Option<std::sync::Arc<CircuitBreaker>>,
    fallback: Option<FallbackStrategy>,
    compensations: Vec<CompensationAction>,
    error_log: Mutex<Vec<ErrorRecord>>,
}

impl Default for WorkflowErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowErrorHandler {
    pub fn new() -> Self {
        Self {
            retry_policy: None,
            breaker: None,
            fallback: None,
            compensations: Vec::new(),
            error_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: std::sync::Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn register_compensation(mut self, action: CompensationAction) -> Self {
        self.compensations.push(action);
        self
    }

    pub fn error_log(&self) -> Vec<ErrorRecord> {
        self.error_log.lock().clone()
    }

    /// Decides what happens after a step failure on attempt `attempt`
    /// (0-based). The caller sleeps and retries, uses the fallback value,
    /// or treats the error as terminal.
    pub async fn handle_step_error(
        &self,
        step_id: &str,
        error: WorkflowError,
        attempt: u32,
        runner: &StepRunner,
        ctx: &mut WorkflowExecutionContext,
    ) -> ErrorDirective {
        self.error_log.lock().push(ErrorRecord {
            step_id: step_id.to_string(),
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
            attempt,
        });

        if let Some(breaker) = &self.breaker {
            breaker.record_failure();
            if !breaker.allow_request() {
                return ErrorDirective::Fail(WorkflowError::CircuitBreakerOpen);
            }
        }

        if let Some(policy) = &self.retry_policy {
            if attempt + 1 < policy.max_attempts && policy.retries(&error) {
                return ErrorDirective::Retry {
                    delay: policy.delay_for(attempt),
                };
            }
        }

        match self.apply_fallback(step_id, &error, runner, ctx).await {
            Some(value) => ErrorDirective::Fallback(value),
            None => {
                if let Err(compensation_error) = self.run_compensations(step_id, runner, ctx).await
                {
                    return ErrorDirective::Fail(compensation_error);
                }
                ErrorDirective::Fail(error)
            }
        }
    }

    async fn apply_fallback(
        &self,
        step_id: &str,
        error: &WorkflowError,
        runner: &StepRunner,
        ctx: &mut WorkflowExecutionContext,
    ) -> Option<JsonValue> {
        let fallback = self.fallback.as_ref()?;
        let result = match fallback {
            FallbackStrategy::DefaultValue(value) => Some(value.clone()),
            FallbackStrategy::FallbackStep(step) => {
                match runner.run_step(step, ctx, true).await {
                    Ok(value) => Some(value),
                    Err(fallback_error) => {
                        warn!(
                            step = %step_id,
                            error = %fallback_error,
                            "fallback step failed"
                        );
                        None
                    }
                }
            }
            FallbackStrategy::FallbackWorkflow(workflow_id) => {
                // Resolution of whole workflows lives outside the core;
                // record the delegation for the caller.
                ctx.set_variable(
                    "fallback_workflow",
                    JsonValue::String(workflow_id.clone()),
                );
                None
            }
            FallbackStrategy::CustomHandler(handler) => handler(error),
        };

        if result.is_some() {
            info!(step = %step_id, "fallback produced a result");
        }
        result
    }

    /// Runs compensations registered for steps up to and including the
    /// failed one, highest `order` first.
    pub async fn run_compensations(
        &self,
        failed_step_id: &str,
        runner: &StepRunner,
        ctx: &mut WorkflowExecutionContext,
    ) -> Result<(), WorkflowError> {
        // Registration order mirrors step order; everything registered up
        // to and including the failed step participates.
        let cutoff = self
            .compensations
            .iter()
            .position(|action| action.step_id == failed_step_id)
            .map(|pos| pos + 1)
            .unwrap_or(self.compensations.len());
        let mut applicable: Vec<&CompensationAction> =
            self.compensations[..cutoff].iter().collect();
        applicable.sort_by(|a, b| b.order.cmp(&a.order));

        for action in applicable {
            info!(step = %action.step_id, "running compensation");
            let outcome = match &action.action {
                CompensationKind::UndoStep(step) => runner
                    .run_step(step, ctx, true)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                CompensationKind::RunWorkflow(workflow_id) => {
                    ctx.set_variable(
                        "compensation_workflow",
                        JsonValue::String(workflow_id.clone()),
                    );
                    Ok(())
                }
                CompensationKind::CustomHandler(handler) => handler(&action.step_id),
            };

            if let Err(message) = outcome {
                return Err(WorkflowError::CompensationFailed(format!(
                    "compensation for '{}' failed: {}",
                    action.step_id, message
                )));
            }
        }
        Ok(())
    }

    /// Success path notification so the breaker can close again.
    pub fn record_success(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.record_success();
        }
    }
}
