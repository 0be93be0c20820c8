// ABOUTME: Token bucket limiter with continuous time-based refill per key
// ABOUTME: Denials report how long until enough tokens accumulate for the request

use super::{RateLimitDecision, RateLimiter};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter: each key owns a reservoir of `bucket_size` tokens
/// refilled continuously at `rate_per_sec`.
pub struct TokenBucketLimiter {
    bucket_size: f64,
    rate_per_sec: f64,
    buckets: Mutex<HashMap<String, BucketState>>,
}

impl TokenBucketLimiter {
    pub fn new(bucket_size: f64, rate_per_sec: f64) -> Self {
        Self {
            bucket_size,
            rate_per_sec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn refreshed_tokens(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.bucket_size);
        state.last_refill = Instant::now();
    }

    fn decision(&self, tokens: f64, allowed: bool, deficit: f64) -> RateLimitDecision {
        let refill_secs = (self.bucket_size - tokens).max(0.0) / self.rate_per_sec;
        let reset_time = Utc::now()
            + ChronoDuration::milliseconds((refill_secs * 1000.0).ceil() as i64);

        RateLimitDecision {
            allowed,
            remaining: tokens,
            reset_time,
            retry_after: (!allowed).then(|| {
                Duration::from_millis(((deficit / self.rate_per_sec) * 1000.0).ceil() as u64)
            }),
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn check_limit(&self, key: &str, cost: f64) -> RateLimitDecision {
        let mut buckets = self.buckets.lock();
        let state = buckets.entry(key.to_string()).or_insert_with(|| BucketState {
            tokens: self.bucket_size,
            last_refill: Instant::now(),
        });

        self.refreshed_tokens(state);

        if state.tokens >= cost {
            state.tokens -= cost;
            let tokens = state.tokens;
            self.decision(tokens, true, 0.0)
        } else {
            let deficit = cost - state.tokens;
            let tokens = state.tokens;
            self.decision(tokens, false, deficit)
        }
    }

    fn reset(&self, key: &str) {
        self.buckets.lock().remove(key);
    }

    fn status(&self, key: &str) -> RateLimitDecision {
        let mut buckets = self.buckets.lock();
        match buckets.get_mut(key) {
            Some(state) => {
                self.refreshed_tokens(state);
                let tokens = state.tokens;
                self.decision(tokens, tokens > 0.0, 0.0)
            }
            None => self.decision(self.bucket_size, true, 0.0),
        }
    }

    fn limit(&self) -> f64 {
        self.bucket_size
    }
}
