// ABOUTME: Sliding window limiter over a timestamped request log per key
// ABOUTME: Denials report when the oldest in-window entry ages out

use super::{RateLimitDecision, RateLimiter};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Sliding-window limiter: at most `limit` request units within any window
/// of `window` duration, tracked as a per-key timestamp log.
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    logs: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            logs: Mutex::new(HashMap::new()),
        }
    }

    fn purge(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = log.front() {
            if now.duration_since(*front) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    fn decision(
        &self,
        log: &VecDeque<Instant>,
        now: Instant,
        allowed: bool,
    ) -> RateLimitDecision {
        let remaining = self.limit.saturating_sub(log.len()) as f64;
        let retry_after = if allowed {
            None
        } else {
            log.front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
        };
        let reset_in = log
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or_default();

        RateLimitDecision {
            allowed,
            remaining,
            reset_time: Utc::now() + ChronoDuration::from_std(reset_in).unwrap_or_default(),
            retry_after,
        }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check_limit(&self, key: &str, cost: f64) -> RateLimitDecision {
        let cost = cost.ceil().max(0.0) as usize;
        let now = Instant::now();
        let mut logs = self.logs.lock();
        let log = logs.entry(key.to_string()).or_default();

        self.purge(log, now);

        if log.len() + cost <= self.limit {
            for _ in 0..cost {
                log.push_back(now);
            }
            self.decision(log, now, true)
        } else {
            self.decision(log, now, false)
        }
    }

    fn reset(&self, key: &str) {
        self.logs.lock().remove(key);
    }

    fn status(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut logs = self.logs.lock();
        match logs.get_mut(key) {
            Some(log) => {
                self.purge(log, now);
                let allowed = log.len() < self.limit;
                self.decision(log, now, allowed)
            }
            None => RateLimitDecision {
                allowed: true,
                remaining: self.limit as f64,
                reset_time: Utc::now(),
                retry_after: None,
            },
        }
    }

    fn limit(&self) -> f64 {
        self.limit as f64
    }
}
