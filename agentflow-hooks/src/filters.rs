// ABOUTME: Filter predicates deciding whether a wrapped hook runs for a context
// ABOUTME: Point, predicate, rate, metadata, time-window, and composite filters

use crate::context::HookContext;
use crate::result::HookResult;
use crate::traits::{ArcHook, Hook};
use crate::types::{HookMetadata, HookPoint};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, Timelike, Utc};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Pure predicate over (hook metadata, context). A rejected hook is skipped
/// with a default "continue" result instead of being invoked.
pub trait HookFilter: Send + Sync {
    fn should_run(&self, metadata: &HookMetadata, context: &HookContext) -> bool;

    fn name(&self) -> &str {
        "filter"
    }
}

/// Admits contexts whose point is in the configured set.
pub struct PointFilter {
    points: HashSet<HookPoint>,
}

impl PointFilter {
    pub fn new(points: impl IntoIterator<Item = HookPoint>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }
}

impl HookFilter for PointFilter {
    fn should_run(&self, _metadata: &HookMetadata, context: &HookContext) -> bool {
        self.points.contains(&context.point)
    }

    fn name(&self) -> &str {
        "point"
    }
}

/// Arbitrary boolean function of hook and context.
pub struct PredicateFilter {
    label: String,
    predicate: Arc<dyn Fn(&HookMetadata, &HookContext) -> bool + Send + Sync>,
}

impl PredicateFilter {
    pub fn new(
        label: impl Into<String>,
        predicate: impl Fn(&HookMetadata, &HookContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl HookFilter for PredicateFilter {
    fn should_run(&self, metadata: &HookMetadata, context: &HookContext) -> bool {
        (self.predicate)(metadata, context)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Sliding-window admission filter: at most `limit` executions within any
/// `window`. Timestamps older than the window are purged on every check.
pub struct RateLimitFilter {
    limit: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimitFilter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }
}

impl HookFilter for RateLimitFilter {
    fn should_run(&self, metadata: &HookMetadata, _context: &HookContext) -> bool {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();

        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < self.limit {
            timestamps.push_back(now);
            true
        } else {
            trace!(hook = %metadata.id, "rate limit filter rejected execution");
            false
        }
    }

    fn name(&self) -> &str {
        "rate_limit"
    }
}

/// Match condition for [`MetadataFilter`].
#[derive(Debug, Clone)]
pub enum MetadataMatch {
    Exists,
    NotExists,
    Equals(JsonValue),
    NotEquals(JsonValue),
    /// Substring match against the string form of the value.
    Contains(String),
}

/// Filters on a context metadata key.
pub struct MetadataFilter {
    key: String,
    condition: MetadataMatch,
}

impl MetadataFilter {
    pub fn new(key: impl Into<String>, condition: MetadataMatch) -> Self {
        Self {
            key: key.into(),
            condition,
        }
    }
}

impl HookFilter for MetadataFilter {
    fn should_run(&self, _metadata: &HookMetadata, context: &HookContext) -> bool {
        let value = context.metadata.get(&self.key);
        match &self.condition {
            MetadataMatch::Exists => value.is_some(),
            MetadataMatch::NotExists => value.is_none(),
            MetadataMatch::Equals(expected) => value == Some(expected),
            MetadataMatch::NotEquals(expected) => value != Some(expected),
            MetadataMatch::Contains(needle) => value
                .map(|v| match v {
                    JsonValue::String(s) => s.contains(needle),
                    other => other.to_string().contains(needle),
                })
                .unwrap_or(false),
        }
    }

    fn name(&self) -> &str {
        "metadata"
    }
}

/// Day-of-week bitmask × hour-of-day window with a fixed UTC offset.
///
/// Bit 0 is Monday through bit 6 = Sunday, matching
/// `chrono::Weekday::num_days_from_monday`. Hour ranges crossing midnight
/// are handled as the disjunction `hour >= start || hour < end`.
pub struct TimeWindowFilter {
    days_mask: u8,
    start_hour: u32,
    end_hour: u32,
    utc_offset_minutes: i32,
}

impl TimeWindowFilter {
    pub const ALL_DAYS: u8 = 0b0111_1111;
    pub const WEEKDAYS: u8 = 0b0001_1111;

    pub fn new(days_mask: u8, start_hour: u32, end_hour: u32, utc_offset_minutes: i32) -> Self {
        Self {
            days_mask,
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
            utc_offset_minutes,
        }
    }

    fn matches_at(&self, now_utc: chrono::DateTime<Utc>) -> bool {
        let local = now_utc + ChronoDuration::minutes(i64::from(self.utc_offset_minutes));
        let day_bit = 1u8 << local.weekday().num_days_from_monday();
        if self.days_mask & day_bit == 0 {
            return false;
        }

        let hour = local.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl HookFilter for TimeWindowFilter {
    fn should_run(&self, _metadata: &HookMetadata, _context: &HookContext) -> bool {
        self.matches_at(Utc::now())
    }

    fn name(&self) -> &str {
        "time_window"
    }
}

/// Boolean combinators over child filters.
pub enum CompositeFilter {
    And(Vec<Arc<dyn HookFilter>>),
    Or(Vec<Arc<dyn HookFilter>>),
    Not(Arc<dyn HookFilter>),
}

impl HookFilter for CompositeFilter {
    fn should_run(&self, metadata: &HookMetadata, context: &HookContext) -> bool {
        match self {
            CompositeFilter::And(filters) => {
                filters.iter().all(|f| f.should_run(metadata, context))
            }
            CompositeFilter::Or(filters) => {
                filters.iter().any(|f| f.should_run(metadata, context))
            }
            CompositeFilter::Not(filter) => !filter.should_run(metadata, context),
        }
    }

    fn name(&self) -> &str {
        "composite"
    }
}

/// Wraps a hook behind a conjunction of filters. When any filter rejects,
/// the hook is not invoked and the chain sees a default continue.
pub struct FilteredHook {
    inner: ArcHook,
    filters: Vec<Arc<dyn HookFilter>>,
}

impl FilteredHook {
    pub fn new(inner: ArcHook) -> Self {
        Self {
            inner,
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn HookFilter>) -> Self {
        self.filters.push(filter);
        self
    }
}

#[async_trait]
impl Hook for FilteredHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        let metadata = self.inner.metadata();
        for filter in &self.filters {
            if !filter.should_run(&metadata, context) {
                trace!(
                    hook = %metadata.id,
                    filter = filter.name(),
                    "filter rejected hook execution"
                );
                return Ok(HookResult::ok());
            }
        }
        self.inner.execute(context).await
    }

    fn metadata(&self) -> HookMetadata {
        self.inner.metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FnHook;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn meta() -> HookMetadata {
        HookMetadata::new("probe")
    }

    #[test]
    fn test_point_filter() {
        let filter = PointFilter::new([HookPoint::AgentBeforeRun, HookPoint::AgentAfterRun]);
        let before = HookContext::new(HookPoint::AgentBeforeRun);
        let tool = HookContext::new(HookPoint::ToolBeforeExecute);

        assert!(filter.should_run(&meta(), &before));
        assert!(!filter.should_run(&meta(), &tool));
    }

    #[test]
    fn test_rate_limit_filter_window() {
        let filter = RateLimitFilter::new(2, Duration::from_secs(60));
        let context = HookContext::new(HookPoint::AgentBeforeRun);

        assert!(filter.should_run(&meta(), &context));
        assert!(filter.should_run(&meta(), &context));
        assert!(!filter.should_run(&meta(), &context));
    }

    #[test]
    fn test_metadata_filter_conditions() {
        let mut context = HookContext::new(HookPoint::AgentBeforeRun);
        context.insert_metadata("tenant", json!("acme-corp"));

        assert!(MetadataFilter::new("tenant", MetadataMatch::Exists).should_run(&meta(), &context));
        assert!(
            MetadataFilter::new("missing", MetadataMatch::NotExists).should_run(&meta(), &context)
        );
        assert!(MetadataFilter::new("tenant", MetadataMatch::Equals(json!("acme-corp")))
            .should_run(&meta(), &context));
        assert!(
            MetadataFilter::new("tenant", MetadataMatch::NotEquals(json!("other")))
                .should_run(&meta(), &context)
        );
        assert!(MetadataFilter::new("tenant", MetadataMatch::Contains("acme".to_string()))
            .should_run(&meta(), &context));
        assert!(!MetadataFilter::new("tenant", MetadataMatch::Contains("zzz".to_string()))
            .should_run(&meta(), &context));
    }

    #[test]
    fn test_time_window_midnight_crossing() {
        // 22:00-06:00 window, all days, UTC.
        let filter = TimeWindowFilter::new(TimeWindowFilter::ALL_DAYS, 22, 6, 0);

        let late = Utc.with_ymd_and_hms(2025, 3, 3, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 3, 4, 5, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap();

        assert!(filter.matches_at(late));
        assert!(filter.matches_at(early));
        assert!(!filter.matches_at(midday));
    }

    #[test]
    fn test_time_window_day_mask_and_offset() {
        // Weekdays 9-17, UTC+120min. Saturday midday local is rejected.
        let filter = TimeWindowFilter::new(TimeWindowFilter::WEEKDAYS, 9, 17, 120);

        // 2025-03-08 is a Saturday; 10:00 UTC = 12:00 local.
        let saturday = Utc.with_ymd_and_hms(2025, 3, 8, 10, 0, 0).unwrap();
        assert!(!filter.matches_at(saturday));

        // 2025-03-10 is a Monday; 10:00 UTC = 12:00 local.
        let monday = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
        assert!(filter.matches_at(monday));
    }

    #[test]
    fn test_composite_filter() {
        let yes = Arc::new(PredicateFilter::new("yes", |_, _| true)) as Arc<dyn HookFilter>;
        let no = Arc::new(PredicateFilter::new("no", |_, _| false)) as Arc<dyn HookFilter>;
        let context = HookContext::new(HookPoint::AgentBeforeRun);

        assert!(!CompositeFilter::And(vec![yes.clone(), no.clone()]).should_run(&meta(), &context));
        assert!(CompositeFilter::Or(vec![yes.clone(), no.clone()]).should_run(&meta(), &context));
        assert!(CompositeFilter::Not(no).should_run(&meta(), &context));
        assert!(!CompositeFilter::Not(yes).should_run(&meta(), &context));
    }

    #[tokio::test]
    async fn test_filtered_hook_skips_without_invoking() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_clone = invocations.clone();

        let inner: ArcHook = Arc::new(FnHook::new("inner", move |_ctx| {
            invocations_clone.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::halt())
        }));

        let filtered = FilteredHook::new(inner)
            .with_filter(Arc::new(PointFilter::new([HookPoint::ToolBeforeExecute])));

        let mut context = HookContext::new(HookPoint::AgentBeforeRun);
        let result = filtered.execute(&mut context).await.unwrap();

        // Filter rejected: default continue, inner hook untouched.
        assert!(result.should_continue());
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        let mut tool_context = HookContext::new(HookPoint::ToolBeforeExecute);
        let result = filtered.execute(&mut tool_context).await.unwrap();
        assert!(!result.continue_processing);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
