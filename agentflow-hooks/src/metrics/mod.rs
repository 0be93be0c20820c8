// ABOUTME: Metrics registry with counter, gauge, histogram, and summary instruments
// ABOUTME: Supports pluggable collectors and snapshot collection for export

pub mod hook;
pub mod prometheus;

pub use hook::{MetricsHook, TimingMiddleware};
pub use prometheus::encode_prometheus;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// Bounded number of samples retained per summary for quantile estimates.
const SUMMARY_WINDOW: usize = 1024;

/// Kind of a registered metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

/// Point-in-time value of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Histogram {
        /// Configured upper bounds, ascending.
        bounds: Vec<f64>,
        /// Cumulative count per bound: every bucket whose bound is >= an
        /// observed value is incremented.
        counts: Vec<u64>,
        count: u64,
        sum: f64,
    },
    Summary {
        /// Quantiles in (0, 1], paired with their current estimates.
        quantiles: Vec<(f64, f64)>,
        count: u64,
        sum: f64,
    },
}

/// Snapshot of one metric series.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub name: String,
    pub help: String,
    pub labels: BTreeMap<String, String>,
    pub value: MetricValue,
}

enum MetricData {
    Counter(u64),
    Gauge(f64),
    Histogram {
        bounds: Vec<f64>,
        counts: Vec<u64>,
        count: u64,
        sum: f64,
    },
    Summary {
        quantiles: Vec<f64>,
        samples: VecDeque<f64>,
        count: u64,
        sum: f64,
    },
}

struct Metric {
    name: String,
    help: String,
    labels: BTreeMap<String, String>,
    data: MetricData,
}

/// Additional source of metric snapshots queried at collection time.
pub trait Collector: Send + Sync {
    fn collect(&self) -> Vec<MetricSnapshot>;
}

/// String-keyed metric store. Series identity is (name, labels); unknown
/// series are created on first update with default help text.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: Mutex<HashMap<String, Metric>>,
    collectors: Mutex<Vec<Arc<dyn Collector>>>,
}

fn series_key(name: &str, labels: &BTreeMap<String, String>) -> String {
    let mut key = name.to_string();
    for (k, v) in labels {
        key.push('\u{1f}');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collector(&self, collector: Arc<dyn Collector>) {
        self.collectors.lock().push(collector);
    }

    pub fn register_counter(&self, name: &str, help: &str, labels: BTreeMap<String, String>) {
        self.register(name, help, labels, MetricData::Counter(0));
    }

    pub fn register_gauge(&self, name: &str, help: &str, labels: BTreeMap<String, String>) {
        self.register(name, help, labels, MetricData::Gauge(0.0));
    }

    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        labels: BTreeMap<String, String>,
        mut bounds: Vec<f64>,
    ) {
        bounds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let counts = vec![0; bounds.len()];
        self.register(
            name,
            help,
            labels,
            MetricData::Histogram {
                bounds,
                counts,
                count: 0,
                sum: 0.0,
            },
        );
    }

    pub fn register_summary(
        &self,
        name: &str,
        help: &str,
        labels: BTreeMap<String, String>,
        quantiles: Vec<f64>,
    ) {
        self.register(
            name,
            help,
            labels,
            MetricData::Summary {
                quantiles,
                samples: VecDeque::new(),
                count: 0,
                sum: 0.0,
            },
        );
    }

    /// Idempotent: a series that already exists keeps its data and help.
    fn register(&self, name: &str, help: &str, labels: BTreeMap<String, String>, data: MetricData) {
        let key = series_key(name, &labels);
        self.metrics.lock().entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            help: help.to_string(),
            labels,
            data,
        });
    }

    /// Adds `delta` to a counter, creating the series on first use.
    pub fn increment_counter(&self, name: &str, labels: BTreeMap<String, String>, delta: u64) {
        let key = series_key(name, &labels);
        let mut metrics = self.metrics.lock();
        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            help: String::new(),
            labels,
            data: MetricData::Counter(0),
        });
        match &mut metric.data {
            MetricData::Counter(value) => *value += delta,
            _ => warn!(metric = %name, "increment_counter on non-counter series"),
        }
    }

    pub fn set_gauge(&self, name: &str, labels: BTreeMap<String, String>, value: f64) {
        let key = series_key(name, &labels);
        let mut metrics = self.metrics.lock();
        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            help: String::new(),
            labels,
            data: MetricData::Gauge(0.0),
        });
        match &mut metric.data {
            MetricData::Gauge(current) => *current = value,
            _ => warn!(metric = %name, "set_gauge on non-gauge series"),
        }
    }

    /// Records a histogram observation: count and sum update, and every
    /// bucket whose upper bound is >= `value` increments.
    pub fn observe_histogram(&self, name: &str, labels: BTreeMap<String, String>, value: f64) {
        let key = series_key(name, &labels);
        let mut metrics = self.metrics.lock();
        let Some(metric) = metrics.get_mut(&key) else {
            warn!(metric = %name, "observe_histogram on unregistered series");
            return;
        };
        match &mut metric.data {
            MetricData::Histogram {
                bounds,
                counts,
                count,
                sum,
            } => {
                *count += 1;
                *sum += value;
                for (bound, bucket) in bounds.iter().zip(counts.iter_mut()) {
                    if *bound >= value {
                        *bucket += 1;
                    }
                }
            }
            _ => warn!(metric = %name, "observe_histogram on non-histogram series"),
        }
    }

    pub fn observe_summary(&self, name: &str, labels: BTreeMap<String, String>, value: f64) {
        let key = series_key(name, &labels);
        let mut metrics = self.metrics.lock();
        let Some(metric) = metrics.get_mut(&key) else {
            warn!(metric = %name, "observe_summary on unregistered series");
            return;
        };
        match &mut metric.data {
            MetricData::Summary {
                samples,
                count,
                sum,
                ..
            } => {
                *count += 1;
                *sum += value;
                if samples.len() == SUMMARY_WINDOW {
                    samples.pop_front();
                }
                samples.push_back(value);
            }
            _ => warn!(metric = %name, "observe_summary on non-summary series"),
        }
    }

    /// Snapshots registered metrics plus every collector's output.
    pub fn collect_all(&self) -> Vec<MetricSnapshot> {
        let mut snapshots: Vec<MetricSnapshot> = {
            let metrics = self.metrics.lock();
            let mut keys: Vec<&String> = metrics.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| Self::snapshot(&metrics[key]))
                .collect()
        };

        for collector in self.collectors.lock().iter() {
            snapshots.extend(collector.collect());
        }
        snapshots
    }

    fn snapshot(metric: &Metric) -> MetricSnapshot {
        let value = match &metric.data {
            MetricData::Counter(value) => MetricValue::Counter(*value),
            MetricData::Gauge(value) => MetricValue::Gauge(*value),
            MetricData::Histogram {
                bounds,
                counts,
                count,
                sum,
            } => MetricValue::Histogram {
                bounds: bounds.clone(),
                counts: counts.clone(),
                count: *count,
                sum: *sum,
            },
            MetricData::Summary {
                quantiles,
                samples,
                count,
                sum,
            } => {
                let mut sorted: Vec<f64> = samples.iter().copied().collect();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let estimates = quantiles
                    .iter()
                    .map(|q| (*q, quantile_of(&sorted, *q)))
                    .collect();
                MetricValue::Summary {
                    quantiles: estimates,
                    count: *count,
                    sum: *sum,
                }
            }
        };

        MetricSnapshot {
            name: metric.name.clone(),
            help: metric.help.clone(),
            labels: metric.labels.clone(),
            value,
        }
    }
}

fn quantile_of(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
