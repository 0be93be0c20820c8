// ABOUTME: Prometheus text exposition format encoder for metric snapshots
// ABOUTME: Emits HELP/TYPE headers plus sample lines for all four metric kinds

use super::{MetricSnapshot, MetricValue};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Renders snapshots in the Prometheus text exposition format:
///
/// ```text
/// # HELP name desc
/// # TYPE name kind
/// name{label="value"} 5
/// ```
///
/// Histograms expand to `name_bucket{le="<bound>"}`, `name_sum`, and
/// `name_count`; summaries to `name{quantile="<q>"}`, `name_sum`, and
/// `name_count`.
pub fn encode_prometheus(snapshots: &[MetricSnapshot]) -> String {
    let mut out = String::new();
    let mut last_header: Option<String> = None;

    for snapshot in snapshots {
        if last_header.as_deref() != Some(snapshot.name.as_str()) {
            let _ = writeln!(out, "# HELP {} {}", snapshot.name, snapshot.help);
            let _ = writeln!(out, "# TYPE {} {}", snapshot.name, kind_name(&snapshot.value));
            last_header = Some(snapshot.name.clone());
        }

        match &snapshot.value {
            MetricValue::Counter(value) => {
                let _ = writeln!(
                    out,
                    "{}{} {}",
                    snapshot.name,
                    render_labels(&snapshot.labels, None),
                    value
                );
            }
            MetricValue::Gauge(value) => {
                let _ = writeln!(
                    out,
                    "{}{} {}",
                    snapshot.name,
                    render_labels(&snapshot.labels, None),
                    format_float(*value)
                );
            }
            MetricValue::Histogram {
                bounds,
                counts,
                count,
                sum,
            } => {
                for (bound, bucket_count) in bounds.iter().zip(counts.iter()) {
                    let le = ("le".to_string(), format_float(*bound));
                    let _ = writeln!(
                        out,
                        "{}_bucket{} {}",
                        snapshot.name,
                        render_labels(&snapshot.labels, Some(&le)),
                        bucket_count
                    );
                }
                let _ = writeln!(
                    out,
                    "{}_sum{} {}",
                    snapshot.name,
                    render_labels(&snapshot.labels, None),
                    format_float(*sum)
                );
                let _ = writeln!(
                    out,
                    "{}_count{} {}",
                    snapshot.name,
                    render_labels(&snapshot.labels, None),
                    count
                );
            }
            MetricValue::Summary {
                quantiles,
                count,
                sum,
            } => {
                for (quantile, value) in quantiles {
                    let q = ("quantile".to_string(), format_float(*quantile));
                    let _ = writeln!(
                        out,
                        "{}{} {}",
                        snapshot.name,
                        render_labels(&snapshot.labels, Some(&q)),
                        format_float(*value)
                    );
                }
                let _ = writeln!(
                    out,
                    "{}_sum{} {}",
                    snapshot.name,
                    render_labels(&snapshot.labels, None),
                    format_float(*sum)
                );
                let _ = writeln!(
                    out,
                    "{}_count{} {}",
                    snapshot.name,
                    render_labels(&snapshot.labels, None),
                    count
                );
            }
        }
    }
    out
}

fn kind_name(value: &MetricValue) -> &'static str {
    match value {
        MetricValue::Counter(_) => "counter",
        MetricValue::Gauge(_) => "gauge",
        MetricValue::Histogram { .. } => "histogram",
        MetricValue::Summary { .. } => "summary",
    }
}

fn render_labels(labels: &BTreeMap<String, String>, extra: Option<&(String, String)>) -> String {
    let mut pairs: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some((k, v)) = extra {
        pairs.push((k.clone(), v.clone()));
    }
    if pairs.is_empty() {
        return String::new();
    }

    let body: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{{{}}}", body.join(","))
}

fn format_float(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;
    use std::collections::BTreeMap;

    #[test]
    fn test_counter_and_gauge_lines() {
        let registry = MetricsRegistry::new();
        let mut labels = BTreeMap::new();
        labels.insert("point".to_string(), "agent_before_run".to_string());

        registry.register_counter("hook_runs_total", "Total hook runs", labels.clone());
        registry.increment_counter("hook_runs_total", labels, 4);
        registry.register_gauge("active_chains", "Chains in flight", BTreeMap::new());
        registry.set_gauge("active_chains", BTreeMap::new(), 2.0);

        let text = encode_prometheus(&registry.collect_all());

        assert!(text.contains("# HELP hook_runs_total Total hook runs"));
        assert!(text.contains("# TYPE hook_runs_total counter"));
        assert!(text.contains("hook_runs_total{point=\"agent_before_run\"} 4"));
        assert!(text.contains("# TYPE active_chains gauge"));
        assert!(text.contains("active_chains 2"));
    }

    #[test]
    fn test_histogram_exposition() {
        let registry = MetricsRegistry::new();
        registry.register_histogram(
            "latency",
            "Hook latency",
            BTreeMap::new(),
            vec![0.1, 1.0],
        );
        registry.observe_histogram("latency", BTreeMap::new(), 0.05);
        registry.observe_histogram("latency", BTreeMap::new(), 0.5);

        let text = encode_prometheus(&registry.collect_all());

        assert!(text.contains("# TYPE latency histogram"));
        assert!(text.contains("latency_bucket{le=\"0.1\"} 1"));
        assert!(text.contains("latency_bucket{le=\"1\"} 2"));
        assert!(text.contains("latency_sum 0.55"));
        assert!(text.contains("latency_count 2"));
    }

    #[test]
    fn test_summary_exposition() {
        let registry = MetricsRegistry::new();
        registry.register_summary("duration", "Durations", BTreeMap::new(), vec![0.5]);
        for i in 1..=10 {
            registry.observe_summary("duration", BTreeMap::new(), f64::from(i));
        }

        let text = encode_prometheus(&registry.collect_all());

        assert!(text.contains("# TYPE duration summary"));
        assert!(text.contains("duration{quantile=\"0.5\"}"));
        assert!(text.contains("duration_sum 55"));
        assert!(text.contains("duration_count 10"));
    }
}
