//! Runtime statistics for one coordinator
//!
//! Named samples are folded into running aggregates (count, sum, min, max,
//! mean, last) and can be rendered as the CSV and XML run reports or
//! exported for Prometheus through [`exporter::PrometheusExporter`].

pub mod exporter;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

pub use exporter::{PrometheusConfig, PrometheusExporter};

/// Number of `GetValues` calls
pub const GET_VALUES_COUNT: &str = "GetValuesCount";
/// Time spent enqueuing an on-demand request (ms)
pub const REQUEST_INSERT_TIME_MS: &str = "RequestInsertTimeMS";
/// Poll ceilings hit while waiting for a value set
pub const REQUEST_RETRY: &str = "RequestRetry";
/// Time from cache miss to value set arrival (ms)
pub const CACHE_WAIT_TIME_MS: &str = "CacheWaitTimeMS";
/// Speculative requests enqueued
pub const PREFETCH_REQUEST_COUNT: &str = "Prefetch:RequestCount";
/// Speculative requests refused by a full queue
pub const PREFETCH_REQUEST_OFFER_FAIL: &str = "Prefetch:RequestOfferFail";
/// Time spent enqueuing a produced value set (ms)
pub const ENTRY_INSERT_TIME_MS: &str = "EntryInsertTimeMS";
/// Total run time of a coordinator (ms)
pub const RUNTIME_MS: &str = "RUNTIME_MS";

// ============================================================================
// Metric Types
// ============================================================================

/// Aggregated metric statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricStats {
    /// Number of samples
    pub count: u64,

    /// Sum of all values
    pub sum: f64,

    /// Minimum value
    pub min: f64,

    /// Maximum value
    pub max: f64,

    /// Mean value
    pub mean: f64,

    /// Last recorded value
    pub last: f64,
}

impl MetricStats {
    /// Create new stats from a single value
    pub fn from_value(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            mean: value,
            last: value,
        }
    }

    /// Update stats with a new value
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean = self.sum / self.count as f64;
        self.last = value;
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Named sample aggregates for one component run
#[derive(Debug)]
pub struct Statistics {
    component_id: String,
    run_id: String,
    metrics: RwLock<BTreeMap<String, MetricStats>>,
}

impl Statistics {
    /// Create an empty collection labelled for reports
    pub fn new(component_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            run_id: run_id.into(),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    /// Component label
    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    /// Run label
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record one sample
    pub fn record(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write();
        match metrics.get_mut(name) {
            Some(stats) => stats.update(value),
            None => {
                metrics.insert(name.to_string(), MetricStats::from_value(value));
            }
        }
    }

    /// Record a sample of 1
    pub fn increment(&self, name: &str) {
        self.record(name, 1.0);
    }

    /// Record a duration in milliseconds
    pub fn record_duration(&self, name: &str, elapsed: Duration) {
        self.record(name, elapsed.as_secs_f64() * 1000.0);
    }

    /// Aggregate for `name`
    pub fn get(&self, name: &str) -> Option<MetricStats> {
        self.metrics.read().get(name).cloned()
    }

    /// Number of samples recorded under `name`
    pub fn count(&self, name: &str) -> u64 {
        self.metrics.read().get(name).map_or(0, |s| s.count)
    }

    /// Copy of every aggregate, ordered by name
    pub fn snapshot(&self) -> BTreeMap<String, MetricStats> {
        self.metrics.read().clone()
    }

    /// One `component,run,name,sum,mean,count` line per metric
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for (name, stats) in self.metrics.read().iter() {
            let _ = write!(
                out,
                "{},{},{},{:.2},{:.2},{}\r\n",
                self.component_id.trim(),
                self.run_id.trim(),
                name,
                stats.sum,
                stats.mean,
                stats.count
            );
        }
        out
    }

    /// `<Statistics>` document with one element per metric
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<Statistics>\r\n");
        for (name, stats) in self.metrics.read().iter() {
            let _ = write!(
                out,
                "<Statistic name=\"{}\" sum=\"{:.2}\" mean=\"{:.2}\" count=\"{}\" />\r\n",
                escape_attr(name),
                stats.sum,
                stats.mean,
                stats.count
            );
        }
        out.push_str("</Statistics>\r\n");
        out
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_stats() {
        let mut stats = MetricStats::from_value(10.0);
        stats.update(20.0);
        stats.update(5.0);

        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 35.0);
        assert_eq!(stats.min, 5.0);
        assert_eq!(stats.max, 20.0);
        assert!((stats.mean - 11.666666).abs() < 0.001);
        assert_eq!(stats.last, 5.0);
    }

    #[test]
    fn test_record_and_count() {
        let stats = Statistics::new("model", "run1");
        stats.increment(GET_VALUES_COUNT);
        stats.increment(GET_VALUES_COUNT);
        stats.record_duration(CACHE_WAIT_TIME_MS, Duration::from_millis(1500));

        assert_eq!(stats.count(GET_VALUES_COUNT), 2);
        assert_eq!(stats.count(REQUEST_RETRY), 0);
        assert_eq!(stats.get(CACHE_WAIT_TIME_MS).unwrap().sum, 1500.0);
        assert_eq!(stats.snapshot().len(), 2);
    }

    #[test]
    fn test_csv_report() {
        let stats = Statistics::new(" model ", "run1");
        stats.record("RequestInsertTimeMS", 1.0);
        stats.record("RequestInsertTimeMS", 2.0);
        assert_eq!(stats.to_csv(), "model,run1,RequestInsertTimeMS,3.00,1.50,2\r\n");
    }

    #[test]
    fn test_xml_report() {
        let stats = Statistics::new("model", "run1");
        stats.record(PREFETCH_REQUEST_COUNT, 1.0);
        assert_eq!(
            stats.to_xml(),
            "<Statistics>\r\n<Statistic name=\"Prefetch:RequestCount\" sum=\"1.00\" mean=\"1.00\" count=\"1\" />\r\n</Statistics>\r\n"
        );
    }

    #[test]
    fn test_xml_escapes_names() {
        let stats = Statistics::new("m", "r");
        stats.record("a<\"b\">", 1.0);
        assert!(stats.to_xml().contains("name=\"a&lt;&quot;b&quot;&gt;\""));
    }
}
