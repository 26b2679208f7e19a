//! Prometheus exporter for coordinator statistics
//!
//! Renders every named aggregate as a Prometheus summary (`_sum`/`_count`)
//! and appends whatever the global `prometheus` registry holds.

use std::fmt::Write;
use std::sync::Arc;

use prometheus::{Encoder, TextEncoder};

use super::Statistics;

/// Configuration for Prometheus exporter
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Prefix for all metric names (default: "valueset_cache")
    pub metric_prefix: String,
    /// Append metrics from the global prometheus registry
    pub include_global_metrics: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            metric_prefix: "valueset_cache".to_string(),
            include_global_metrics: true,
        }
    }
}

/// Prometheus metrics exporter
pub struct PrometheusExporter {
    /// Configuration
    config: PrometheusConfig,
    /// Statistics being exported
    statistics: Arc<Statistics>,
}

impl PrometheusExporter {
    /// Create a new Prometheus exporter
    pub fn new(config: PrometheusConfig, statistics: Arc<Statistics>) -> Self {
        Self { config, statistics }
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let mut output = String::new();
        let prefix = &self.config.metric_prefix;

        for (name, stats) in self.statistics.snapshot() {
            let metric = format!("{}_{}", prefix, metric_name(&name));
            let _ = writeln!(output, "# HELP {} {}", metric, name);
            let _ = writeln!(output, "# TYPE {} summary", metric);
            let _ = writeln!(output, "{}_sum {}", metric, stats.sum);
            let _ = writeln!(output, "{}_count {}\n", metric, stats.count);
        }

        if self.config.include_global_metrics {
            match self.export_global_metrics() {
                Ok(global) => output.push_str(&global),
                Err(e) => tracing::warn!(error = %e, "Skipping global metrics"),
            }
        }

        output
    }

    /// Export global metrics from prometheus crate registry
    fn export_global_metrics(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("Failed to encode metrics: {}", e))?;

        String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
    }

    /// Export metrics as HTTP response body with correct content type
    pub fn export_http(&self) -> (String, &'static str) {
        let body = self.export();
        let content_type = "text/plain; version=0.0.4; charset=utf-8";
        (body, content_type)
    }
}

/// `Prefetch:RequestCount` -> `prefetch_request_count`
fn metric_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{GET_VALUES_COUNT, PREFETCH_REQUEST_COUNT, REQUEST_INSERT_TIME_MS, RUNTIME_MS};

    #[test]
    fn test_metric_names() {
        assert_eq!(metric_name(GET_VALUES_COUNT), "get_values_count");
        assert_eq!(metric_name(REQUEST_INSERT_TIME_MS), "request_insert_time_ms");
        assert_eq!(metric_name(PREFETCH_REQUEST_COUNT), "prefetch_request_count");
        assert_eq!(metric_name(RUNTIME_MS), "runtime_ms");
    }

    #[test]
    fn test_prometheus_export() {
        let stats = Arc::new(Statistics::new("m", "r"));
        stats.increment(GET_VALUES_COUNT);
        stats.increment(GET_VALUES_COUNT);
        stats.record(REQUEST_INSERT_TIME_MS, 4.5);

        let exporter = PrometheusExporter::new(PrometheusConfig::default(), stats);
        let output = exporter.export();

        assert!(output.contains("# TYPE valueset_cache_get_values_count summary"));
        assert!(output.contains("valueset_cache_get_values_count_count 2"));
        assert!(output.contains("valueset_cache_request_insert_time_ms_sum 4.5"));
    }

    #[test]
    fn test_custom_metric_prefix() {
        let stats = Arc::new(Statistics::new("m", "r"));
        stats.increment(GET_VALUES_COUNT);
        let config = PrometheusConfig {
            metric_prefix: "node".to_string(),
            include_global_metrics: false,
        };
        let output = PrometheusExporter::new(config, stats).export();
        assert!(output.contains("node_get_values_count_count 1"));
        assert!(!output.contains("valueset_cache"));
    }

    #[test]
    fn test_prometheus_export_http() {
        let exporter =
            PrometheusExporter::new(PrometheusConfig::default(), Arc::new(Statistics::new("m", "r")));
        let (_, content_type) = exporter.export_http();
        assert!(content_type.contains("version=0.0.4"));
    }
}
