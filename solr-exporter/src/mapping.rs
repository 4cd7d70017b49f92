//! Prometheus naming rules and metric types.

use serde::{Deserialize, Serialize};

/// Prometheus metric type of a job's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
        }
    }
}

/// Series suffixes a histogram family is made of.
pub const HISTOGRAM_SUFFIXES: [&str; 3] = ["_bucket", "_sum", "_count"];

/// Check a metric name against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Check a label name against `[a-zA-Z_][a-zA-Z0-9_]*`.
///
/// Names starting with `__` are reserved for internal use and rejected.
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_type_as_str() {
        assert_eq!(MetricType::Counter.as_str(), "counter");
        assert_eq!(MetricType::Gauge.as_str(), "gauge");
        assert_eq!(MetricType::Histogram.as_str(), "histogram");
    }

    #[test]
    fn test_metric_type_deserialize() {
        let t: MetricType = serde_json::from_str("\"gauge\"").unwrap();
        assert_eq!(t, MetricType::Gauge);
        assert!(serde_json::from_str::<MetricType>("\"summary\"").is_err());
    }

    #[test]
    fn test_valid_metric_names() {
        assert!(is_valid_metric_name("solr_ping"));
        assert!(is_valid_metric_name("_private"));
        assert!(is_valid_metric_name("foo:bar:baz"));
        assert!(is_valid_metric_name("solr_metrics_jvm_threads"));
    }

    #[test]
    fn test_invalid_metric_names() {
        assert!(!is_valid_metric_name(""));
        assert!(!is_valid_metric_name("1cpu"));
        assert!(!is_valid_metric_name("cpu.usage"));
        assert!(!is_valid_metric_name("memory-used"));
    }

    #[test]
    fn test_label_names() {
        assert!(is_valid_label_name("core"));
        assert!(is_valid_label_name("base_url"));
        assert!(is_valid_label_name("_x"));
        assert!(!is_valid_label_name("__meta"));
        assert!(!is_valid_label_name("device-id"));
        assert!(!is_valid_label_name("a:b"));
        assert!(!is_valid_label_name("9lives"));
        assert!(!is_valid_label_name(""));
    }
}
