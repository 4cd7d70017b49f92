//! Prometheus text exposition (format 0.0.4).

use std::io::Write;

use crate::aggregator::Snapshot;
use crate::executor::CycleOutcome;

/// Content type of the metrics endpoint.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub const SCRAPE_ERROR_METRIC: &str = "solr_exporter_scrape_error_total";
pub const SCRAPE_ERROR_HELP: &str = "Number of scrape error.";

pub const SCRAPE_DURATION_METRIC: &str = "solr_exporter_scrape_duration_seconds";
pub const SCRAPE_DURATION_HELP: &str = "Duration of the last scrape cycle in seconds.";

/// Render a cycle outcome followed by the exporter's own metrics.
pub fn render(outcome: &CycleOutcome, errors_total: u64) -> String {
    let mut output = Vec::with_capacity(outcome.snapshot.sample_count() * 100 + 256);

    write_snapshot(&mut output, &outcome.snapshot);

    write_own_metric(
        &mut output,
        SCRAPE_ERROR_METRIC,
        SCRAPE_ERROR_HELP,
        "counter",
        &errors_total.to_string(),
    );
    write_own_metric(
        &mut output,
        SCRAPE_DURATION_METRIC,
        SCRAPE_DURATION_HELP,
        "gauge",
        &format_value(outcome.duration.as_secs_f64()),
    );

    String::from_utf8(output).unwrap_or_default()
}

fn write_own_metric(output: &mut Vec<u8>, name: &str, help: &str, kind: &str, value: &str) {
    writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
    writeln!(output, "# TYPE {} {}", name, kind).ok();
    writeln!(output, "{} {}", name, value).ok();
}

fn write_snapshot(output: &mut Vec<u8>, snapshot: &Snapshot) {
    for family in &snapshot.families {
        if family.samples.is_empty() {
            continue;
        }

        if !family.help.is_empty() {
            writeln!(output, "# HELP {} {}", family.name, escape_help(&family.help)).ok();
        }
        writeln!(output, "# TYPE {} {}", family.name, family.metric_type.as_str()).ok();

        for sample in &family.samples {
            writeln!(
                output,
                "{}{} {}",
                sample.name,
                format_labels(&sample.labels),
                format_value(sample.value)
            )
            .ok();
        }
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// HELP text only escapes backslash and newline.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
///
/// Labels with an empty value are left out, which Prometheus treats the same
/// as an absent label.
fn format_labels(labels: &[(String, String)]) -> String {
    let parts: Vec<String> = labels
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    if parts.is_empty() {
        return String::new();
    }

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{MetricFamily, Sample};
    use crate::mapping::MetricType;
    use std::time::Duration;

    fn outcome(families: Vec<MetricFamily>) -> CycleOutcome {
        CycleOutcome {
            snapshot: Snapshot { families },
            failures: Vec::new(),
            duration: Duration::from_millis(250),
        }
    }

    fn sample(name: &str, labels: &[(&str, &str)], value: f64) -> Sample {
        Sample {
            family: name.to_string(),
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    #[test]
    fn test_render_family() {
        let text = render(
            &outcome(vec![MetricFamily {
                name: "solr_ping".to_string(),
                metric_type: MetricType::Gauge,
                help: "Ping status".to_string(),
                label_names: vec!["core".to_string()],
                samples: vec![
                    sample("solr_ping", &[("core", "c1")], 1.0),
                    sample("solr_ping", &[("core", "c2")], 0.0),
                ],
            }]),
            3,
        );

        assert!(text.starts_with(concat!(
            "# HELP solr_ping Ping status\n",
            "# TYPE solr_ping gauge\n",
            "solr_ping{core=\"c1\"} 1\n",
            "solr_ping{core=\"c2\"} 0\n",
        )));
        assert!(text.contains("# HELP solr_exporter_scrape_error_total Number of scrape error.\n"));
        assert!(text.contains("# TYPE solr_exporter_scrape_error_total counter\n"));
        assert!(text.contains("\nsolr_exporter_scrape_error_total 3\n"));
        assert!(text.contains("\nsolr_exporter_scrape_duration_seconds 0.25\n"));
    }

    #[test]
    fn test_render_empty_snapshot_has_own_metrics() {
        let text = render(&outcome(Vec::new()), 0);

        assert!(text.starts_with("# HELP solr_exporter_scrape_error_total"));
        assert!(text.contains("solr_exporter_scrape_error_total 0\n"));
    }

    #[test]
    fn test_histogram_series_and_empty_labels() {
        let mut sum = sample("solr_latency_sum", &[("le", "")], 12.5);
        sum.family = "solr_latency".to_string();
        let mut bucket = sample("solr_latency_bucket", &[("le", "+Inf")], 4.0);
        bucket.family = "solr_latency".to_string();

        let text = render(
            &outcome(vec![MetricFamily {
                name: "solr_latency".to_string(),
                metric_type: MetricType::Histogram,
                help: String::new(),
                label_names: vec!["le".to_string()],
                samples: vec![bucket, sum],
            }]),
            0,
        );

        assert!(text.starts_with("# TYPE solr_latency histogram\n"));
        assert!(text.contains("solr_latency_bucket{le=\"+Inf\"} 4\n"));
        assert!(text.contains("solr_latency_sum 12.5\n"));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_escape_help() {
        assert_eq!(escape_help("a\\b\nc \"q\""), "a\\\\b\\nc \"q\"");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.14), "3.14");
        assert_eq!(format_value(-1.0), "-1");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
