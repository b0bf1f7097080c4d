//! Process-wide metrics state and Prometheus text rendering.

use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::scraper::Snapshot;

/// Prometheus exposition content type.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Holds the current [`Snapshot`] for the exposition layer.
///
/// `publish` swaps the snapshot atomically; a reader in progress keeps its
/// `Arc` and completes against a consistent snapshot even while a newer
/// cycle publishes. Concurrent cycles resolve last-writer-wins.
pub struct MetricsRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl MetricsRegistry {
    /// Create a registry holding the empty snapshot.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Atomically replace the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// The latest published snapshot (empty before the first cycle).
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Render the current snapshot in Prometheus exposition format.
    pub fn render(&self) -> String {
        render_snapshot(&self.current())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shareable registry handle.
pub type SharedRegistry = Arc<MetricsRegistry>;

/// Serialize a snapshot: one labeled streamflow series per gauge (failed
/// gauges present with value NaN), then the four aggregate gauges.
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut output = Vec::with_capacity(snapshot.entries.len() * 120 + 512);

    writeln!(output, "# TYPE dwr_streamflow_cfs gauge").ok();

    // Sort by gauge id for consistent output.
    let mut entries: Vec<_> = snapshot.entries.values().collect();
    entries.sort_by(|a, b| a.gauge_id.cmp(&b.gauge_id));

    for entry in entries {
        let labels = format_labels(&[
            ("friendly_name", &entry.friendly_name),
            ("gauge_id", &entry.gauge_id),
            ("location_name", &entry.location_name),
        ]);
        writeln!(
            output,
            "dwr_streamflow_cfs{} {}",
            labels,
            format_value(entry.outcome.exposition_value())
        )
        .ok();
    }

    writeln!(output, "# TYPE dwr_exporter_gauges_total gauge").ok();
    writeln!(output, "dwr_exporter_gauges_total {}", snapshot.gauge_count).ok();

    writeln!(output, "# TYPE dwr_exporter_scrape_success_total gauge").ok();
    writeln!(
        output,
        "dwr_exporter_scrape_success_total {}",
        snapshot.success_count
    )
    .ok();

    writeln!(output, "# TYPE dwr_exporter_scrape_failure_total gauge").ok();
    writeln!(
        output,
        "dwr_exporter_scrape_failure_total {}",
        snapshot.failure_count
    )
    .ok();

    writeln!(output, "# TYPE dwr_exporter_scrape_duration_seconds gauge").ok();
    writeln!(
        output,
        "dwr_exporter_scrape_duration_seconds {}",
        format_value(snapshot.scrape_duration_seconds)
    )
    .ok();

    String::from_utf8(output).unwrap_or_default()
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
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FailureReason, FetchOutcome};
    use crate::scraper::SnapshotEntry;
    use std::collections::HashMap;

    fn entry(id: &str, friendly: &str, location: &str, outcome: FetchOutcome) -> SnapshotEntry {
        SnapshotEntry {
            gauge_id: id.to_string(),
            friendly_name: friendly.to_string(),
            location_name: location.to_string(),
            outcome,
        }
    }

    fn snapshot(entries: Vec<SnapshotEntry>, duration: f64) -> Snapshot {
        let success_count = entries.iter().filter(|e| e.outcome.is_success()).count();
        let gauge_count = entries.len();
        Snapshot {
            entries: entries
                .into_iter()
                .map(|e| (e.gauge_id.clone(), e))
                .collect::<HashMap<_, _>>(),
            gauge_count,
            success_count,
            failure_count: gauge_count - success_count,
            scrape_duration_seconds: duration,
        }
    }

    #[test]
    fn test_render_empty_snapshot() {
        let output = render_snapshot(&Snapshot::empty());

        assert!(output.contains("# TYPE dwr_streamflow_cfs gauge"));
        assert!(output.contains("dwr_exporter_gauges_total 0"));
        assert!(output.contains("dwr_exporter_scrape_success_total 0"));
        assert!(output.contains("dwr_exporter_scrape_failure_total 0"));
        assert!(output.contains("dwr_exporter_scrape_duration_seconds 0"));
    }

    #[test]
    fn test_render_success_and_failure_rows() {
        let snap = snapshot(
            vec![
                entry("A", "The A Gauge", "Station A", FetchOutcome::Success(12.5)),
                entry(
                    "B",
                    "B",
                    "B",
                    FetchOutcome::Failure(FailureReason::NoData),
                ),
            ],
            0.25,
        );

        let output = render_snapshot(&snap);

        assert!(output.contains(
            "dwr_streamflow_cfs{friendly_name=\"The A Gauge\",gauge_id=\"A\",location_name=\"Station A\"} 12.5"
        ));
        // Failed gauges are present with an explicit NaN, not omitted.
        assert!(output.contains(
            "dwr_streamflow_cfs{friendly_name=\"B\",gauge_id=\"B\",location_name=\"B\"} NaN"
        ));
        assert!(output.contains("dwr_exporter_gauges_total 2"));
        assert!(output.contains("dwr_exporter_scrape_success_total 1"));
        assert!(output.contains("dwr_exporter_scrape_failure_total 1"));
        assert!(output.contains("dwr_exporter_scrape_duration_seconds 0.25"));
    }

    #[test]
    fn test_render_sorted_by_gauge_id() {
        let snap = snapshot(
            vec![
                entry("Z", "Z", "Z", FetchOutcome::Success(1.0)),
                entry("A", "A", "A", FetchOutcome::Success(2.0)),
                entry("M", "M", "M", FetchOutcome::Success(3.0)),
            ],
            0.0,
        );

        let output = render_snapshot(&snap);
        let a = output.find("gauge_id=\"A\"").unwrap();
        let m = output.find("gauge_id=\"M\"").unwrap();
        let z = output.find("gauge_id=\"Z\"").unwrap();

        assert!(a < m && m < z);
    }

    #[test]
    fn test_label_value_escaping() {
        let snap = snapshot(
            vec![entry(
                "A",
                "say \"hi\"\nback\\slash",
                "A",
                FetchOutcome::Success(1.0),
            )],
            0.0,
        );

        let output = render_snapshot(&snap);
        assert!(output.contains("friendly_name=\"say \\\"hi\\\"\\nback\\\\slash\""));
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.current().gauge_count, 0);

        registry.publish(snapshot(
            vec![entry("A", "A", "A", FetchOutcome::Success(1.0))],
            0.1,
        ));
        assert_eq!(registry.current().gauge_count, 1);

        // Entire replacement: a gauge absent from the new cycle disappears.
        registry.publish(snapshot(
            vec![entry("B", "B", "B", FetchOutcome::Success(2.0))],
            0.1,
        ));
        let current = registry.current();
        assert_eq!(current.gauge_count, 1);
        assert!(current.outcome("A").is_none());
        assert!(current.outcome("B").is_some());
    }

    #[test]
    fn test_reader_keeps_consistent_snapshot_across_publish() {
        let registry = MetricsRegistry::new();
        registry.publish(snapshot(
            vec![entry("A", "A", "A", FetchOutcome::Success(1.0))],
            0.1,
        ));

        let held = registry.current();
        registry.publish(snapshot(
            vec![entry("A", "A", "A", FetchOutcome::Success(9.0))],
            0.1,
        ));

        // The in-progress reader still sees the snapshot it started with.
        assert_eq!(held.outcome("A"), Some(&FetchOutcome::Success(1.0)));
        assert_eq!(
            registry.current().outcome("A"),
            Some(&FetchOutcome::Success(9.0))
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.14), "3.14");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
