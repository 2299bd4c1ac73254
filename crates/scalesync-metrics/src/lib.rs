//! Metrics infrastructure for the scale sync engine.
//!
//! This crate provides metric label helpers and describes all metrics emitted by a
//! sync session. It re-exports the `metrics` crate for convenience and defines all
//! metrics as structured [`Metric`] constants to avoid typos and provide rich metadata.
//!
//! # Example
//!
//! ```rust,ignore
//! use scalesync_metrics::{MetricLabels, metric_defs, describe_metrics};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! // Create labels for a session
//! let labels = MetricLabels::new("kitchen-scale");
//!
//! // Use labels with metrics
//! metrics::counter!(metric_defs::LINES_SENT.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use scalesync_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["session", "transfer"]);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// Use the const constructors to create metrics at compile time.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "scalesync.transfer.completed").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for a sync session.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Standard labels present on all session-scoped metrics.
    pub const STANDARD_LABELS: &[&str] = &["session"];

    // ========================================================================
    // Link Metrics
    // ========================================================================

    /// Records framed from the scale's byte stream.
    ///
    /// Labels: session, record (CONN?, READY, SUCCESS, EXIT, TITLES, unknown)
    pub const RECORDS_RECEIVED: Metric = Metric::counter("scalesync.link.records_received")
        .with_description("Records received from the scale")
        .with_unit(Unit::Count)
        .with_labels(&["session", "record"]);

    /// Lines written to the transport.
    pub const LINES_SENT: Metric = Metric::counter("scalesync.link.lines_sent")
        .with_description("Lines sent to the scale")
        .with_unit(Unit::Count)
        .with_labels(&["session"]);

    /// Records received outside the state they are valid in, or malformed.
    pub const PROTOCOL_VIOLATIONS: Metric = Metric::counter("scalesync.link.protocol_violations")
        .with_description("Unexpected or malformed records from the scale")
        .with_unit(Unit::Count)
        .with_labels(&["session"]);

    /// Link-down events observed.
    pub const LINK_DOWN: Metric = Metric::counter("scalesync.link.down")
        .with_description("Transport link-down events")
        .with_unit(Unit::Count)
        .with_labels(&["session"]);

    // ========================================================================
    // Transfer Metrics
    // ========================================================================

    /// Transfers started.
    ///
    /// Labels: session, transfer (add, delete, list)
    pub const TRANSFER_STARTED: Metric = Metric::counter("scalesync.transfer.started")
        .with_description("Transfers started")
        .with_unit(Unit::Count)
        .with_labels(&["session", "transfer"]);

    /// Transfers confirmed by the scale.
    pub const TRANSFER_COMPLETED: Metric = Metric::counter("scalesync.transfer.completed")
        .with_description("Transfers confirmed by the scale")
        .with_unit(Unit::Count)
        .with_labels(&["session", "transfer"]);

    /// Transfers that failed or were aborted.
    ///
    /// Labels: session, transfer, reason
    pub const TRANSFER_FAILED: Metric = Metric::counter("scalesync.transfer.failed")
        .with_description("Transfers that failed or were aborted")
        .with_unit(Unit::Count)
        .with_labels(&["session", "transfer", "reason"]);

    /// Time from request to confirmation.
    pub const TRANSFER_DURATION: Metric = Metric::histogram("scalesync.transfer.duration_ms")
        .with_description("Time from request to the scale's confirmation")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["session", "transfer"]);

    // ========================================================================
    // Catalog Metrics
    // ========================================================================

    /// Recipes in the local list.
    pub const CATALOG_RECIPES: Metric = Metric::gauge("scalesync.catalog.recipes")
        .with_description("Recipes in the local list")
        .with_unit(Unit::Count)
        .with_labels(&["session"]);

    /// All metrics, for bulk registration.
    pub const ALL: &[Metric] = &[
        RECORDS_RECEIVED,
        LINES_SENT,
        PROTOCOL_VIOLATIONS,
        LINK_DOWN,
        TRANSFER_STARTED,
        TRANSFER_COMPLETED,
        TRANSFER_FAILED,
        TRANSFER_DURATION,
        CATALOG_RECIPES,
    ];
}

/// Labels attached to every metric of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Session name (usually the scale's name or address).
    pub session: String,
}

impl MetricLabels {
    /// Create labels for a session.
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }

    /// Returns the labels as key-value pairs for the metrics macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("session", self.session.clone())]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics emitted by a session.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels() {
        let labels = MetricLabels::new("scale");
        assert_eq!(labels.to_labels(), vec![("session", "scale".to_string())]);
    }

    #[test]
    fn test_with_extra_labels() {
        let labels = MetricLabels::new("scale");
        let extended = labels.with(&[("transfer", "add".to_string())]);

        assert_eq!(extended.len(), 2);
        assert!(extended.contains(&("transfer", "add".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::TRANSFER_FAILED.name, "scalesync.transfer.failed");
        assert_eq!(metric_defs::TRANSFER_FAILED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::TRANSFER_DURATION.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::TRANSFER_DURATION.unit, Some(Unit::Milliseconds));
        assert_eq!(metric_defs::CATALOG_RECIPES.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::ALL.len(), 9);
    }

    #[test]
    fn test_all_metrics_carry_session_label() {
        for metric in metric_defs::ALL {
            assert_eq!(metric.labels.first(), Some(&"session"), "{}", metric.name);
            assert!(!metric.description.is_empty(), "{}", metric.name);
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing is a no-op.
        describe_metrics();
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::counter("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.kind.to_string(), "counter");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
    }
}
