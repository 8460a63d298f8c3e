//! Metrics infrastructure for fitsync.
//!
//! This crate describes every metric recorded by the link session, the tracker
//! session and the sync runner. It re-exports the `metrics` crate for
//! convenience and defines all metrics as structured [`Metric`] constants to
//! avoid typos and keep name, unit and labels together.
//!
//! # Example
//!
//! ```rust,ignore
//! use fitsync_metrics::{metric_defs, describe_metrics};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! metrics::counter!(metric_defs::LINK_FRAMES_TX.name, "message_id" => "0x4f").increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use fitsync_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["operation"]);
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
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "fitsync.link.frames_tx").
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
    ///
    /// This should be called once at startup for each metric.
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

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Link Layer Metrics
    // ========================================================================

    /// Frames written to the transport.
    ///
    /// Labels: message_id
    pub const LINK_FRAMES_TX: Metric = Metric::counter("fitsync.link.frames_tx")
        .with_description("ANT frames written to the transport")
        .with_unit(Unit::Count)
        .with_labels(&["message_id"]);

    /// Valid frames read from the transport.
    ///
    /// Labels: message_id
    pub const LINK_FRAMES_RX: Metric = Metric::counter("fitsync.link.frames_rx")
        .with_description("Valid ANT frames read from the transport")
        .with_unit(Unit::Count)
        .with_labels(&["message_id"]);

    /// Bytes dropped while hunting for a sync byte.
    pub const LINK_RESYNC_DISCARDED: Metric = Metric::counter("fitsync.link.resync_discarded_bytes")
        .with_description("Bytes discarded while resynchronizing the receive stream")
        .with_unit(Unit::Bytes);

    /// Candidate frames dropped for a bad length byte or checksum.
    pub const LINK_FRAMES_REJECTED: Metric = Metric::counter("fitsync.link.frames_rejected")
        .with_description("Candidate frames rejected for bad length or checksum")
        .with_unit(Unit::Count);

    /// Transfers the dongle reported as failed.
    ///
    /// Labels: operation
    pub const LINK_TX_FAILURES: Metric = Metric::counter("fitsync.link.tx_failures")
        .with_description("Acknowledged or burst transfers reported failed by the dongle")
        .with_unit(Unit::Count)
        .with_labels(&["operation"]);

    /// Retry loops that ran out of attempts.
    ///
    /// Labels: operation
    pub const LINK_RETRIES_EXHAUSTED: Metric = Metric::counter("fitsync.link.retries_exhausted")
        .with_description("Bounded retry loops that ran out of attempts")
        .with_unit(Unit::Count)
        .with_labels(&["operation"]);

    // ========================================================================
    // Tracker Metrics
    // ========================================================================

    /// Opcode attempts sent to the tracker.
    pub const TRACKER_OPCODE_ATTEMPTS: Metric = Metric::counter("fitsync.tracker.opcode_attempts")
        .with_description("Opcode attempts sent to the tracker")
        .with_unit(Unit::Count);

    /// Data bank pages received.
    pub const TRACKER_DATA_BANK_PAGES: Metric = Metric::counter("fitsync.tracker.data_bank_pages")
        .with_description("Data bank pages received from the tracker")
        .with_unit(Unit::Count);

    /// Size of each completed data bank.
    pub const TRACKER_DATA_BANK_BYTES: Metric = Metric::histogram("fitsync.tracker.data_bank_bytes")
        .with_description("Bytes in each completed data bank")
        .with_unit(Unit::Bytes);

    // ========================================================================
    // Sync Runner Metrics
    // ========================================================================

    /// Completed sync cycles.
    ///
    /// Labels: result
    pub const SYNC_CYCLES: Metric = Metric::counter("fitsync.sync.cycles")
        .with_description("Sync cycles run, by result")
        .with_unit(Unit::Count)
        .with_labels(&["result"]);

    /// Wall-clock duration of a sync cycle.
    pub const SYNC_CYCLE_TIME: Metric = Metric::histogram("fitsync.sync.cycle_time_ms")
        .with_description("Wall-clock duration of a sync cycle in milliseconds")
        .with_unit(Unit::Milliseconds);

    /// Remote ops fetched for the latest cycle.
    pub const SYNC_OPS_QUEUED: Metric = Metric::gauge("fitsync.sync.ops_queued")
        .with_description("Remote ops fetched for the most recent sync cycle")
        .with_unit(Unit::Count);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Link
        &LINK_FRAMES_TX,
        &LINK_FRAMES_RX,
        &LINK_RESYNC_DISCARDED,
        &LINK_FRAMES_REJECTED,
        &LINK_TX_FAILURES,
        &LINK_RETRIES_EXHAUSTED,
        // Tracker
        &TRACKER_OPCODE_ATTEMPTS,
        &TRACKER_DATA_BANK_PAGES,
        &TRACKER_DATA_BANK_BYTES,
        // Sync runner
        &SYNC_CYCLES,
        &SYNC_CYCLE_TIME,
        &SYNC_OPS_QUEUED,
    ];
}

/// Describes all metrics.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus exporter listening on `addr` and describe all metrics.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::LINK_FRAMES_TX.name, "fitsync.link.frames_tx");
        assert_eq!(metric_defs::LINK_FRAMES_TX.kind, MetricKind::Counter);
        assert_eq!(metric_defs::LINK_FRAMES_TX.labels, &["message_id"]);
        assert_eq!(metric_defs::LINK_RESYNC_DISCARDED.unit, Some(Unit::Bytes));
        assert_eq!(metric_defs::TRACKER_DATA_BANK_BYTES.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::SYNC_CYCLES.labels, &["result"]);
        assert_eq!(metric_defs::SYNC_OPS_QUEUED.kind, MetricKind::Gauge);
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::gauge("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.kind, MetricKind::Gauge);
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
        assert_eq!(MINIMAL.kind.to_string(), "gauge");
    }

    #[test]
    fn test_describe_without_recorder() {
        // Describing with no recorder installed is a no-op.
        describe_metrics();
    }
}
