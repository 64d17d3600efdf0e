//! Metrics instrumentation for replica-dns.
//!
//! All metrics are prefixed with `replica_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::engine::SelectionSource;

/// Record a handled datagram.
pub fn record_query(result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::WrongZone => "wrong_zone",
        QueryResult::Malformed => "malformed",
        QueryResult::Error => "error",
    };

    counter!("replica_dns.query.count", "result" => result_str).increment(1);
    histogram!("replica_dns.query.duration.seconds").record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Response sent.
    Answered,
    /// Question was outside the served zone; dropped.
    WrongZone,
    /// Datagram could not be decoded as a query; dropped.
    Malformed,
    /// Response could not be built or sent.
    Error,
}

/// Record which path produced a selection.
pub fn record_selection(source: SelectionSource) {
    counter!("replica_dns.selection.count", "source" => source.as_str()).increment(1);
}

/// Record a geolocation failure that degraded to the fallback host.
pub fn record_geo_failure(kind: GeoFailureKind) {
    let kind_str = match kind {
        GeoFailureKind::Failed => "failed",
        GeoFailureKind::Incomplete => "incomplete",
        GeoFailureKind::Timeout => "timeout",
        GeoFailureKind::Transport => "transport",
    };

    counter!("replica_dns.geo.failure.count", "kind" => kind_str).increment(1);
}

/// Geolocation failure kinds.
#[derive(Debug, Clone, Copy)]
pub enum GeoFailureKind {
    /// Service reported an explicit failure.
    Failed,
    /// Success without coordinates.
    Incomplete,
    /// Lookup timed out.
    Timeout,
    /// Transport or decoding error.
    Transport,
}

/// Record the outcome of a measurement request.
pub fn record_measurement_request(outcome: MeasurementRequestOutcome) {
    let outcome_str = match outcome {
        MeasurementRequestOutcome::Queued => "queued",
        MeasurementRequestOutcome::Coalesced => "coalesced",
        MeasurementRequestOutcome::QueueFull => "queue_full",
        MeasurementRequestOutcome::Closed => "closed",
        MeasurementRequestOutcome::Disabled => "disabled",
    };

    counter!("replica_dns.measurement.request.count", "outcome" => outcome_str).increment(1);
}

/// Measurement request outcomes.
#[derive(Debug, Clone, Copy)]
pub enum MeasurementRequestOutcome {
    /// Client queued for measurement.
    Queued,
    /// Client already pending.
    Coalesced,
    /// Queue at capacity; dropped.
    QueueFull,
    /// Worker gone; dropped.
    Closed,
    /// Measurements turned off.
    Disabled,
}

/// Record a single replica probe.
pub fn record_probe(success: bool, duration: std::time::Duration) {
    let result = if success { "success" } else { "error" };
    counter!("replica_dns.probe.count", "result" => result).increment(1);
    histogram!("replica_dns.probe.duration.seconds").record(duration.as_secs_f64());
}

/// Record RTT table size.
pub fn record_rtt_table_counts(replicas: usize, samples: usize) {
    gauge!("replica_dns.rtt.replicas.count").set(replicas as f64);
    gauge!("replica_dns.rtt.samples.count").set(samples as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
