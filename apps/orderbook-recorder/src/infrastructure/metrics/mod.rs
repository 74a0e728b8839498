//! Prometheus Metrics Module
//!
//! Exposes recorder metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames, classified events and decode failures
//! - **Persistence**: records written and records skipped per event kind
//! - **Session**: keep-alive probes and the current session state
//! - **Reference**: refresh outcomes, stale enrichments and last values
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. The recording
//! functions are no-ops until [`init_metrics`] installs the recorder, so unit
//! tests can call them freely.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::events::EventKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "orderbook_recorder_frames_received_total",
        "Total text frames received from the market channel"
    );
    describe_counter!(
        "orderbook_recorder_events_classified_total",
        "Total events classified by kind"
    );
    describe_counter!(
        "orderbook_recorder_decode_errors_total",
        "Total frames or frame elements dropped because they could not be decoded"
    );
    describe_counter!(
        "orderbook_recorder_records_written_total",
        "Total records appended to the event logs"
    );
    describe_counter!(
        "orderbook_recorder_records_skipped_total",
        "Total events not persisted because their kind is disabled"
    );
    describe_counter!(
        "orderbook_recorder_keepalive_probes_total",
        "Total keep-alive probes sent"
    );
    describe_gauge!(
        "orderbook_recorder_session_state",
        "Session state (0 connecting, 1 subscribed, 2 closing, 3 closed)"
    );
    describe_counter!(
        "orderbook_recorder_reference_refresh_total",
        "Reference source refreshes by field and outcome"
    );
    describe_counter!(
        "orderbook_recorder_stale_enrichments_total",
        "Snapshots enriched with a missing or stale reference pair"
    );
    describe_gauge!(
        "orderbook_recorder_reference_value",
        "Latest reference value by field"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Which reference field a refresh targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceField {
    /// Real-time value.
    Current,
    /// Hourly open.
    PeriodOpen,
}

impl ReferenceField {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::PeriodOpen => "period_open",
        }
    }
}

/// Record an inbound text frame.
pub fn record_frame_received() {
    counter!("orderbook_recorder_frames_received_total").increment(1);
}

/// Record a classified event.
pub fn record_event_classified(kind: EventKind) {
    counter!(
        "orderbook_recorder_events_classified_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a frame or element that failed to decode.
pub fn record_decode_error(reason: &'static str) {
    counter!(
        "orderbook_recorder_decode_errors_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record a record appended to a log.
pub fn record_written(kind: EventKind) {
    counter!(
        "orderbook_recorder_records_written_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an event dropped because its kind is disabled.
pub fn record_skipped(kind: EventKind) {
    counter!(
        "orderbook_recorder_records_skipped_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a keep-alive probe.
pub fn record_keepalive_probe() {
    counter!("orderbook_recorder_keepalive_probes_total").increment(1);
}

/// Update the session state gauge.
pub fn set_session_state(code: f64) {
    gauge!("orderbook_recorder_session_state").set(code);
}

/// Record the outcome of one reference refresh.
pub fn record_reference_refresh(field: ReferenceField, ok: bool) {
    counter!(
        "orderbook_recorder_reference_refresh_total",
        "field" => field.as_str(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record a snapshot enriched without a fresh reference pair.
pub fn record_stale_enrichment() {
    counter!("orderbook_recorder_stale_enrichments_total").increment(1);
}

/// Update the gauge for a reference value.
pub fn set_reference_value(field: ReferenceField, value: f64) {
    gauge!(
        "orderbook_recorder_reference_value",
        "field" => field.as_str()
    )
    .set(value);
}

// =============================================================================
// Tests
// =============================================================================
