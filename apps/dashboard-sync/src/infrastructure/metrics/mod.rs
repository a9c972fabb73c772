//! Prometheus Metrics Module
//!
//! Exposes synchronization metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: Events received, decode failures, connection state, reconnects
//! - **Topics**: Active topic subscriptions
//! - **Refresh**: Fetches by trigger, coalesced triggers, failures, latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::events::EventKind;
use crate::domain::refresh::RefreshTrigger;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
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
    // Feed
    describe_counter!(
        "dashboard_feed_events_received_total",
        "Total live events received from the feed by kind"
    );
    describe_counter!(
        "dashboard_feed_decode_errors_total",
        "Total feed messages that failed to decode"
    );
    describe_counter!(
        "dashboard_feed_events_lagged_total",
        "Total live events skipped by slow event streams"
    );
    describe_gauge!(
        "dashboard_feed_connected",
        "1 when the feed connection is open, 0 otherwise"
    );
    describe_counter!(
        "dashboard_feed_reconnects_total",
        "Total feed reconnection attempts"
    );

    // Topics
    describe_gauge!(
        "dashboard_feed_active_topics",
        "Number of topics with at least one consumer"
    );

    // Refresh
    describe_counter!(
        "dashboard_refresh_total",
        "Total widget fetches by trigger"
    );
    describe_counter!(
        "dashboard_refresh_coalesced_total",
        "Total triggers absorbed into a pending re-fetch"
    );
    describe_counter!(
        "dashboard_refresh_failures_total",
        "Total failed widget fetches"
    );
    describe_histogram!(
        "dashboard_refresh_duration_seconds",
        "Widget fetch latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a live event received from the feed.
pub fn record_event_received(kind: EventKind) {
    counter!(
        "dashboard_feed_events_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a feed message that could not be decoded.
pub fn record_decode_error() {
    counter!("dashboard_feed_decode_errors_total").increment(1);
}

/// Record events skipped by a lagging event stream.
pub fn record_events_lagged(kind: EventKind, count: u64) {
    counter!(
        "dashboard_feed_events_lagged_total",
        "kind" => kind.as_str()
    )
    .increment(count);
}

/// Update the feed connection gauge.
pub fn set_feed_connected(connected: bool) {
    gauge!("dashboard_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a feed reconnection attempt.
pub fn record_reconnect() {
    counter!("dashboard_feed_reconnects_total").increment(1);
}

/// Update the active topic count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_topics(count: usize) {
    gauge!("dashboard_feed_active_topics").set(count as f64);
}

/// Record a widget fetch starting.
pub fn record_refresh(widget: &str, trigger: RefreshTrigger) {
    counter!(
        "dashboard_refresh_total",
        "widget" => widget.to_string(),
        "trigger" => trigger.as_str()
    )
    .increment(1);
}

/// Record a trigger absorbed while a fetch was in flight.
pub fn record_refresh_coalesced(widget: &str) {
    counter!(
        "dashboard_refresh_coalesced_total",
        "widget" => widget.to_string()
    )
    .increment(1);
}

/// Record a failed widget fetch.
pub fn record_refresh_failure(widget: &str) {
    counter!(
        "dashboard_refresh_failures_total",
        "widget" => widget.to_string()
    )
    .increment(1);
}

/// Record widget fetch duration.
pub fn record_refresh_duration(widget: &str, duration: Duration) {
    histogram!(
        "dashboard_refresh_duration_seconds",
        "widget" => widget.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
