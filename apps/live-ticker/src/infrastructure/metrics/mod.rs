//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: Decoded, malformed and stale stream messages
//! - **Connection**: Stream connection state and reconnects
//! - **Subscriptions**: Subscribed symbols and attached consumers
//! - **Snapshot**: Snapshot outcomes and latency
//! - **Proxy**: Forwarded request outcomes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port. Recording before
//! `init_metrics` is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
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
        "live_ticker_messages_received_total",
        "Decoded stream updates by message kind"
    );
    describe_counter!(
        "live_ticker_messages_malformed_total",
        "Stream frames or elements that failed to decode"
    );
    describe_counter!(
        "live_ticker_updates_stale_total",
        "Stream updates discarded as older than the applied state"
    );
    describe_counter!(
        "live_ticker_reconnects_total",
        "Stream reconnection attempts"
    );
    describe_gauge!(
        "live_ticker_stream_connected",
        "1 when the ticker stream is connected"
    );
    describe_gauge!(
        "live_ticker_subscribed_symbols",
        "Symbols multiplexed into the stream connection"
    );
    describe_gauge!("live_ticker_consumers", "Consumers attached to the hub");
    describe_counter!(
        "live_ticker_snapshot_requests_total",
        "Snapshot requests by outcome"
    );
    describe_histogram!(
        "live_ticker_snapshot_seconds",
        "Snapshot request latency"
    );
    describe_counter!(
        "live_ticker_proxy_requests_total",
        "Forwarded proxy requests by route and status"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for snapshot requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Baselines loaded.
    Success,
    /// Source returned an error.
    Error,
    /// Source did not answer in time.
    Timeout,
}

impl SnapshotOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

/// Record a decoded stream update.
pub fn record_message_received(kind: &'static str) {
    counter!("live_ticker_messages_received_total", "kind" => kind).increment(1);
}

/// Record malformed frames or elements.
pub fn record_messages_malformed(count: u64) {
    counter!("live_ticker_messages_malformed_total").increment(count);
}

/// Record a discarded stale update.
pub fn record_update_stale() {
    counter!("live_ticker_updates_stale_total").increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("live_ticker_reconnects_total").increment(1);
}

/// Update the stream connection gauge.
pub fn set_stream_connected(connected: bool) {
    gauge!("live_ticker_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the subscribed symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_symbols(count: usize) {
    gauge!("live_ticker_subscribed_symbols").set(count as f64);
}

/// Update the attached consumer count.
#[allow(clippy::cast_precision_loss)]
pub fn set_consumers(count: usize) {
    gauge!("live_ticker_consumers").set(count as f64);
}

/// Record a snapshot request.
pub fn record_snapshot(outcome: SnapshotOutcome, duration: Duration) {
    counter!("live_ticker_snapshot_requests_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("live_ticker_snapshot_seconds").record(duration.as_secs_f64());
}

/// Record a forwarded proxy request.
pub fn record_proxy_request(route: &'static str, status: u16) {
    counter!(
        "live_ticker_proxy_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
