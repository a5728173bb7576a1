//! Metrics collection and export for Livefeed.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const FRAMES_TOTAL: &str = "livefeed_frames_total";
    pub const FRAMES_BYTES: &str = "livefeed_frames_bytes";
    pub const DECODE_ERRORS_TOTAL: &str = "livefeed_decode_errors_total";
    pub const CALLBACK_PANICS_TOTAL: &str = "livefeed_callback_panics_total";
    pub const OPEN_FAILURES_TOTAL: &str = "livefeed_open_failures_total";
    pub const RECONNECTS_TOTAL: &str = "livefeed_reconnects_total";
    pub const GIVE_UPS_TOTAL: &str = "livefeed_give_ups_total";
    pub const CONNECTED: &str = "livefeed_connected";
    pub const MESSAGES_SENT_TOTAL: &str = "livefeed_messages_sent_total";
}

/// Describe all metrics to the installed recorder.
pub fn init_metrics() {
    metrics::describe_counter!(names::FRAMES_TOTAL, "Inbound frames received");
    metrics::describe_counter!(names::FRAMES_BYTES, "Inbound bytes received");
    metrics::describe_counter!(
        names::DECODE_ERRORS_TOTAL,
        "Inbound frames dropped because they failed to decode"
    );
    metrics::describe_counter!(
        names::CALLBACK_PANICS_TOTAL,
        "Subscriber callbacks that panicked"
    );
    metrics::describe_counter!(names::OPEN_FAILURES_TOTAL, "Failed connection opens");
    metrics::describe_counter!(names::RECONNECTS_TOTAL, "Scheduled reconnect attempts");
    metrics::describe_counter!(
        names::GIVE_UPS_TOTAL,
        "Times the reconnect budget was exhausted"
    );
    metrics::describe_gauge!(names::CONNECTED, "1 while the channel is open");
    metrics::describe_counter!(names::MESSAGES_SENT_TOTAL, "Outbound messages written");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics listener.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(%addr, "Metrics server listening");
    Ok(addr)
}

pub(crate) fn record_frame(bytes: usize) {
    counter!(names::FRAMES_TOTAL).increment(1);
    counter!(names::FRAMES_BYTES).increment(bytes as u64);
}

pub(crate) fn record_decode_error(kind: &'static str) {
    counter!(names::DECODE_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub(crate) fn record_callback_panics(count: usize) {
    if count > 0 {
        counter!(names::CALLBACK_PANICS_TOTAL).increment(count as u64);
    }
}

pub(crate) fn record_open_failure() {
    counter!(names::OPEN_FAILURES_TOTAL).increment(1);
}

pub(crate) fn record_reconnect() {
    counter!(names::RECONNECTS_TOTAL).increment(1);
}

pub(crate) fn record_give_up() {
    counter!(names::GIVE_UPS_TOTAL).increment(1);
}

pub(crate) fn set_connected(connected: bool) {
    gauge!(names::CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

pub(crate) fn record_sent() {
    counter!(names::MESSAGES_SENT_TOTAL).increment(1);
}
