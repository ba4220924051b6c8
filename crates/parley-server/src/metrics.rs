//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. Without an installed recorder every call here
//! is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const FRAMES_TOTAL: &str = "parley_frames_total";
    pub const EVENTS_PUBLISHED_TOTAL: &str = "parley_events_published_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "parley_events_dropped_total";
    pub const SUBSCRIBERS_ACTIVE: &str = "parley_subscribers_active";
    pub const LATENCY_SECONDS: &str = "parley_latency_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Describe every metric to the installed recorder.
fn describe_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames sent or received");
    metrics::describe_counter!(
        names::EVENTS_PUBLISHED_TOTAL,
        "Total number of events published to the hub"
    );
    metrics::describe_counter!(
        names::EVENTS_DROPPED_TOTAL,
        "Events discarded because a connection fell behind"
    );
    metrics::describe_gauge!(
        names::SUBSCRIBERS_ACTIVE,
        "Current number of hub subscribers"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound frame handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Install the Prometheus recorder, serve it on `port`, and describe
/// every metric.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame. `direction` is `inbound` or `outbound`.
pub fn record_frame(direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
}

/// Record an event published on behalf of a client.
pub fn record_event_published(kind: &'static str) {
    counter!(names::EVENTS_PUBLISHED_TOTAL, "kind" => kind).increment(1);
}

/// Record events lost to a full inbox.
pub fn record_events_dropped(count: u64) {
    if count > 0 {
        counter!(names::EVENTS_DROPPED_TOTAL).increment(count);
    }
}

/// Update the hub subscriber count.
pub fn set_active_subscribers(count: usize) {
    gauge!(names::SUBSCRIBERS_ACTIVE).set(count as f64);
}

/// Record frame handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
