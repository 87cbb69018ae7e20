// crates/server/src/metrics.rs
//! Prometheus metrics.
//!
//! The core records its counters through the `metrics` facade; this module
//! installs the recorder, describes every series and renders them for
//! `/metrics`.

use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    let mut installed = false;
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        } else {
            installed = true;
        }
        handle
    });

    if installed {
        describe_metrics();
        tracing::info!("Prometheus metrics initialized");
    }
    installed
}

fn describe_metrics() {
    describe_counter!(
        "taskcast_messages_delivered_total",
        "Messages handed to a live subscriber connection"
    );
    describe_counter!(
        "taskcast_messages_buffered_total",
        "Messages buffered for tasks with no subscriber"
    );
    describe_counter!(
        "taskcast_send_failures_total",
        "Per-connection send failures"
    );
    describe_counter!(
        "taskcast_emit_failures_total",
        "Worker emissions that were not confirmed, by reason"
    );
    describe_gauge!("taskcast_ws_connections", "Open WebSocket subscriber connections");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_connection_opened() {
    gauge!("taskcast_ws_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("taskcast_ws_connections").decrement(1.0);
}
