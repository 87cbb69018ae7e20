// crates/server/src/routes/metrics.rs
//! Prometheus metrics endpoint.
//!
//! Exposes application metrics in Prometheus text format at `GET /metrics`.

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::error::ApiError;
use crate::metrics::render_metrics;
use crate::state::AppState;

/// GET /metrics - Returns 503 if metrics are not initialized.
pub async fn metrics_handler() -> Response {
    match render_metrics() {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        None => ApiError::MetricsUnavailable.into_response(),
    }
}

/// Not under `/api`: `/metrics` is the conventional scrape path.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}
