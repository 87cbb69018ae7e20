// crates/server/src/routes/health.rs
//! Liveness and hub status.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// False until the serving runtime has been registered; emissions are
    /// dropped before that.
    pub bridge_configured: bool,
    /// Live subscribers across all tasks.
    pub connections: usize,
    pub running_jobs: usize,
}

/// GET /api/health
///
/// Reports `degraded` while the emission bridge is unconfigured.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let bridge_configured = state.bridge.is_configured();
    Json(HealthResponse {
        status: if bridge_configured { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        bridge_configured,
        connections: state.registry.total_connections(),
        running_jobs: state.jobs.running_count(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
