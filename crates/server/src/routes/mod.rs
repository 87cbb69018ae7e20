//! Route handlers for the progress server.

pub mod health;
pub mod metrics;
pub mod tasks;
pub mod ws;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET /api/health - Health check
/// - GET /api/tasks/{task_id}/connections - Live subscriber count for a task
/// - GET /ws/tasks/{task_id} - WebSocket progress channel
/// - GET /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", tasks::router())
        .merge(ws::router())
        .merge(metrics::router())
        .with_state(state)
}
