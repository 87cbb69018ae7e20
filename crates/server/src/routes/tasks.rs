// crates/server/src/routes/tasks.rs
//! Diagnostics for task subscriptions.
//!
//! - GET /api/tasks/{task_id}/connections: live subscriber count

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use taskcast_core::TaskId;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ConnectionCountResponse {
    pub task_id: String,
    pub connections: usize,
    pub job_running: bool,
}

/// GET /api/tasks/{task_id}/connections
async fn connection_count(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ConnectionCountResponse>> {
    let task_id = TaskId::new(task_id)?;
    Ok(Json(ConnectionCountResponse {
        connections: state.registry.connection_count(task_id.as_str()),
        job_running: state.jobs.is_running(task_id.as_str()),
        task_id: task_id.into(),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/{task_id}/connections", get(connection_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use taskcast_core::{ChannelConnection, HubConfig};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_connection_count_reflects_registry() {
        let state = AppState::new(HubConfig::default());
        let (conn, _rx) = ChannelConnection::new();
        state
            .registry
            .connect(&TaskId::new("t1").unwrap(), Arc::new(conn))
            .await;

        let app = Router::new().nest("/api", router()).with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks/t1/connections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: ConnectionCountResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.task_id, "t1");
        assert_eq!(json.connections, 1);
        assert!(!json.job_running);
    }
}
