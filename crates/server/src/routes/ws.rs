// crates/server/src/routes/ws.rs
//! WebSocket progress channel.
//!
//! - GET /ws/tasks/{task_id}: upgrade and subscribe to a task's updates
//!
//! Each socket is wrapped in a [`ChannelConnection`]: a writer task drains
//! its queue into the socket sink, so registry broadcasts never wait on the
//! network. The read loop only answers `ping` frames; everything else the
//! client sends is ignored.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use taskcast_core::{
    reply_to_client_frame, spawn_heartbeat, ChannelConnection, ConnectionHandle, SharedConnection,
    TaskId,
};
use tracing::{debug, info};

use crate::error::ApiResult;
use crate::metrics::{record_connection_closed, record_connection_opened};
use crate::state::AppState;

/// GET /ws/tasks/{task_id}
///
/// An empty task id is rejected with 400 before the upgrade.
async fn task_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let task_id = TaskId::new(task_id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, task_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, task_id: TaskId) {
    let (mut sink, mut stream) = socket.split();

    let (connection, mut rx) = ChannelConnection::new();
    let connection_id = connection.id();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let shared: SharedConnection = Arc::new(connection.clone());
    state.registry.connect(&task_id, Arc::clone(&shared)).await;
    record_connection_opened();
    info!(task_id = %task_id, connection = %connection_id, "Progress subscriber connected");

    let heartbeat = spawn_heartbeat(
        Arc::clone(&state.registry),
        task_id.clone(),
        shared,
        state.config.heartbeat_interval,
    );

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if let Some(reply) = reply_to_client_frame(text.as_str()) {
                    if connection.send_text(reply).is_err() {
                        break;
                    }
                }
            }
            Ok(WsMessage::Close(_)) => break,
            // Protocol pings are answered by axum.
            Ok(_) => {}
            Err(e) => {
                debug!(task_id = %task_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    heartbeat.stop().await;
    state.registry.disconnect(&task_id, connection_id).await;
    writer.abort();
    record_connection_closed();
    info!(task_id = %task_id, connection = %connection_id, "Progress subscriber disconnected");
}

/// Mounted at the root, outside `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws/tasks/{task_id}", get(task_ws_handler))
}
