// crates/core/src/heartbeat.rs
//! Per-connection keep-alive.
//!
//! Outbound: every connection gets a loop that sends a `heartbeat` message on
//! a fixed interval, independent of job activity, so proxies do not close an
//! idle socket during a long transcription. Inbound: a client `ping` frame is
//! answered with `pong` straight on the same connection, never through the
//! registry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::message::{Message, TaskId};
use crate::registry::{ConnectionRegistry, SharedConnection};

/// A running heartbeat loop. Must be [`stop`](Self::stop)ped before the
/// connection it targets is torn down.
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Cancel the loop and wait for it to exit, so no heartbeat send can race
    /// the teardown of its connection.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Heartbeat task ended abnormally");
            }
        }
    }

    /// True once the loop has exited on its own (send failure) or been stopped.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Start the heartbeat loop for one connection of `task_id`.
///
/// The loop sleeps `interval`, sends one heartbeat to `connection` through the
/// registry's per-connection send path, and repeats until cancelled or until
/// a send fails.
///
/// Heartbeats target only this connection and skip
/// [`ConnectionRegistry::broadcast`]: broadcasting would give each viewer one
/// heartbeat per open connection on the task, and a failed send has to end
/// this loop. [`ConnectionRegistry::send_to`] is the per-connection step that
/// broadcast itself runs, so delivery and failure logging are shared.
pub fn spawn_heartbeat(
    registry: Arc<ConnectionRegistry>,
    task_id: TaskId,
    connection: SharedConnection,
    interval: Duration,
) -> HeartbeatHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(task_id = %task_id, "Heartbeat loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let heartbeat = Message::heartbeat();
                    if let Err(e) = registry.send_to(&task_id, connection.as_ref(), &heartbeat).await {
                        debug!(task_id = %task_id, error = %e, "Heartbeat loop ending");
                        break;
                    }
                    debug!(task_id = %task_id, "Heartbeat sent");
                }
            }
        }
    });

    HeartbeatHandle { cancel, join }
}

/// Frames a client may send on the progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KeepAliveReply {
    Pong,
}

/// Encoded reply for an inbound text frame, if it calls for one.
///
/// `{"type":"ping"}` yields `{"type":"pong"}`; anything else, including
/// malformed JSON, yields `None`.
pub fn reply_to_client_frame(text: &str) -> Option<String> {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Ping) => serde_json::to_string(&KeepAliveReply::Pong).ok(),
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognised client frame");
            None
        }
    }
}
