// crates/core/src/registry.rs
//! Task-keyed connection registry with a bounded replay buffer.
//!
//! One registry instance serves every task. All bookkeeping (connection lists
//! and replay buffers) lives behind a single async mutex; network sends always
//! happen after the lock is released, on a copy of the connection list, so a
//! stalled subscriber cannot hold up registration or broadcasts for other
//! tasks.
//!
//! Invariants:
//! - a task has a connection-list entry only while that list is non-empty;
//! - a task has a buffer entry only while it has no connection-list entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{HubConfig, DEFAULT_BUFFER_CAPACITY};
use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::SendError;
use crate::message::{Message, TaskId};

pub type SharedConnection = Arc<dyn ConnectionHandle>;

#[derive(Default)]
struct RegistryState {
    connections: HashMap<TaskId, Vec<SharedConnection>>,
    buffers: HashMap<TaskId, VecDeque<Message>>,
}

pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    /// Mirror of per-task list lengths, written under `state` and readable
    /// without it.
    counts: DashMap<TaskId, usize>,
    buffer_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_buffer_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn from_config(config: &HubConfig) -> Self {
        Self::with_buffer_capacity(config.buffer_capacity)
    }

    pub fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            counts: DashMap::new(),
            buffer_capacity: capacity.max(1),
        }
    }

    /// Register `handle` as a live subscriber of `task_id`, then replay any
    /// messages buffered while the task had no subscriber.
    ///
    /// The buffer is removed whether or not the replay succeeds. A failed
    /// replay send stops the replay to this handle but keeps it registered.
    pub async fn connect(&self, task_id: &TaskId, handle: SharedConnection) {
        let replay: Vec<Message> = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let list = state.connections.entry(task_id.clone()).or_default();
            list.push(Arc::clone(&handle));
            let total = list.len();
            self.counts.insert(task_id.clone(), total);

            let replay: Vec<Message> = state
                .buffers
                .remove(task_id)
                .map(Vec::from)
                .unwrap_or_default();

            info!(
                task_id = %task_id,
                connection_id = %handle.id(),
                connections = total,
                replaying = replay.len(),
                "Subscriber connected"
            );
            replay
        };

        for message in &replay {
            match handle.send(message).await {
                Ok(()) => {
                    debug!(
                        task_id = %task_id,
                        stage = message.stage_label(),
                        "Replayed buffered message"
                    );
                }
                Err(e) => {
                    warn!(
                        task_id = %task_id,
                        connection_id = %handle.id(),
                        error = %e,
                        "Failed to replay buffered message, stopping replay"
                    );
                    counter!("taskcast_send_failures_total").increment(1);
                    break;
                }
            }
        }
    }

    /// Remove the handle identified by `connection_id` from `task_id`.
    ///
    /// Idempotent: returns `false` when the handle was already gone. The
    /// task's entry is dropped as soon as its list becomes empty.
    pub async fn disconnect(&self, task_id: &TaskId, connection_id: ConnectionId) -> bool {
        let mut state = self.state.lock().await;

        let Some(list) = state.connections.get_mut(task_id) else {
            debug!(task_id = %task_id, "Disconnect for task with no connections");
            return false;
        };

        let Some(pos) = list.iter().position(|c| c.id() == connection_id) else {
            debug!(task_id = %task_id, connection_id = %connection_id, "Connection already removed");
            return false;
        };

        list.remove(pos);
        let remaining = list.len();
        info!(
            task_id = %task_id,
            connection_id = %connection_id,
            remaining,
            "Subscriber disconnected"
        );

        if remaining == 0 {
            state.connections.remove(task_id);
            self.counts.remove(task_id);
            debug!(task_id = %task_id, "Removed empty connection list");
        } else {
            self.counts.insert(task_id.clone(), remaining);
        }
        true
    }

    /// Send `message` to every live subscriber of `task_id`, in connect order.
    ///
    /// With no subscriber the message is appended to the task's replay buffer,
    /// evicting the oldest entry once the buffer is full. A failing
    /// subscriber is logged and skipped; it stays registered until the
    /// transport disconnects it.
    pub async fn broadcast(&self, task_id: &TaskId, message: Message) {
        let connections = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            match state.connections.get(task_id) {
                Some(list) => list.clone(),
                None => {
                    let buffer = state.buffers.entry(task_id.clone()).or_default();
                    let stage = message.stage_label();
                    buffer.push_back(message);
                    while buffer.len() > self.buffer_capacity {
                        buffer.pop_front();
                    }
                    info!(
                        task_id = %task_id,
                        stage,
                        buffer_size = buffer.len(),
                        "Buffered message for task with no subscribers"
                    );
                    counter!("taskcast_messages_buffered_total").increment(1);
                    return;
                }
            }
        };

        for connection in &connections {
            let _ = self.send_to(task_id, connection.as_ref(), &message).await;
        }
    }

    /// Deliver one message to one handle, logging and counting the outcome.
    ///
    /// This is the per-connection step of [`broadcast`](Self::broadcast),
    /// exposed for senders that target a single subscriber.
    pub async fn send_to(
        &self,
        task_id: &TaskId,
        connection: &dyn ConnectionHandle,
        message: &Message,
    ) -> Result<(), SendError> {
        match connection.send(message).await {
            Ok(()) => {
                counter!("taskcast_messages_delivered_total", "type" => message.kind())
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    connection_id = %connection.id(),
                    kind = message.kind(),
                    error = %e,
                    "Failed to send message to subscriber"
                );
                counter!("taskcast_send_failures_total").increment(1);
                Err(e)
            }
        }
    }

    /// Live subscriber count for `task_id`. Does not take the registry lock,
    /// so it may trail an in-flight connect or disconnect.
    pub fn connection_count(&self, task_id: &str) -> usize {
        self.counts.get(task_id).map(|c| *c).unwrap_or(0)
    }

    /// Sum of live subscribers across all tasks, same consistency as
    /// [`connection_count`](Self::connection_count).
    pub fn total_connections(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Drop any buffered messages for `task_id`. Returns whether a buffer existed.
    pub async fn clear_buffer(&self, task_id: &TaskId) -> bool {
        let mut state = self.state.lock().await;
        let cleared = state.buffers.remove(task_id).is_some();
        if cleared {
            debug!(task_id = %task_id, "Cleared message buffer");
        }
        cleared
    }

    /// Whether `task_id` currently has a connection-list entry.
    pub async fn has_connections_entry(&self, task_id: &TaskId) -> bool {
        self.state.lock().await.connections.contains_key(task_id)
    }

    /// Number of messages buffered for `task_id`; `None` when no buffer exists.
    pub async fn buffered_len(&self, task_id: &TaskId) -> Option<usize> {
        self.state.lock().await.buffers.get(task_id).map(VecDeque::len)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
