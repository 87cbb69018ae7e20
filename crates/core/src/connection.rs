// crates/core/src/connection.rs
//! Abstract subscriber connections.
//!
//! The transport owns accept/close; the registry only ever holds handles and
//! calls `send` on them.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::SendError;
use crate::message::Message;

/// Identity of one connected subscriber, used to remove the right handle on
/// disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A transport-owned capability able to push one message to one subscriber.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    fn id(&self) -> ConnectionId;

    async fn send(&self, message: &Message) -> Result<(), SendError>;
}

/// Connection backed by an unbounded channel drained by a socket writer task.
///
/// Sends never wait on the network: the frame is queued and the writer task
/// pushes it to the socket. Once the writer task has gone away every send
/// fails with [`SendError::Closed`].
#[derive(Clone)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    /// Queue an already-encoded frame, bypassing any registry bookkeeping.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.tx.send(text.into()).map_err(|_| SendError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl ConnectionHandle for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        let json = message.to_json()?;
        self.send_text(json)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::*;

    /// Records every message it is asked to send.
    pub struct RecordingConnection {
        id: ConnectionId,
        received: Mutex<Vec<Message>>,
    }

    impl RecordingConnection {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(),
                received: Mutex::new(Vec::new()),
            })
        }

        pub fn received(&self) -> Vec<Message> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConnectionHandle for RecordingConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        async fn send(&self, message: &Message) -> Result<(), SendError> {
            self.received.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Accepts `succeed_first` sends, then fails every later one.
    pub struct FailingConnection {
        id: ConnectionId,
        succeed_first: usize,
        attempts: AtomicUsize,
    }

    impl FailingConnection {
        pub fn new() -> Arc<Self> {
            Self::after(0)
        }

        pub fn after(succeed_first: usize) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(),
                succeed_first,
                attempts: AtomicUsize::new(0),
            })
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConnectionHandle for FailingConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        async fn send(&self, _message: &Message) -> Result<(), SendError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.succeed_first {
                Ok(())
            } else {
                Err(SendError::Transport("socket reset".to_string()))
            }
        }
    }

    /// Parks inside `send` until [`release`](Self::release) is called.
    pub struct StalledConnection {
        id: ConnectionId,
        gate: Notify,
        delivered: Mutex<Vec<Message>>,
    }

    impl StalledConnection {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(),
                gate: Notify::new(),
                delivered: Mutex::new(Vec::new()),
            })
        }

        pub fn release(&self) {
            self.gate.notify_one();
        }

        pub fn delivered(&self) -> Vec<Message> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConnectionHandle for StalledConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        async fn send(&self, message: &Message) -> Result<(), SendError> {
            self.gate.notified().await;
            self.delivered.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}
