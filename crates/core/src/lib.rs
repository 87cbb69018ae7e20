// crates/core/src/lib.rs
//! Real-time progress fan-out for long-running background tasks.
//!
//! - [`ConnectionRegistry`]: per-task subscriber lists plus a bounded replay
//!   buffer for messages emitted before anyone subscribed.
//! - [`EmissionBridge`]: lets worker threads hand messages to the runtime
//!   that owns the connections, waiting a bounded time for confirmation.
//! - [`spawn_heartbeat`] / [`reply_to_client_frame`]: keep-alive in both
//!   directions.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod registry;

pub use bridge::EmissionBridge;
pub use config::HubConfig;
pub use connection::{ChannelConnection, ConnectionHandle, ConnectionId};
pub use error::*;
pub use heartbeat::{reply_to_client_frame, spawn_heartbeat, ClientFrame, HeartbeatHandle};
pub use message::*;
pub use registry::{ConnectionRegistry, SharedConnection};
