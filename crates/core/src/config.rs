// crates/core/src/config.rs
//! Tuning knobs shared by the registry, bridge and heartbeat driver.

use std::time::Duration;

/// Messages kept per task while nobody is subscribed.
pub const DEFAULT_BUFFER_CAPACITY: usize = 20;

/// Keep-alive cadence; keeps proxies from closing idle sockets during
/// minutes-long transcriptions.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Longest a worker thread waits for the owning runtime to confirm delivery.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    pub buffer_capacity: usize,
    pub heartbeat_interval: Duration,
    pub emit_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            emit_timeout: DEFAULT_EMIT_TIMEOUT,
        }
    }
}

impl HubConfig {
    /// A capacity of zero would silently discard every buffered message, so it
    /// is raised to one.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = timeout;
        self
    }
}
