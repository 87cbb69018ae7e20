// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use taskcast_core::{ConnectionRegistry, EmissionBridge, HubConfig};
use tokio::runtime::Handle;

use crate::jobs::JobRunner;

/// Shared application state accessible from all route handlers.
///
/// Built once at startup; the registry and bridge inside are the single
/// process-wide instances and are handed to everything that needs them.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: HubConfig,
    /// Subscriber connections and replay buffers for every task.
    pub registry: Arc<ConnectionRegistry>,
    /// Worker-thread entry point for progress and error emission.
    pub bridge: Arc<EmissionBridge>,
    /// Runs task jobs on the blocking pool.
    pub jobs: Arc<JobRunner>,
}

impl AppState {
    /// Create the state with an unconfigured bridge.
    pub fn new(config: HubConfig) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::from_config(&config));
        let bridge = Arc::new(EmissionBridge::new(Arc::clone(&registry), &config));
        let jobs = Arc::new(JobRunner::new(Arc::clone(&registry), Arc::clone(&bridge)));
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            registry,
            bridge,
            jobs,
        })
    }

    /// Create the state and register `runtime` as the owner of connections.
    pub fn new_on(config: HubConfig, runtime: &Handle) -> Arc<Self> {
        let state = Self::new(config);
        state.bridge.configure(runtime);
        state
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_new_is_unconfigured() {
        let state = AppState::new(HubConfig::default());
        assert!(!state.bridge.is_configured());
        assert!(state.uptime_secs() < 1);
    }

    #[tokio::test]
    async fn test_app_state_new_on_configures_bridge() {
        let state = AppState::new_on(HubConfig::default(), &Handle::current());
        assert!(state.bridge.is_configured());
        assert_eq!(state.registry.total_connections(), 0);
        assert_eq!(state.jobs.running_count(), 0);
    }
}
