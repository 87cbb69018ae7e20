// crates/server/src/main.rs
//! Taskcast server binary.
//!
//! Registers the serving runtime with the emission bridge, then serves the
//! progress WebSocket and diagnostics routes until Ctrl-C.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use taskcast_core::HubConfig;
use taskcast_server::{create_app, init_metrics, AppState};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "taskcast", about = "Real-time progress server for long-running tasks")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "TASKCAST_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "TASKCAST_PORT", default_value_t = 47900)]
    port: u16,

    /// Seconds between heartbeats on each connection.
    #[arg(long, default_value_t = 30)]
    heartbeat_secs: u64,

    /// Seconds a worker waits for an emission to be delivered.
    #[arg(long, default_value_t = 5)]
    emit_timeout_secs: u64,

    /// Messages retained per task while nobody is subscribed.
    #[arg(long, default_value_t = 20)]
    buffer_capacity: usize,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig::default()
            .with_buffer_capacity(self.buffer_capacity)
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_secs.max(1)))
            .with_emit_timeout(Duration::from_secs(self.emit_timeout_secs))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,taskcast_server=info,taskcast_core=info".into()),
        )
        .init();

    let args = Args::parse();
    init_metrics();

    let config = args.hub_config();
    info!(
        buffer_capacity = config.buffer_capacity,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        emit_timeout_secs = config.emit_timeout.as_secs(),
        "Starting taskcast"
    );
    let state = AppState::new_on(config, &Handle::current());
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
