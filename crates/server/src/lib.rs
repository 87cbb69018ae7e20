// crates/server/src/lib.rs
//! Taskcast server library.
//!
//! Axum front end for the progress hub: the WebSocket subscription endpoint,
//! diagnostics routes and the job runner that feeds worker-thread progress
//! into the registry.

pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::*;
pub use metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// The caller owns `state` and must configure its bridge on the serving
/// runtime before any job emits.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
