//! VCD App Provider
//!
//! HTTP front of the launcher. A desktop session posts
//! `{"user": "...", "app": "..."}` to `/` and gets the application container
//! created and started on the shared network.
//!
//! Endpoints:
//! - `POST /` - launch an application for a user
//! - `GET /health` - liveness and the list of launchable applications

pub mod api;
pub mod state;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(api::launch_app))
        .route("/health", get(api::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails; per-request errors never end the loop
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "App provider listening");
    }
    axum::serve(listener, router(state)).await
}
