//! HTTP handlers

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use vcd_launcher::{LaunchError, LaunchRequest};

/// Launch error rendered as `{"error": "..."}` with a matching status
#[derive(Debug)]
pub struct ApiError(pub LaunchError);

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &LaunchError) -> StatusCode {
    match err {
        LaunchError::BadRequest(_) | LaunchError::InvalidUser(_) => StatusCode::BAD_REQUEST,
        LaunchError::InvalidApplication(_) => StatusCode::NOT_FOUND,
        LaunchError::Runtime(_) => StatusCode::BAD_GATEWAY,
        LaunchError::ProfileLoad(_) | LaunchError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if self.0.is_client_error() {
            warn!(status = status.as_u16(), error = %self.0, "Launch request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "Launch failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// `POST /` with `{"user": "...", "app": "..."}`.
///
/// Responds with the application key as a JSON string once the container
/// has been created and started.
pub async fn launch_app(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<String>, ApiError> {
    let request: LaunchRequest = serde_json::from_slice(&body)
        .map_err(|e| LaunchError::BadRequest(e.to_string()))?;

    info!(user = %request.user, app = %request.app, "Launch requested");

    let _permit = state
        .launch_slots
        .acquire()
        .await
        .map_err(|_| LaunchError::Runtime("launcher is shutting down".into()))?;

    state.launcher.launch(&request).await?;

    Ok(Json(request.app))
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
    /// Application keys that can be launched
    pub applications: Vec<String>,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        applications: state
            .launcher
            .policy()
            .catalog()
            .applications()
            .map(str::to_string)
            .collect(),
    })
}
