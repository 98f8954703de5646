//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok", or "degraded" without a classification service)
    pub status: String,
    /// Module name ("lyra-ca")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Whether annotation runs can be started
    pub annotation_available: bool,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let annotation_available = state.classifier.is_some();

    Json(HealthResponse {
        status: if annotation_available { "ok" } else { "degraded" }.to_string(),
        module: "lyra-ca".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        annotation_available,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
