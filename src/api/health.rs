//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    uptime_seconds: u64,
    active_sessions: usize,
}

/// Build the health route
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// **GET /health** - Health check endpoint
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "medscribe".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.startup_time.elapsed().as_secs(),
        active_sessions: state.sessions.session_count().await,
    })
}
