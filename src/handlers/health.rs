use axum::{extract::State, Json};
use crate::models::{HealthResponse, ReadyResponse};
use crate::state::AppState;
use tracing::debug;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse)
    )
)]
pub async fn ready_check(State(state): State<AppState>) -> Json<ReadyResponse> {
    debug!("Readiness check requested");
    // The hub lives in memory, so being able to read it is readiness.
    let stats = state.hub.stats().await;
    Json(ReadyResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
        connections: stats.connections as u32,
    })
}
