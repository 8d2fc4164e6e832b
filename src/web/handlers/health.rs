//! # Health Check Handlers

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;
use crate::worker::WorkerStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub timestamp: String,
    pub environment: String,
    pub store: String,
    pub worker: WorkerStatus,
}

/// Basic health check endpoint: GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness probe: GET /health/ready
///
/// Ready when the store answers and the worker still accepts runs.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ReadinessResponse>> {
    if state.worker.is_closed() {
        return Err(ApiError::service_unavailable("update worker has shut down"));
    }

    state.store.health_check().await.map_err(|err| {
        error!(error = %err, "Readiness check failed");
        ApiError::service_unavailable("record store unreachable")
    })?;

    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        environment: state.environment.clone(),
        store: state.store.name().to_string(),
        worker: state.worker.status(),
    }))
}
