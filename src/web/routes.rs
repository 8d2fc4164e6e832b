//! Route definitions for the trigger and health endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::web::{handlers, state::AppState};

/// Health check routes for monitoring and Kubernetes probes
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
}

/// Update run trigger routes
pub fn update_run_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/v1/update-runs",
        post(handlers::update_runs::trigger_update_run),
    )
}
