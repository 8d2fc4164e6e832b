//! # Web API
//!
//! HTTP surface of the engine: a fire-and-forget trigger for update runs and
//! health probes.

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Create the web application with all routes and middleware
pub fn create_app(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let common_middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout));

    let app = Router::new()
        .merge(routes::health_routes())
        .merge(routes::update_run_routes())
        .layer(common_middleware)
        .with_state(state);

    info!("Web application created with all routes and middleware");
    app
}
