//! # Update Run Trigger
//!
//! Accepts a request to sweep unmarked records and hands it to the background
//! worker. The response never describes the run: it only confirms acceptance.

use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::web::errors::ApiResult;
use crate::web::state::AppState;

/// Trigger an update run: POST /v1/update-runs
///
/// Returns `202 Accepted` with an empty body as soon as the run is queued, or
/// `503 Service Unavailable` when the worker can no longer accept runs.
pub async fn trigger_update_run(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    let receipt = state.worker.trigger().inspect_err(|err| {
        warn!(error = %err, "Rejected update run trigger");
    })?;

    debug!(
        run_id = %receipt.run_id,
        coalesced = receipt.coalesced,
        "Update run trigger accepted"
    );
    Ok(StatusCode::ACCEPTED)
}
