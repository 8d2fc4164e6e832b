//! # Web API Application State

use std::sync::Arc;

use crate::store::RecordStore;
use crate::worker::UpdateWorkerHandle;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub worker: UpdateWorkerHandle,
    pub store: Arc<dyn RecordStore>,
    pub environment: String,
}

impl AppState {
    pub fn new(
        worker: UpdateWorkerHandle,
        store: Arc<dyn RecordStore>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            worker,
            store,
            environment: environment.into(),
        }
    }
}
