//! # Web API Error Types
//!
//! Errors returned by the HTTP surface and their response conversions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::SweepError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Service temporarily unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn service_unavailable(reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            reason: reason.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_code, message) = match &self {
            ApiError::ServiceUnavailable { reason } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                reason.as_str(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        };

        let error_response = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl From<SweepError> for ApiError {
    fn from(err: SweepError) -> Self {
        match err {
            SweepError::WorkerUnavailable(reason) => ApiError::service_unavailable(reason),
            SweepError::TransientStore { .. } => {
                ApiError::service_unavailable("record store unreachable")
            }
            SweepError::DataIntegrity { .. } | SweepError::Configuration(_) => ApiError::Internal,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
