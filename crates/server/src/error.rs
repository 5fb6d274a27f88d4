use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use hearth_categorize::{PipelineError, StoreError};

/// Request-level failure taxonomy. Internal causes are logged here and
/// never echoed back to the caller.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Validation(String),
    Internal(anyhow::Error),
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        ApiError::Internal(error.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::Internal(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "authorization required".to_string())
            }
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(cause) => {
                tracing::error!("request failed: {cause:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
