use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::routes::AppState;

/// Bearer-token check applied to every route. Only a digest of the
/// token is held in memory or configuration.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let digest = hex::encode(Sha256::digest(token.as_bytes()));
    if digest != state.api_token_sha256 {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}
