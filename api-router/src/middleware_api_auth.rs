use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{api_state::ApiState, error::ApiError};

/// Requires the configured API key. Open when no key is configured.
pub async fn api_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let api_key = extract_api_key(&request)
        .ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;

    if api_key != expected {
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(next.run(request).await)
}

fn extract_api_key(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
}
