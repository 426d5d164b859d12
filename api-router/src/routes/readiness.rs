use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if the graph registry root is reachable, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let root = state.manager.store().root();
    let cache = state.manager.cache_stats().await;

    match tokio::fs::try_exists(root).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "registry": "ok" },
                "cache": cache
            })),
        ),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "registry": "fail" },
                "reason": format!("{} does not exist", root.display())
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "registry": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}
