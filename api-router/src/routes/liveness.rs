use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe: 200 while the process is serving requests.
pub async fn live() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": env!("CARGO_PKG_NAME") })),
    )
}
