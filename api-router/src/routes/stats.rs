use axum::{
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::engine::collect_stats;
use serde_json::json;

use crate::{
    api_state::ApiState,
    error::ApiError,
    middleware_graph_context::{RequestedGraph, CURRENT_GRAPH_HEADER},
};

/// Counts of the graph this request resolves to.
pub async fn graph_stats(
    State(state): State<ApiState>,
    Extension(requested): Extension<RequestedGraph>,
) -> Result<Response, ApiError> {
    let resolved = state
        .resolver
        .resolve_instance_for_request(requested.as_deref())
        .await;
    let stats = collect_stats(resolved.handle.as_ref()).await?;

    let mut response = Json(json!({
        "status": "success",
        "graph_id": resolved.graph_id,
        "fell_back": resolved.fell_back,
        "entity_count": stats.entity_count,
        "relation_count": stats.relation_count,
        "document_count": stats.document_count,
    }))
    .into_response();

    if let Some(value) = resolved
        .graph_id
        .as_deref()
        .and_then(|id| HeaderValue::from_str(id).ok())
    {
        response.headers_mut().insert(CURRENT_GRAPH_HEADER, value);
    }

    Ok(response)
}
