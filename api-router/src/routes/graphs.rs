use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::graph_record::GraphUpdate;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateGraphRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct MigrateParams {
    pub source_dir: String,
}

pub async fn create_graph(
    State(state): State<ApiState>,
    Json(input): Json<CreateGraphRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(name = %input.name, "Received create graph request");

    let record = state
        .manager
        .create_graph(&input.name, &input.description, input.metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "graph": record })),
    ))
}

pub async fn list_graphs(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let graphs = state.manager.list_graphs().await;
    let current_graph = state.manager.current_graph_id().await;

    Ok(Json(json!({
        "status": "success",
        "total": graphs.len(),
        "current_graph": current_graph,
        "graphs": graphs,
    })))
}

pub async fn current_graph(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let graph = state.manager.current_graph().await?;

    Ok(Json(json!({ "status": "success", "graph": graph })))
}

pub async fn get_graph(
    State(state): State<ApiState>,
    Path(graph_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let graph = state.manager.get_graph(&graph_id).await?;

    Ok(Json(json!({ "status": "success", "graph": graph })))
}

pub async fn update_graph(
    State(state): State<ApiState>,
    Path(graph_id): Path<String>,
    Json(update): Json<GraphUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let graph = state.manager.update_graph(&graph_id, update).await?;

    Ok(Json(json!({ "status": "success", "graph": graph })))
}

pub async fn delete_graph(
    State(state): State<ApiState>,
    Path(graph_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.manager.delete_graph(&graph_id).await?;
    let current_graph = state.manager.current_graph_id().await;

    Ok(Json(json!({
        "status": "success",
        "graph_id": removed.graph_id,
        "current_graph": current_graph,
    })))
}

pub async fn switch_graph(
    State(state): State<ApiState>,
    Path(graph_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let graph = state.manager.switch_graph(&graph_id).await?;

    Ok(Json(json!({ "status": "success", "graph": graph })))
}

pub async fn migrate_graph(
    State(state): State<ApiState>,
    Path(graph_id): Path<String>,
    Query(params): Query<MigrateParams>,
) -> Result<impl IntoResponse, ApiError> {
    let source_dir = params.source_dir.trim();
    if source_dir.is_empty() {
        return Err(ApiError::ValidationError(
            "source_dir must not be empty".to_string(),
        ));
    }

    let report = state
        .manager
        .migrate_into_graph(&graph_id, &PathBuf::from(source_dir))
        .await?;

    Ok(Json(json!({ "status": "success", "report": report })))
}
