use std::collections::HashMap;

use axum::{
    extract::{Query, Request},
    middleware::Next,
    response::Response,
};

pub const GRAPH_ID_HEADER: &str = "x-graph-id";
pub const CURRENT_GRAPH_HEADER: &str = "x-current-graph-id";
const GRAPH_ID_QUERY: &str = "graph_id";

/// Graph id a request asked for, if any.
#[derive(Debug, Clone, Default)]
pub struct RequestedGraph(pub Option<String>);

impl RequestedGraph {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Reads the requested graph from the `X-Graph-ID` header, falling back to the
/// `graph_id` query parameter.
pub async fn graph_context(mut request: Request, next: Next) -> Response {
    let requested = requested_graph(&request);
    if let Some(graph_id) = requested.as_deref() {
        tracing::debug!(graph_id = %graph_id, "Request carries graph context");
    }
    request.extensions_mut().insert(requested);

    next.run(request).await
}

fn requested_graph(request: &Request) -> RequestedGraph {
    let from_header = request
        .headers()
        .get(GRAPH_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    let graph_id = from_header.or_else(|| {
        Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(mut params)| params.remove(GRAPH_ID_QUERY))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    });

    RequestedGraph(graph_id)
}
