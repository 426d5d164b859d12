use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use middleware_graph_context::graph_context;
use routes::{
    graphs::{
        create_graph, current_graph, delete_graph, get_graph, list_graphs, migrate_graph,
        switch_graph, update_graph,
    },
    liveness::live,
    readiness::ready,
    stats::graph_stats,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
pub mod middleware_graph_context;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require auth when a key is configured)
    let protected = Router::new()
        .route("/graphs", post(create_graph))
        .route("/graphs/list", get(list_graphs))
        .route("/graphs/current", get(current_graph))
        .route(
            "/graphs/{graph_id}",
            get(get_graph).put(update_graph).delete(delete_graph),
        )
        .route("/graphs/{graph_id}/switch", post(switch_graph))
        .route("/graphs/{graph_id}/migrate", post(migrate_graph))
        .route("/graph/stats", get(graph_stats))
        .route_layer(from_fn(graph_context))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use common::{
        engine::{testing::MockEngineFactory, EngineFactory},
        storage::types::graph_record::GraphStats,
        utils::config::AppConfig,
    };
    use graph_manager::GraphManager;
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct TestApp {
        _dir: TempDir,
        factory: Arc<MockEngineFactory>,
        router: Router,
    }

    async fn test_app(api_key: Option<&str>) -> TestApp {
        let dir = tempdir().expect("tempdir");
        let config = AppConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            api_key: api_key.map(String::from),
            ..Default::default()
        };

        let factory = Arc::new(MockEngineFactory::new());
        factory
            .set_stats(
                &config.default_graph_dir(),
                GraphStats {
                    entity_count: 7,
                    relation_count: 3,
                    document_count: 1,
                },
            )
            .await;
        let default_instance = factory
            .construct(&config.default_graph_dir())
            .await
            .expect("default instance");

        let dyn_factory: Arc<dyn EngineFactory> = Arc::clone(&factory) as Arc<dyn EngineFactory>;
        let manager = GraphManager::load(&config, dyn_factory)
            .await
            .expect("manager");
        let state = ApiState::new(&config, Arc::new(manager), default_instance);

        TestApp {
            _dir: dir,
            factory,
            router: api_routes_v1(&state).with_state(state),
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response {
        app.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn create(app: &TestApp, name: &str) -> Value {
        let response = send(
            app,
            request(Method::POST, "/graphs", Some(json!({ "name": name }))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn test_probes_are_public() {
        let app = test_app(Some("secret")).await;

        let live = send(&app, request(Method::GET, "/live", None)).await;
        assert_eq!(live.status(), StatusCode::OK);

        let ready = send(&app, request(Method::GET, "/ready", None)).await;
        assert_eq!(ready.status(), StatusCode::OK);
        let body = json_body(ready).await;
        assert_eq!(body["cache"]["capacity"], 8);
    }

    #[tokio::test]
    async fn test_protected_routes_require_configured_key() {
        let app = test_app(Some("secret")).await;

        let missing = send(&app, request(Method::GET, "/graphs/list", None)).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = send(
            &app,
            Request::builder()
                .uri("/graphs/list")
                .header("X-API-Key", "nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let bearer = send(
            &app,
            Request::builder()
                .uri("/graphs/list")
                .header("Authorization", "Bearer secret")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(bearer.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_list_and_duplicate() {
        let app = test_app(None).await;

        let created = create(&app, "Medical Research").await;
        assert_eq!(created["graph"]["graph_id"], "medical_research");
        assert_eq!(created["graph"]["is_active"], false);

        let duplicate = send(
            &app,
            request(Method::POST, "/graphs", Some(json!({ "name": "Medical Research" }))),
        )
        .await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let list = send(&app, request(Method::GET, "/graphs/list", None)).await;
        let body = json_body(list).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["current_graph"], Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected() {
        let app = test_app(None).await;

        let response = send(
            &app,
            request(Method::POST, "/graphs", Some(json!({ "name": "   " }))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_switch_update_and_delete_active_graph() {
        let app = test_app(None).await;
        create(&app, "Medical").await;

        let switched = send(&app, request(Method::POST, "/graphs/medical/switch", None)).await;
        assert_eq!(switched.status(), StatusCode::OK);

        let current = json_body(send(&app, request(Method::GET, "/graphs/current", None)).await).await;
        assert_eq!(current["graph"]["graph_id"], "medical");

        let updated = send(
            &app,
            request(
                Method::PUT,
                "/graphs/medical",
                Some(json!({ "description": "clinical notes" })),
            ),
        )
        .await;
        assert_eq!(updated.status(), StatusCode::OK);
        assert_eq!(json_body(updated).await["graph"]["description"], "clinical notes");

        let deleted = send(&app, request(Method::DELETE, "/graphs/medical", None)).await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(json_body(deleted).await["current_graph"], Value::Null);

        let current = json_body(send(&app, request(Method::GET, "/graphs/current", None)).await).await;
        assert_eq!(current["graph"], Value::Null);

        let missing = send(&app, request(Method::GET, "/graphs/medical", None)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_broken_graph_switch_is_unavailable() {
        let app = test_app(None).await;
        let created = create(&app, "Broken").await;
        let working_dir = created["graph"]["working_dir"]
            .as_str()
            .expect("working dir")
            .to_string();
        app.factory.fail_for(std::path::Path::new(&working_dir)).await;

        let response = send(&app, request(Method::POST, "/graphs/broken/switch", None)).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stats_follow_graph_context() {
        let app = test_app(None).await;
        create(&app, "Legal").await;

        let fallback = send(&app, request(Method::GET, "/graph/stats", None)).await;
        assert_eq!(fallback.status(), StatusCode::OK);
        assert!(fallback.headers().get("X-Current-Graph-ID").is_none());
        let body = json_body(fallback).await;
        assert_eq!(body["graph_id"], Value::Null);
        assert_eq!(body["entity_count"], 7);

        let by_header = send(
            &app,
            Request::builder()
                .uri("/graph/stats")
                .header("X-Graph-ID", "legal")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(by_header.status(), StatusCode::OK);
        assert_eq!(
            by_header
                .headers()
                .get("X-Current-Graph-ID")
                .and_then(|v| v.to_str().ok()),
            Some("legal")
        );

        let unknown = send(
            &app,
            request(Method::GET, "/graph/stats?graph_id=nonexistent", None),
        )
        .await;
        assert_eq!(unknown.status(), StatusCode::OK);
        let body = json_body(unknown).await;
        assert_eq!(body["graph_id"], "legal");
        assert_eq!(body["fell_back"], true);
    }

    #[tokio::test]
    async fn test_migrate_requires_existing_source() {
        let app = test_app(None).await;
        create(&app, "Target").await;

        let response = send(
            &app,
            request(
                Method::POST,
                "/graphs/target/migrate?source_dir=/definitely/not/here",
                None,
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
