use std::sync::Arc;

use common::{engine::EngineHandle, error::AppError};
use tracing::{debug, error, warn};

use crate::manager::GraphManager;

/// Engine chosen for a request and the graph it belongs to.
#[derive(Clone)]
pub struct ResolvedInstance {
    pub handle: EngineHandle,
    /// `None` when the default engine was chosen.
    pub graph_id: Option<String>,
    /// Set when an explicitly requested graph could not be served.
    pub fell_back: bool,
}

/// Picks the engine a request runs against.
///
/// Order: the graph named by the request, then the active graph, then the
/// default engine. Resolution never fails.
#[derive(Clone)]
pub struct RequestResolver {
    manager: Arc<GraphManager>,
    default_instance: EngineHandle,
}

impl RequestResolver {
    pub fn new(manager: Arc<GraphManager>, default_instance: EngineHandle) -> Self {
        Self {
            manager,
            default_instance,
        }
    }

    pub fn manager(&self) -> &Arc<GraphManager> {
        &self.manager
    }

    pub async fn resolve_instance_for_request(&self, requested: Option<&str>) -> ResolvedInstance {
        let requested = requested.map(str::trim).filter(|id| !id.is_empty());
        let mut fell_back = false;

        if let Some(graph_id) = requested {
            match self.manager.activate_graph(graph_id).await {
                Ok((record, handle)) => {
                    return ResolvedInstance {
                        handle,
                        graph_id: Some(record.graph_id),
                        fell_back,
                    };
                }
                Err(err @ (AppError::NotFound(_) | AppError::InstanceInit(_))) => {
                    warn!(graph_id = %graph_id, error = %err, "Requested graph unavailable, falling back");
                }
                Err(err) => {
                    error!(graph_id = %graph_id, error = %err, "Switching to requested graph failed, falling back");
                }
            }
            fell_back = true;
        }

        if let Some((graph_id, handle)) = self.manager.current_binding().await {
            return ResolvedInstance {
                handle,
                graph_id: Some(graph_id),
                fell_back,
            };
        }

        debug!("No active graph, serving the default instance");
        ResolvedInstance {
            handle: Arc::clone(&self.default_instance),
            graph_id: None,
            fell_back,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::engine::testing::MockEngineFactory;
    use common::engine::{collect_stats, EngineFactory};
    use common::storage::types::graph_record::GraphStats;
    use serde_json::Map;
    use tempfile::{tempdir, TempDir};

    const DEFAULT_STATS: GraphStats = GraphStats {
        entity_count: 99,
        relation_count: 99,
        document_count: 99,
    };

    struct Fixture {
        _dir: TempDir,
        factory: Arc<MockEngineFactory>,
        resolver: RequestResolver,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().expect("tempdir");
        let factory = Arc::new(MockEngineFactory::new());
        let default_dir = dir.path().join("default_graph");
        factory.set_stats(&default_dir, DEFAULT_STATS).await;
        let default_instance = factory
            .construct(&default_dir)
            .await
            .expect("default instance");

        let dyn_factory: Arc<dyn EngineFactory> = Arc::clone(&factory) as Arc<dyn EngineFactory>;
        let manager = GraphManager::open(dir.path().join("graphs"), dyn_factory, 4)
            .await
            .expect("manager");

        Fixture {
            _dir: dir,
            factory,
            resolver: RequestResolver::new(Arc::new(manager), default_instance),
        }
    }

    async fn entity_count(resolved: &ResolvedInstance) -> u64 {
        collect_stats(resolved.handle.as_ref())
            .await
            .expect("stats")
            .entity_count
    }

    #[tokio::test]
    async fn test_no_active_graph_serves_default() {
        let fx = fixture().await;

        let resolved = fx.resolver.resolve_instance_for_request(None).await;

        assert!(resolved.graph_id.is_none());
        assert!(!resolved.fell_back);
        assert_eq!(entity_count(&resolved).await, 99);
    }

    #[tokio::test]
    async fn test_unknown_graph_falls_back_to_default() {
        let fx = fixture().await;

        let resolved = fx
            .resolver
            .resolve_instance_for_request(Some("nonexistent"))
            .await;

        assert!(resolved.graph_id.is_none());
        assert!(resolved.fell_back);
        assert_eq!(entity_count(&resolved).await, 99);
    }

    #[tokio::test]
    async fn test_requested_graph_replaces_active_graph() {
        let fx = fixture().await;
        let manager = fx.resolver.manager();
        let a = manager
            .create_graph("A", "", Map::new())
            .await
            .expect("create A");
        let b = manager
            .create_graph("B", "", Map::new())
            .await
            .expect("create B");
        fx.factory
            .set_stats(
                &b.working_dir,
                GraphStats {
                    entity_count: 2,
                    ..GraphStats::default()
                },
            )
            .await;
        manager.switch_graph(&a.graph_id).await.expect("switch A");

        let resolved = fx.resolver.resolve_instance_for_request(Some("b")).await;

        assert_eq!(resolved.graph_id.as_deref(), Some("b"));
        assert!(!resolved.fell_back);
        assert_eq!(entity_count(&resolved).await, 2);
        assert_eq!(manager.current_graph_id().await.as_deref(), Some("b"));
        let active: Vec<_> = manager
            .list_graphs()
            .await
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| r.graph_id)
            .collect();
        assert_eq!(active, vec!["b".to_string()]);
        assert!(!manager.store().get(&a.graph_id).await.expect("get A").is_active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_served_the_graph_they_asked_for() {
        let fx = fixture().await;
        let manager = fx.resolver.manager();
        for (name, entities) in [("A", 1), ("B", 2)] {
            let record = manager
                .create_graph(name, "", Map::new())
                .await
                .expect("create");
            fx.factory
                .set_stats(
                    &record.working_dir,
                    GraphStats {
                        entity_count: entities,
                        ..GraphStats::default()
                    },
                )
                .await;
        }

        let mut tasks = Vec::new();
        for i in 0..400 {
            let resolver = fx.resolver.clone();
            let requested = if i % 2 == 0 { "a" } else { "b" };
            tasks.push(tokio::spawn(async move {
                let resolved = resolver.resolve_instance_for_request(Some(requested)).await;
                let entities = collect_stats(resolved.handle.as_ref())
                    .await
                    .map(|s| s.entity_count)
                    .ok();
                (requested, resolved.graph_id, resolved.fell_back, entities)
            }));
        }

        for task in tasks {
            let (requested, served, fell_back, entities) = task.await.expect("join");
            let expected_entities = if requested == "a" { 1 } else { 2 };
            assert_eq!(served.as_deref(), Some(requested));
            assert!(!fell_back);
            assert_eq!(entities, Some(expected_entities));
        }
    }

    #[tokio::test]
    async fn test_unknown_graph_falls_back_to_active_graph() {
        let fx = fixture().await;
        let manager = fx.resolver.manager();
        manager
            .create_graph("Medical", "", Map::new())
            .await
            .expect("create");
        manager.switch_graph("medical").await.expect("switch");

        let resolved = fx
            .resolver
            .resolve_instance_for_request(Some("does_not_exist"))
            .await;

        assert_eq!(resolved.graph_id.as_deref(), Some("medical"));
        assert!(resolved.fell_back);
        assert_eq!(manager.current_graph_id().await.as_deref(), Some("medical"));
    }

    #[tokio::test]
    async fn test_blank_request_is_treated_as_absent() {
        let fx = fixture().await;

        let resolved = fx.resolver.resolve_instance_for_request(Some("   ")).await;

        assert!(resolved.graph_id.is_none());
        assert!(!resolved.fell_back);
    }

    #[tokio::test]
    async fn test_broken_graph_falls_back_without_switching() {
        let fx = fixture().await;
        let manager = fx.resolver.manager();
        manager
            .create_graph("Medical", "", Map::new())
            .await
            .expect("create medical");
        let broken = manager
            .create_graph("Broken", "", Map::new())
            .await
            .expect("create broken");
        manager.switch_graph("medical").await.expect("switch");
        fx.factory.fail_for(&broken.working_dir).await;

        let resolved = fx.resolver.resolve_instance_for_request(Some("broken")).await;

        assert_eq!(resolved.graph_id.as_deref(), Some("medical"));
        assert!(resolved.fell_back);
        assert_eq!(manager.store().active_id().await.as_deref(), Some("medical"));
    }
}
