use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    engine::{collect_stats, EngineFactory, EngineHandle},
    error::AppError,
    storage::{
        graph_store::GraphStore,
        types::graph_record::{GraphRecord, GraphStats, GraphUpdate},
    },
    utils::config::AppConfig,
};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    instance_cache::{CacheStats, InstanceCache},
    migration::{copy_storage_files, restore_storage_files, MigrationReport, StorageCopy},
};

/// Registry of named graphs and the switch between them.
///
/// Writers (`create`, `switch`, `update`, `delete`, `migrate`) run one at a
/// time under `writer`, so the store flags, the current pointer and the cache
/// pin always move together. The current pointer sits behind its own `RwLock`
/// so readers get a consistent snapshot without queueing behind a writer that
/// is waiting on engine construction.
pub struct GraphManager {
    store: GraphStore,
    cache: InstanceCache,
    current: RwLock<Option<String>>,
    writer: Mutex<()>,
}

impl GraphManager {
    pub fn new(store: GraphStore, cache: InstanceCache) -> Self {
        Self {
            store,
            cache,
            current: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Open the store under `root`, build the cache and restore the graph that
    /// was active when the process last stopped.
    pub async fn open(
        root: impl Into<PathBuf>,
        factory: Arc<dyn EngineFactory>,
        max_cached_instances: usize,
    ) -> Result<Self, AppError> {
        let root = root.into();
        let store = GraphStore::open(&root).await?;
        let cache = InstanceCache::new(&root, factory, max_cached_instances)?;
        let manager = Self::new(store, cache);
        manager.restore_active().await?;
        Ok(manager)
    }

    pub async fn load(config: &AppConfig, factory: Arc<dyn EngineFactory>) -> Result<Self, AppError> {
        Self::open(config.graphs_root(), factory, config.max_cached_instances).await
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    async fn restore_active(&self) -> Result<(), AppError> {
        let _writer = self.writer.lock().await;
        let Some(graph_id) = self.store.active_id().await else {
            return Ok(());
        };

        match self.cache.acquire(&graph_id).await {
            Ok(_) => {
                self.cache.set_pinned(Some(graph_id.clone())).await;
                info!(graph_id = %graph_id, "Restored active graph");
                *self.current.write().await = Some(graph_id);
            }
            Err(err) => {
                warn!(
                    graph_id = %graph_id,
                    error = %err,
                    "Persisted active graph failed to load; starting with no active graph"
                );
                self.store.clear_active().await?;
            }
        }

        Ok(())
    }

    /// Register a new graph. The new graph is not activated.
    #[instrument(skip(self, description, metadata))]
    pub async fn create_graph(
        &self,
        name: &str,
        description: &str,
        metadata: Map<String, Value>,
    ) -> Result<GraphRecord, AppError> {
        let _writer = self.writer.lock().await;
        self.store.create(name, description, metadata).await
    }

    /// All graphs in creation order; counts are refreshed for graphs whose
    /// engine is already resident and left at their last-known values
    /// otherwise.
    pub async fn list_graphs(&self) -> Vec<GraphRecord> {
        let mut records = self.store.list().await;
        for record in &mut records {
            self.refresh_if_resident(record).await;
        }
        records
    }

    pub async fn get_graph(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        let mut record = self.store.get(graph_id).await?;
        self.refresh_if_resident(&mut record).await;
        Ok(record)
    }

    pub async fn current_graph_id(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    pub async fn current_graph(&self) -> Result<Option<GraphRecord>, AppError> {
        let Some(graph_id) = self.current_graph_id().await else {
            return Ok(None);
        };
        match self.get_graph(&graph_id).await {
            Ok(record) => Ok(Some(record)),
            // Deleted between the two reads.
            Err(AppError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Make `graph_id` the active graph and pre-warm its engine.
    ///
    /// All or nothing: if the engine cannot be built the previous active flag
    /// is restored and the error is returned.
    pub async fn switch_graph(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        self.activate_graph(graph_id).await.map(|(record, _)| record)
    }

    /// [`Self::switch_graph`], also returning the engine acquired for
    /// `graph_id`. The handle belongs to `graph_id` even if another switch
    /// lands right after this one returns.
    #[instrument(skip(self))]
    pub async fn activate_graph(
        &self,
        graph_id: &str,
    ) -> Result<(GraphRecord, EngineHandle), AppError> {
        let _writer = self.writer.lock().await;
        let record = self.store.get(graph_id).await?;

        let current = self.current_graph_id().await;
        if record.is_active && current.as_deref() == Some(graph_id) {
            let handle = self.cache.acquire(graph_id).await?;
            return Ok((record, handle));
        }

        let previous_active = self.store.active_id().await;
        let activated = self.store.set_active(graph_id).await?;

        let handle = match self.cache.acquire(graph_id).await {
            Ok(handle) => handle,
            Err(err) => {
                self.rollback_active(previous_active.as_deref()).await;
                warn!(graph_id = %graph_id, error = %err, "Graph switch rolled back");
                return Err(err);
            }
        };

        self.cache.set_pinned(Some(graph_id.to_string())).await;
        *self.current.write().await = Some(graph_id.to_string());

        info!(
            graph_id = %graph_id,
            previous = ?current,
            "Switched active graph"
        );
        Ok((activated, handle))
    }

    async fn rollback_active(&self, previous: Option<&str>) {
        let outcome = match previous {
            Some(previous) => self.store.set_active(previous).await.map(|_| ()),
            None => self.store.clear_active().await.map(|_| ()),
        };
        if let Err(err) = outcome {
            error!(
                previous = ?previous,
                error = %err,
                "Failed to restore active flag after aborted switch"
            );
        }
    }

    /// Engine of the active graph, if any.
    pub async fn current_instance(&self) -> Option<EngineHandle> {
        self.current_binding().await.map(|(_, handle)| handle)
    }

    /// Active graph id together with its engine.
    ///
    /// Holds the read side of the current pointer while looking the engine up
    /// so a concurrent delete cannot slip in between.
    pub async fn current_binding(&self) -> Option<(String, EngineHandle)> {
        let current = self.current.read().await;
        let graph_id = current.as_deref()?;

        if let Some(handle) = self.cache.peek(graph_id).await {
            return Some((graph_id.to_string(), handle));
        }

        match self.cache.acquire(graph_id).await {
            Ok(handle) => Some((graph_id.to_string(), handle)),
            Err(err) => {
                warn!(graph_id = %graph_id, error = %err, "Active graph engine unavailable");
                None
            }
        }
    }

    /// Remove a graph. Deleting the active graph leaves no graph active.
    #[instrument(skip(self))]
    pub async fn delete_graph(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        let _writer = self.writer.lock().await;
        self.store.get(graph_id).await?;

        if self.deactivate(graph_id).await? {
            info!(graph_id = %graph_id, "Deleting the active graph; no graph is active now");
        }

        self.cache.evict(graph_id).await;
        self.store.delete(graph_id).await
    }

    /// Clear the current pointer, the cache pin and the persisted flag if they
    /// name `graph_id`. Callers hold the writer lock.
    async fn deactivate(&self, graph_id: &str) -> Result<bool, AppError> {
        let was_current = {
            let mut current = self.current.write().await;
            let was_current = current.as_deref() == Some(graph_id);
            if was_current {
                *current = None;
                self.cache.set_pinned(None).await;
            }
            was_current
        };
        if self.store.active_id().await.as_deref() == Some(graph_id) {
            self.store.clear_active().await?;
        }
        Ok(was_current)
    }

    #[instrument(skip(self, update))]
    pub async fn update_graph(
        &self,
        graph_id: &str,
        update: GraphUpdate,
    ) -> Result<GraphRecord, AppError> {
        let _writer = self.writer.lock().await;
        let mut record = self.store.update(graph_id, update).await?;
        self.refresh_if_resident(&mut record).await;
        Ok(record)
    }

    /// Build (if needed) the graph's engine and persist its current counts.
    pub async fn refresh_stats(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        let _writer = self.writer.lock().await;
        let mut record = self.store.get(graph_id).await?;
        let stats = self.load_stats(graph_id).await?;
        record.apply_stats(stats);
        Ok(record)
    }

    /// Acquire the engine and persist its counts. An engine whose counts
    /// cannot be read is evicted again.
    async fn load_stats(&self, graph_id: &str) -> Result<GraphStats, AppError> {
        let handle = self.cache.acquire(graph_id).await?;
        let stats = match collect_stats(handle.as_ref()).await {
            Ok(stats) => stats,
            Err(err) => {
                self.cache.evict(graph_id).await;
                return Err(err);
            }
        };
        self.store.record_stats(graph_id, stats).await?;
        Ok(stats)
    }

    /// Copy LightRAG storage files from `source_dir` into the graph and reload
    /// its engine.
    ///
    /// If the migrated data does not load, the working directory is put back
    /// as it was and the previous engine is reloaded. Should that fail too,
    /// the graph stops being the active one.
    #[instrument(skip(self))]
    pub async fn migrate_into_graph(
        &self,
        graph_id: &str,
        source_dir: &Path,
    ) -> Result<MigrationReport, AppError> {
        let _writer = self.writer.lock().await;
        let record = self.store.get(graph_id).await?;

        let copy = copy_storage_files(source_dir, &record.working_dir).await?;

        self.cache.evict(graph_id).await;
        let is_current = self.current_graph_id().await.as_deref() == Some(graph_id);
        let stats = match self.load_stats(graph_id).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(graph_id = %graph_id, error = %err, "Migrated graph failed to load");
                self.undo_migration(graph_id, &record.working_dir, &copy, is_current)
                    .await;
                return Err(err);
            }
        };
        if !is_current {
            self.cache.evict(graph_id).await;
        }

        let StorageCopy {
            migrated: migrated_files,
            skipped: skipped_files,
            ..
        } = copy;
        info!(
            graph_id = %graph_id,
            migrated = migrated_files.len(),
            skipped = skipped_files.len(),
            "Migrated data into graph"
        );

        Ok(MigrationReport {
            graph_id: graph_id.to_string(),
            migrated_files,
            skipped_files,
            entity_count: stats.entity_count,
            relation_count: stats.relation_count,
            document_count: stats.document_count,
        })
    }

    async fn undo_migration(
        &self,
        graph_id: &str,
        working_dir: &Path,
        copy: &StorageCopy,
        is_current: bool,
    ) {
        if let Err(err) = restore_storage_files(working_dir, copy).await {
            error!(graph_id = %graph_id, error = %err, "Failed to restore files after migration");
        }
        self.cache.evict(graph_id).await;
        if !is_current {
            return;
        }

        let Err(err) = self.cache.acquire(graph_id).await else {
            return;
        };
        warn!(
            graph_id = %graph_id,
            error = %err,
            "Active graph does not load after migration rollback; no graph is active now"
        );
        if let Err(err) = self.deactivate(graph_id).await {
            error!(graph_id = %graph_id, error = %err, "Failed to clear active flag");
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Close every cached engine.
    pub async fn shutdown(&self) {
        let _writer = self.writer.lock().await;
        self.cache.close_all().await;
        info!("Graph manager shut down");
    }

    async fn refresh_if_resident(&self, record: &mut GraphRecord) {
        let Some(handle) = self.cache.peek(&record.graph_id).await else {
            return;
        };

        match collect_stats(handle.as_ref()).await {
            Ok(stats) if stats != record.stats() => {
                record.apply_stats(stats);
                if let Err(err) = self.store.record_stats(&record.graph_id, stats).await {
                    debug!(graph_id = %record.graph_id, error = %err, "Could not persist counts");
                }
            }
            Ok(_) => {}
            Err(err) => {
                debug!(graph_id = %record.graph_id, error = %err, "Could not refresh counts");
            }
        }
    }
}
