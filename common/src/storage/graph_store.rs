use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::types::graph_record::{
    validate_description, validate_name, GraphRecord, GraphStats, GraphUpdate,
};
use crate::utils::graph_id;

pub const CONFIG_FILE_NAME: &str = "graphs_config.json";

/// Working directory of `graph_id` below the graphs root.
pub fn working_dir_for(root: &Path, graph_id: &str) -> PathBuf {
    root.join(graph_id)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedGraphs {
    #[serde(default)]
    graphs: Vec<GraphRecord>,
}

/// Durable registry of graph metadata.
///
/// Records live in insertion order in `<root>/graphs_config.json`; every graph
/// owns the sibling directory `<root>/<graph_id>`. All mutations are applied to
/// a copy, persisted, and only then published, so readers never observe a
/// state that is not on disk.
pub struct GraphStore {
    root: PathBuf,
    records: RwLock<Vec<GraphRecord>>,
}

impl GraphStore {
    /// Open (or initialise) the store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let config_path = root.join(CONFIG_FILE_NAME);
        let persisted = match tokio::fs::read(&config_path).await {
            Ok(bytes) => serde_json::from_slice::<PersistedGraphs>(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => PersistedGraphs::default(),
            Err(err) => return Err(err.into()),
        };

        let (records, repaired) = normalize_loaded(&root, persisted.graphs);
        let store = Self {
            root,
            records: RwLock::new(records),
        };

        if repaired {
            let records = store.records.read().await;
            store.persist(&records).await?;
        }

        info!(
            root = %store.root.display(),
            graphs = store.records.read().await.len(),
            "Graph store opened"
        );

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a new, inactive graph and provision its working directory.
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        metadata: Map<String, Value>,
    ) -> Result<GraphRecord, AppError> {
        let name = validate_name(name)?;
        validate_description(description)?;

        let mut records = self.records.write().await;
        if records.iter().any(|r| r.name == name) {
            return Err(AppError::DuplicateName(format!(
                "Graph '{name}' already exists"
            )));
        }

        let graph_id = graph_id::allocate(&name, |candidate| {
            records.iter().any(|r| r.graph_id == candidate)
                || working_dir_for(&self.root, candidate).exists()
        });
        let working_dir = working_dir_for(&self.root, &graph_id);
        tokio::fs::create_dir_all(&working_dir).await?;

        let record = GraphRecord::new(
            graph_id,
            name,
            description.to_string(),
            working_dir,
            metadata,
        );

        let mut next = records.clone();
        next.push(record.clone());
        if let Err(err) = self.persist(&next).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&record.working_dir).await {
                warn!(
                    graph_id = %record.graph_id,
                    error = %cleanup,
                    "Failed to remove working directory after aborted create"
                );
            }
            return Err(err);
        }
        *records = next;

        info!(graph_id = %record.graph_id, name = %record.name, "Graph created");
        Ok(record)
    }

    pub async fn get(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.graph_id == graph_id)
            .cloned()
            .ok_or_else(|| not_found(graph_id))
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Vec<GraphRecord> {
        self.records.read().await.clone()
    }

    pub async fn active_id(&self) -> Option<String> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.is_active)
            .map(|r| r.graph_id.clone())
    }

    /// Make `graph_id` the only active record.
    pub async fn set_active(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        self.mutate(|records| {
            if !records.iter().any(|r| r.graph_id == graph_id) {
                return Err(not_found(graph_id));
            }

            let now = Utc::now();
            let mut activated = None;
            for record in records.iter_mut() {
                let should_be_active = record.graph_id == graph_id;
                if record.is_active != should_be_active {
                    record.is_active = should_be_active;
                    record.updated_at = now;
                }
                if should_be_active {
                    activated = Some(record.clone());
                }
            }

            activated.ok_or_else(|| not_found(graph_id))
        })
        .await
    }

    /// Clear the active flag everywhere, returning the previously active id.
    pub async fn clear_active(&self) -> Result<Option<String>, AppError> {
        if self.active_id().await.is_none() {
            return Ok(None);
        }

        self.mutate(|records| {
            let now = Utc::now();
            let mut previous = None;
            for record in records.iter_mut().filter(|r| r.is_active) {
                record.is_active = false;
                record.updated_at = now;
                previous = Some(record.graph_id.clone());
            }
            Ok(previous)
        })
        .await
    }

    /// Remove a graph's metadata and its working directory.
    ///
    /// The graph must not be active; callers clear the flag first.
    pub async fn delete(&self, graph_id: &str) -> Result<GraphRecord, AppError> {
        let removed = self
            .mutate(|records| {
                let position = records
                    .iter()
                    .position(|r| r.graph_id == graph_id)
                    .ok_or_else(|| not_found(graph_id))?;
                if records.get(position).is_some_and(|r| r.is_active) {
                    return Err(AppError::ActiveGraphDeletion(format!(
                        "Graph '{graph_id}' is active; switch away or clear it before deleting"
                    )));
                }
                Ok(records.remove(position))
            })
            .await?;

        match tokio::fs::remove_dir_all(&removed.working_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                graph_id = %graph_id,
                path = %removed.working_dir.display(),
                error = %err,
                "Failed to remove graph working directory"
            ),
        }

        info!(graph_id = %graph_id, "Graph deleted");
        Ok(removed)
    }

    /// Apply a partial update of name, description, status or metadata.
    pub async fn update(
        &self,
        graph_id: &str,
        update: GraphUpdate,
    ) -> Result<GraphRecord, AppError> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        if let Some(description) = update.description.as_deref() {
            validate_description(description)?;
        }

        self.mutate(|records| {
            if let Some(name) = name.as_deref() {
                if records
                    .iter()
                    .any(|r| r.name == name && r.graph_id != graph_id)
                {
                    return Err(AppError::DuplicateName(format!(
                        "Graph '{name}' already exists"
                    )));
                }
            }

            let record = records
                .iter_mut()
                .find(|r| r.graph_id == graph_id)
                .ok_or_else(|| not_found(graph_id))?;

            if let Some(name) = name {
                record.name = name;
            }
            if let Some(description) = update.description {
                record.description = description;
            }
            if let Some(status) = update.status {
                record.status = status;
            }
            if let Some(metadata) = update.metadata {
                record.metadata = metadata;
            }
            record.updated_at = Utc::now();

            Ok(record.clone())
        })
        .await
    }

    /// Remember the latest counts reported by the graph's engine.
    pub async fn record_stats(&self, graph_id: &str, stats: GraphStats) -> Result<(), AppError> {
        let current = self.get(graph_id).await?;
        if current.stats() == stats {
            return Ok(());
        }

        self.mutate(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.graph_id == graph_id)
                .ok_or_else(|| not_found(graph_id))?;
            record.apply_stats(stats);
            Ok(())
        })
        .await
    }

    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Vec<GraphRecord>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        let output = apply(&mut next)?;
        self.persist(&next).await?;
        *records = next;
        Ok(output)
    }

    async fn persist(&self, records: &[GraphRecord]) -> Result<(), AppError> {
        let payload = serde_json::to_vec_pretty(&PersistedGraphs {
            graphs: records.to_vec(),
        })?;

        let tmp_path = self
            .root
            .join(format!(".{CONFIG_FILE_NAME}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp_path, payload).await?;
        if let Err(err) = tokio::fs::rename(&tmp_path, self.root.join(CONFIG_FILE_NAME)).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        debug!(graphs = records.len(), "Graph store persisted");
        Ok(())
    }
}

fn not_found(graph_id: &str) -> AppError {
    AppError::NotFound(format!("Graph '{graph_id}' not found"))
}

/// Re-derive working directories, drop unusable ids and keep at most one
/// active flag. Returns whether anything had to be repaired.
fn normalize_loaded(root: &Path, loaded: Vec<GraphRecord>) -> (Vec<GraphRecord>, bool) {
    let mut repaired = false;
    let mut seen_active = false;
    let mut records: Vec<GraphRecord> = Vec::with_capacity(loaded.len());

    for mut record in loaded {
        if !graph_id::is_valid(&record.graph_id)
            || records.iter().any(|r| r.graph_id == record.graph_id)
        {
            warn!(graph_id = %record.graph_id, "Skipping unusable graph record");
            repaired = true;
            continue;
        }

        let expected_dir = working_dir_for(root, &record.graph_id);
        if record.working_dir != expected_dir {
            record.working_dir = expected_dir;
            repaired = true;
        }

        if record.is_active {
            if seen_active {
                warn!(graph_id = %record.graph_id, "Clearing extra active flag");
                record.is_active = false;
                repaired = true;
            }
            seen_active = true;
        }

        records.push(record);
    }

    (records, repaired)
}
