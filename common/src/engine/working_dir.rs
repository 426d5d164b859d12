use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{EngineFactory, EngineHandle, RagEngine};
use crate::error::AppError;
use crate::storage::types::graph_record::GraphStats;

pub const ENTITIES_FILE: &str = "vdb_entities.json";
pub const RELATIONSHIPS_FILE: &str = "vdb_relationships.json";
pub const DOC_STATUS_FILE: &str = "kv_store_doc_status.json";

/// Engine over the index snapshot kept in a LightRAG-style working directory.
///
/// Counts are read once at construction; a malformed index file fails the
/// construction instead of surfacing later as zero counts.
pub struct WorkingDirEngine {
    working_dir: PathBuf,
    stats: GraphStats,
    closed: AtomicBool,
}

impl WorkingDirEngine {
    pub async fn load(working_dir: &Path) -> Result<Self, AppError> {
        let metadata = tokio::fs::metadata(working_dir).await.map_err(|e| {
            AppError::InstanceInit(format!(
                "working directory {} is unavailable: {e}",
                working_dir.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(AppError::InstanceInit(format!(
                "{} is not a directory",
                working_dir.display()
            )));
        }

        let stats = GraphStats {
            entity_count: count_vector_rows(&working_dir.join(ENTITIES_FILE)).await?,
            relation_count: count_vector_rows(&working_dir.join(RELATIONSHIPS_FILE)).await?,
            document_count: count_doc_status_keys(&working_dir.join(DOC_STATUS_FILE)).await?,
        };

        debug!(
            working_dir = %working_dir.display(),
            entities = stats.entity_count,
            relations = stats.relation_count,
            documents = stats.document_count,
            "Loaded working directory index"
        );

        Ok(Self {
            working_dir: working_dir.to_path_buf(),
            stats,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::InternalError(format!(
                "engine for {} is closed",
                self.working_dir.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RagEngine for WorkingDirEngine {
    async fn entity_count(&self) -> Result<u64, AppError> {
        self.ensure_open()?;
        Ok(self.stats.entity_count)
    }

    async fn relation_count(&self) -> Result<u64, AppError> {
        self.ensure_open()?;
        Ok(self.stats.relation_count)
    }

    async fn document_count(&self) -> Result<u64, AppError> {
        self.ensure_open()?;
        Ok(self.stats.document_count)
    }

    async fn close(&self) -> Result<(), AppError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Factory producing [`WorkingDirEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkingDirEngineFactory;

#[async_trait]
impl EngineFactory for WorkingDirEngineFactory {
    async fn construct(&self, working_dir: &Path) -> Result<EngineHandle, AppError> {
        let engine = WorkingDirEngine::load(working_dir).await?;
        Ok(Arc::new(engine))
    }
}

async fn read_index_file(path: &Path) -> Result<Option<Value>, AppError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(AppError::InstanceInit(format!(
                "failed to read {}: {err}",
                path.display()
            )))
        }
    };

    serde_json::from_slice(&bytes).map(Some).map_err(|err| {
        AppError::InstanceInit(format!("corrupted index file {}: {err}", path.display()))
    })
}

// Vector stores keep their rows under a top-level `data` array.
async fn count_vector_rows(path: &Path) -> Result<u64, AppError> {
    match read_index_file(path).await? {
        None => Ok(0),
        Some(Value::Object(map)) => Ok(map
            .get("data")
            .and_then(Value::as_array)
            .map_or(0, |rows| len_as_u64(rows.len()))),
        Some(_) => Err(AppError::InstanceInit(format!(
            "unexpected layout in {}",
            path.display()
        ))),
    }
}

async fn count_doc_status_keys(path: &Path) -> Result<u64, AppError> {
    match read_index_file(path).await? {
        None => Ok(0),
        Some(Value::Object(map)) => Ok(len_as_u64(map.len())),
        Some(_) => Err(AppError::InstanceInit(format!(
            "unexpected layout in {}",
            path.display()
        ))),
    }
}

fn len_as_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}
