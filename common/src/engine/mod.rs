//! Capability interface of the underlying RAG engine.
//!
//! The registry never looks inside an engine: it constructs one per graph
//! working directory, asks it for counts, and closes it on eviction.

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod working_dir;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;
use crate::storage::types::graph_record::GraphStats;

/// An initialized engine bound to one graph's data.
#[async_trait]
pub trait RagEngine: Send + Sync {
    async fn entity_count(&self) -> Result<u64, AppError>;

    async fn relation_count(&self) -> Result<u64, AppError>;

    async fn document_count(&self) -> Result<u64, AppError>;

    /// Release the engine's resources. Further calls may fail.
    async fn close(&self) -> Result<(), AppError>;
}

/// Shared handle to a constructed engine.
pub type EngineHandle = Arc<dyn RagEngine>;

/// Builds engines for working directories.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Construct an engine over `working_dir`, failing with
    /// [`AppError::InstanceInit`] when the directory cannot be loaded.
    async fn construct(&self, working_dir: &Path) -> Result<EngineHandle, AppError>;
}

/// Collect all three counts from an engine.
pub async fn collect_stats(engine: &dyn RagEngine) -> Result<GraphStats, AppError> {
    Ok(GraphStats {
        entity_count: engine.entity_count().await?,
        relation_count: engine.relation_count().await?,
        document_count: engine.document_count().await?,
    })
}
