//! Scriptable engine factory for tests of the registry layers.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{EngineFactory, EngineHandle, RagEngine};
use crate::error::AppError;
use crate::storage::types::graph_record::GraphStats;

pub struct MockEngine {
    working_dir: PathBuf,
    stats: GraphStats,
    closed: AtomicBool,
    closes: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RagEngine for MockEngine {
    async fn entity_count(&self) -> Result<u64, AppError> {
        Ok(self.stats.entity_count)
    }

    async fn relation_count(&self) -> Result<u64, AppError> {
        Ok(self.stats.relation_count)
    }

    async fn document_count(&self) -> Result<u64, AppError> {
        Ok(self.stats.document_count)
    }

    async fn close(&self) -> Result<(), AppError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Counts constructions and closes; can be told to fail or stall.
#[derive(Default)]
pub struct MockEngineFactory {
    constructions: AtomicUsize,
    closes: Arc<AtomicUsize>,
    delay: Option<Duration>,
    failing: Mutex<HashSet<PathBuf>>,
    stats: Mutex<HashMap<PathBuf, GraphStats>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every construction sleep for `delay` before completing.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn fail_for(&self, working_dir: &Path) {
        self.failing.lock().await.insert(working_dir.to_path_buf());
    }

    pub async fn recover(&self, working_dir: &Path) {
        self.failing.lock().await.remove(working_dir);
    }

    pub async fn set_stats(&self, working_dir: &Path, stats: GraphStats) {
        self.stats
            .lock()
            .await
            .insert(working_dir.to_path_buf(), stats);
    }

    /// Number of constructions started, including failed ones.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn construct(&self, working_dir: &Path) -> Result<EngineHandle, AppError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().await.contains(working_dir) {
            return Err(AppError::InstanceInit(format!(
                "scripted failure for {}",
                working_dir.display()
            )));
        }

        let stats = self
            .stats
            .lock()
            .await
            .get(working_dir)
            .copied()
            .unwrap_or_default();

        Ok(Arc::new(MockEngine {
            working_dir: working_dir.to_path_buf(),
            stats,
            closed: AtomicBool::new(false),
            closes: Arc::clone(&self.closes),
        }))
    }
}
