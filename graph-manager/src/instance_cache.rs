use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use common::{
    engine::{EngineFactory, EngineHandle},
    error::AppError,
    storage::graph_store::working_dir_for,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct CacheEntry {
    handle: EngineHandle,
    last_access: Instant,
    access_seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    pinned: Option<String>,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    fn touch(&mut self, graph_id: &str) -> Option<EngineHandle> {
        let seq = self.tick();
        let entry = self.entries.get_mut(graph_id)?;
        entry.last_access = Instant::now();
        entry.access_seq = seq;
        Some(Arc::clone(&entry.handle))
    }

    /// Remove least-recently-used unpinned entries until one more fits.
    fn make_room(&mut self, capacity: usize) -> Vec<(String, CacheEntry)> {
        let mut victims = Vec::new();
        while self.entries.len() >= capacity {
            let candidate = self
                .entries
                .iter()
                .filter(|(id, _)| self.pinned.as_deref() != Some(id.as_str()))
                .min_by_key(|(_, entry)| entry.access_seq)
                .map(|(id, _)| id.clone());

            let Some(id) = candidate else {
                break;
            };
            if let Some(entry) = self.entries.remove(&id) {
                victims.push((id, entry));
            }
        }
        victims
    }
}

/// Snapshot of cache occupancy and counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub resident: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub constructions: u64,
    pub evictions: u64,
}

/// Lazily built engine instances, one per graph id.
///
/// Construction for a given id is single-flight: concurrent callers queue on a
/// per-id gate and the first one in builds the engine while the rest reuse it.
/// Distinct ids construct concurrently. When full, the least-recently-accessed
/// entry other than the pinned graph is closed and dropped before a new one is
/// admitted; if only the pinned graph is resident the bound is exceeded by one.
pub struct InstanceCache {
    root: PathBuf,
    factory: Arc<dyn EngineFactory>,
    capacity: usize,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    constructions: AtomicU64,
    evictions: AtomicU64,
}

impl InstanceCache {
    pub fn new(
        root: impl Into<PathBuf>,
        factory: Arc<dyn EngineFactory>,
        capacity: usize,
    ) -> Result<Self, AppError> {
        if capacity == 0 {
            return Err(AppError::Validation(
                "Instance cache capacity must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            root: root.into(),
            factory,
            capacity,
            state: Mutex::new(CacheState::default()),
            inflight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            constructions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Return the engine for `graph_id`, constructing it on first use.
    pub async fn acquire(&self, graph_id: &str) -> Result<EngineHandle, AppError> {
        if let Some(handle) = self.state.lock().await.touch(graph_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(graph_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let result = {
            let _guard = gate.lock().await;
            let cached = self.state.lock().await.touch(graph_id);
            if let Some(handle) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(handle)
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.construct_and_admit(graph_id).await
            }
        };

        // Clones of the gate are only taken under this lock, so a count of two
        // means nobody else is queued on it.
        {
            let mut inflight = self.inflight.lock().await;
            let idle = inflight
                .get(graph_id)
                .is_some_and(|g| Arc::ptr_eq(g, &gate) && Arc::strong_count(&gate) <= 2);
            if idle {
                inflight.remove(graph_id);
            }
        }

        result
    }

    async fn construct_and_admit(&self, graph_id: &str) -> Result<EngineHandle, AppError> {
        let working_dir = working_dir_for(&self.root, graph_id);
        let started = Instant::now();

        let handle = match self.factory.construct(&working_dir).await {
            Ok(handle) => handle,
            Err(err) => {
                let err = match err {
                    AppError::InstanceInit(_) => err,
                    other => AppError::InstanceInit(other.to_string()),
                };
                warn!(graph_id = %graph_id, error = %err, "Engine construction failed");
                return Err(err);
            }
        };
        self.constructions.fetch_add(1, Ordering::Relaxed);

        let victims = {
            let mut state = self.state.lock().await;
            let victims = state.make_room(self.capacity);
            let seq = state.tick();
            state.entries.insert(
                graph_id.to_string(),
                CacheEntry {
                    handle: Arc::clone(&handle),
                    last_access: Instant::now(),
                    access_seq: seq,
                },
            );
            victims
        };

        for (victim_id, entry) in victims {
            debug!(
                graph_id = %victim_id,
                idle_ms = entry.last_access.elapsed().as_millis(),
                "Evicting least recently used engine"
            );
            self.release(&victim_id, &entry.handle).await;
        }

        info!(
            graph_id = %graph_id,
            elapsed_ms = started.elapsed().as_millis(),
            "Engine instance constructed"
        );
        Ok(handle)
    }

    /// Close and drop the engine for `graph_id`. Absent ids are a no-op.
    pub async fn evict(&self, graph_id: &str) -> bool {
        let removed = self.state.lock().await.entries.remove(graph_id);
        match removed {
            Some(entry) => {
                self.release(graph_id, &entry.handle).await;
                true
            }
            None => false,
        }
    }

    /// The cached engine, if resident. Never constructs and does not count as
    /// an access.
    pub async fn peek(&self, graph_id: &str) -> Option<EngineHandle> {
        self.state
            .lock()
            .await
            .entries
            .get(graph_id)
            .map(|entry| Arc::clone(&entry.handle))
    }

    pub async fn contains(&self, graph_id: &str) -> bool {
        self.state.lock().await.entries.contains_key(graph_id)
    }

    /// Exclude `graph_id` from eviction, replacing any previous pin.
    pub async fn set_pinned(&self, graph_id: Option<String>) {
        self.state.lock().await.pinned = graph_id;
    }

    pub async fn stats(&self) -> CacheStats {
        let resident = self.state.lock().await.entries.len();
        CacheStats {
            resident,
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            constructions: self.constructions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Close every resident engine.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.state.lock().await.entries.drain().collect();
        for (graph_id, entry) in drained {
            self.release(&graph_id, &entry.handle).await;
        }
    }

    async fn release(&self, graph_id: &str, handle: &EngineHandle) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = handle.close().await {
            warn!(graph_id = %graph_id, error = %err, "Failed to close engine instance");
        } else {
            debug!(graph_id = %graph_id, "Engine instance released");
        }
    }
}
