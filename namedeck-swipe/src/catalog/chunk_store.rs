//! Chunk fetch, parse and load bookkeeping
//!
//! `ensure_loaded` fetches a chunk at most once no matter how many callers ask for it at
//! the same time. Each chunk has a slot in an in-flight map; the slot's gate serializes
//! attempts and records how the last one ended, so callers that queued behind an attempt
//! share its result instead of starting another fetch. Slots are never removed.
//!
//! The parsed chunk is handed to the caller's install callback while the gate is still
//! held, so every waiter that wakes up afterwards sees the installed entries.

use crate::catalog::partition::PartitionTable;
use crate::catalog::seed::bootstrap_seed;
use crate::catalog::source::{DataSource, Resource};
use crate::error::{ChunkError, Error};
use namedeck_common::events::{EventBus, NamedeckEvent};
use namedeck_common::model::{CatalogManifest, ChunkFile, ChunkMetadata};
use namedeck_common::{time, CatalogEntry};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, warn};

/// Whether an `ensure_loaded` call did the fetch itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Fetched,
    AlreadyLoaded,
}

/// Result of a successful `ensure_loaded`
#[derive(Debug, Clone)]
pub struct ChunkLoad {
    pub metadata: ChunkMetadata,
    pub outcome: ChunkOutcome,
}

/// What the install callback reports back
#[derive(Debug, Clone, Copy)]
pub struct Installed {
    /// Every entry of the chunk is resident after installation
    pub complete: bool,
    /// Resident entry count after installation
    pub resident: usize,
}

#[derive(Debug, Clone)]
enum ChunkState {
    Loaded(ChunkMetadata),
    /// Installed, but some entries have since been evicted; the next miss refetches
    Partial(ChunkMetadata),
}

#[derive(Default)]
struct StateTable {
    chunks: HashMap<String, ChunkState>,
    /// Bumped whenever entries of a chunk leave the resident cache
    evictions: HashMap<String, u64>,
}

#[derive(Default)]
struct AttemptLog {
    completed: u64,
    last_error: Option<ChunkError>,
    /// Metadata of the last attempt that succeeded, even if it installed only partially
    last_loaded: Option<ChunkMetadata>,
}

#[derive(Default)]
struct ChunkSlot {
    gate: AsyncMutex<AttemptLog>,
    /// Mirror of `AttemptLog::completed`, readable without the gate
    completed: AtomicU64,
}

/// Clears the in-flight mark even if the loading future is dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.name);
        }
    }
}

pub struct ChunkStore {
    source: Arc<dyn DataSource>,
    partitions: PartitionTable,
    slots: Mutex<HashMap<String, Arc<ChunkSlot>>>,
    states: Mutex<StateTable>,
    in_flight: Mutex<HashSet<String>>,
    manifest: OnceCell<Arc<CatalogManifest>>,
    seed: Vec<Arc<CatalogEntry>>,
    events: Arc<EventBus>,
}

impl ChunkStore {
    pub fn new(source: Arc<dyn DataSource>, partitions: PartitionTable, events: Arc<EventBus>) -> Self {
        Self {
            source,
            partitions,
            slots: Mutex::new(HashMap::new()),
            states: Mutex::new(StateTable::default()),
            in_flight: Mutex::new(HashSet::new()),
            manifest: OnceCell::new(),
            seed: bootstrap_seed(),
            events,
        }
    }

    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Embedded bootstrap entries
    pub fn seed(&self) -> &[Arc<CatalogEntry>] {
        &self.seed
    }

    /// Make sure `name` is loaded, fetching and installing it if needed
    pub async fn ensure_loaded<F>(&self, name: &str, install: F) -> std::result::Result<ChunkLoad, ChunkError>
    where
        F: FnOnce(&ChunkFile) -> Installed + Send,
    {
        if !self.partitions.contains_chunk(name) {
            return Err(ChunkError::UnknownChunk(name.to_string()));
        }

        if let Some(metadata) = self.loaded_metadata(name) {
            return Ok(ChunkLoad {
                metadata,
                outcome: ChunkOutcome::AlreadyLoaded,
            });
        }

        let slot = self.slot(name);
        let seen = slot.completed.load(Ordering::Acquire);
        let mut log = slot.gate.lock().await;

        if let Some(metadata) = self.loaded_metadata(name) {
            return Ok(ChunkLoad {
                metadata,
                outcome: ChunkOutcome::AlreadyLoaded,
            });
        }

        // An attempt finished while we waited: share its result. A partial install still
        // kept every id pinned by its waiters.
        if log.completed != seen {
            if let Some(err) = &log.last_error {
                debug!(chunk = %name, "Sharing failure of coalesced chunk load");
                return Err(err.clone());
            }
            if let Some(metadata) = &log.last_loaded {
                debug!(chunk = %name, "Sharing coalesced chunk load");
                return Ok(ChunkLoad {
                    metadata: metadata.clone(),
                    outcome: ChunkOutcome::AlreadyLoaded,
                });
            }
        }

        let result = {
            let _guard = self.mark_in_flight(name);
            self.fetch_and_install(name, install).await
        };

        log.completed += 1;
        match &result {
            Ok(metadata) => {
                log.last_error = None;
                log.last_loaded = Some(metadata.clone());
            }
            Err(e) => log.last_error = Some(e.clone()),
        }
        slot.completed.store(log.completed, Ordering::Release);

        if let Err(e) = &result {
            warn!(chunk = %name, error = %e, "Chunk load failed");
            self.events.emit_lossy(NamedeckEvent::ChunkLoadFailed {
                chunk: name.to_string(),
                error: e.to_string(),
                timestamp: time::now(),
            });
        }

        result.map(|metadata| ChunkLoad {
            metadata,
            outcome: ChunkOutcome::Fetched,
        })
    }

    async fn fetch_and_install<F>(&self, name: &str, install: F) -> std::result::Result<ChunkMetadata, ChunkError>
    where
        F: FnOnce(&ChunkFile) -> Installed,
    {
        let bytes = self
            .source
            .fetch(&Resource::Chunk(name.to_string()))
            .await
            .map_err(|e| ChunkError::Fetch {
                chunk: name.to_string(),
                reason: e.to_string(),
            })?;

        let mut file: ChunkFile = serde_json::from_slice(&bytes).map_err(|e| ChunkError::Parse {
            chunk: name.to_string(),
            reason: e.to_string(),
        })?;

        if file.metadata.name != name {
            warn!(
                chunk = %name,
                declared = %file.metadata.name,
                "Chunk file declares a different chunk name"
            );
        }

        if let Some(range) = self.partitions.range_of(name) {
            let before = file.entries.len();
            file.entries.retain(|entry| range.contains(&entry.id));
            let foreign = before - file.entries.len();
            if foreign > 0 {
                warn!(chunk = %name, foreign, "Dropped entries outside the chunk's id range");
            }
        }

        let epoch = self.eviction_epoch(name);
        let installed = install(&file);
        let metadata = file.metadata.clone();

        let complete = {
            let mut states = self.lock_states();
            let complete = installed.complete && states.evictions.get(name).copied().unwrap_or(0) == epoch;
            let state = if complete {
                ChunkState::Loaded(metadata.clone())
            } else {
                ChunkState::Partial(metadata.clone())
            };
            states.chunks.insert(name.to_string(), state);
            complete
        };

        if complete {
            info!(
                chunk = %name,
                entries = file.entries.len(),
                resident = installed.resident,
                "Loaded chunk"
            );
        } else {
            info!(
                chunk = %name,
                entries = file.entries.len(),
                resident = installed.resident,
                "Loaded chunk partially; evicted entries reload on demand"
            );
        }

        self.events.emit_lossy(NamedeckEvent::ChunkLoaded {
            chunk: name.to_string(),
            entries: file.entries.len(),
            resident: installed.resident,
            timestamp: time::now(),
        });

        Ok(metadata)
    }

    /// Record that entries of `name` left the resident cache
    ///
    /// A loaded chunk becomes partial, so the next miss on it refetches.
    pub fn invalidate(&self, name: &str) {
        let mut states = self.lock_states();
        *states.evictions.entry(name.to_string()).or_insert(0) += 1;
        if let Some(ChunkState::Loaded(metadata)) = states.chunks.get(name).cloned() {
            debug!(chunk = %name, "Chunk lost resident entries, marking partial");
            states.chunks.insert(name.to_string(), ChunkState::Partial(metadata));
        }
    }

    /// Drop all load state of `name`
    pub fn forget(&self, name: &str) {
        let mut states = self.lock_states();
        *states.evictions.entry(name.to_string()).or_insert(0) += 1;
        states.chunks.remove(name);
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded_metadata(name).is_some()
    }

    /// Metadata of a loaded or partial chunk
    pub fn metadata(&self, name: &str) -> Option<ChunkMetadata> {
        match self.lock_states().chunks.get(name) {
            Some(ChunkState::Loaded(m)) | Some(ChunkState::Partial(m)) => Some(m.clone()),
            None => None,
        }
    }

    /// Fully loaded chunks, in partition order
    pub fn loaded_chunks(&self) -> Vec<String> {
        let states = self.lock_states();
        self.partitions
            .chunk_names()
            .filter(|name| matches!(states.chunks.get(*name), Some(ChunkState::Loaded(_))))
            .map(str::to_string)
            .collect()
    }

    /// Chunks with some entries evicted, in partition order
    pub fn partial_chunks(&self) -> Vec<String> {
        let states = self.lock_states();
        self.partitions
            .chunk_names()
            .filter(|name| matches!(states.chunks.get(*name), Some(ChunkState::Partial(_))))
            .map(str::to_string)
            .collect()
    }

    /// Chunks currently being fetched
    pub fn in_flight(&self) -> Vec<String> {
        let set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.partitions
            .chunk_names()
            .filter(|name| set.contains(*name))
            .map(str::to_string)
            .collect()
    }

    /// Load the catalog manifest once; failures are logged and retried on the next call
    pub async fn load_manifest(&self) -> Option<Arc<CatalogManifest>> {
        let result = self
            .manifest
            .get_or_try_init(|| async {
                let bytes = self.source.fetch(&Resource::Manifest).await?;
                let manifest: CatalogManifest = serde_json::from_slice(&bytes)?;
                info!(
                    version = %manifest.version,
                    total = manifest.total_names,
                    "Loaded catalog manifest"
                );
                Ok::<_, Error>(Arc::new(manifest))
            })
            .await;

        match result {
            Ok(manifest) => Some(manifest.clone()),
            Err(e) => {
                warn!("Catalog manifest unavailable: {}", e);
                None
            }
        }
    }

    /// Manifest if already loaded
    pub fn manifest(&self) -> Option<Arc<CatalogManifest>> {
        self.manifest.get().cloned()
    }

    fn loaded_metadata(&self, name: &str) -> Option<ChunkMetadata> {
        match self.lock_states().chunks.get(name) {
            Some(ChunkState::Loaded(m)) => Some(m.clone()),
            _ => None,
        }
    }

    fn eviction_epoch(&self, name: &str) -> u64 {
        self.lock_states().evictions.get(name).copied().unwrap_or(0)
    }

    fn slot(&self, name: &str) -> Arc<ChunkSlot> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    fn mark_in_flight(&self, name: &str) -> InFlightGuard<'_> {
        if let Ok(mut set) = self.in_flight.lock() {
            set.insert(name.to_string());
        }
        InFlightGuard {
            in_flight: &self.in_flight,
            name: name.to_string(),
        }
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, StateTable> {
        match self.states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
