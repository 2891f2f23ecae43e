//! Tiered catalog loader
//!
//! Resolves entry ids to shared entries, loading the owning chunk on a miss. Entries
//! live in a bounded `ResidentCache`; a load of `expand_threshold` or more chunks at
//! once runs in expand mode and is not held to the bound.
//!
//! The catalog is an explicitly constructed object shared behind an `Arc`. Nothing
//! else mutates the resident cache.

use crate::catalog::annotations::{Annotation, AnnotationMap};
use crate::catalog::chunk_store::{ChunkLoad, ChunkStore, Installed};
use crate::catalog::partition::PartitionTable;
use crate::catalog::resident::{InsertMode, ResidentCache};
use crate::catalog::source::DataSource;
use crate::error::ChunkError;
use namedeck_common::config::CatalogSettings;
use namedeck_common::events::EventBus;
use namedeck_common::model::{CatalogManifest, ChunkFile};
use namedeck_common::CatalogEntry;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Residency policy
#[derive(Debug, Clone, Copy)]
pub struct CatalogOptions {
    /// Resident entry bound outside expand mode
    pub resident_limit: usize,
    /// Distinct chunks in one `load_chunks` call that switch it to expand mode
    pub expand_threshold: usize,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self::from(&CatalogSettings::default())
    }
}

impl From<&CatalogSettings> for CatalogOptions {
    fn from(settings: &CatalogSettings) -> Self {
        Self {
            resident_limit: settings.resident_limit,
            expand_threshold: settings.expand_threshold,
        }
    }
}

/// Outcome of resolving one id
#[derive(Debug, Clone)]
pub enum Resolution {
    Loaded(Arc<CatalogEntry>),
    /// No chunk owns the id, or its chunk does not contain it
    NotFound,
    /// The owning chunk could not be loaded
    LoadFailed(ChunkError),
}

impl Resolution {
    pub fn entry(self) -> Option<Arc<CatalogEntry>> {
        match self {
            Resolution::Loaded(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Point-in-time view of the catalog
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatus {
    pub resident: usize,
    pub resident_limit: usize,
    pub pinned: usize,
    pub loaded_chunks: Vec<String>,
    pub partial_chunks: Vec<String>,
    pub chunks_in_flight: Vec<String>,
    /// From the catalog manifest when available, otherwise from known chunk headers
    pub total_names: usize,
    pub core_loaded: bool,
    pub search_degraded: bool,
    pub annotated: usize,
    pub dataset_version: Option<String>,
}

/// Unpins its ids when dropped, including when a load is cancelled
struct PinGuard<'a> {
    catalog: &'a TieredCatalog,
    ids: Vec<u32>,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.catalog.unpin_many(&self.ids);
    }
}

pub struct TieredCatalog {
    store: ChunkStore,
    resident: Mutex<ResidentCache>,
    annotations: RwLock<AnnotationMap>,
    options: CatalogOptions,
    search_degraded: AtomicBool,
}

impl TieredCatalog {
    pub fn new(source: Arc<dyn DataSource>, options: CatalogOptions, events: Arc<EventBus>) -> Self {
        Self::with_partitions(source, PartitionTable::standard(), options, events)
    }

    pub fn with_partitions(
        source: Arc<dyn DataSource>,
        partitions: PartitionTable,
        options: CatalogOptions,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store: ChunkStore::new(source, partitions, events),
            resident: Mutex::new(ResidentCache::new(options.resident_limit)),
            annotations: RwLock::new(AnnotationMap::default()),
            options,
            search_degraded: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> CatalogOptions {
        self.options
    }

    pub fn partitions(&self) -> &PartitionTable {
        self.store.partitions()
    }

    pub fn source(&self) -> Arc<dyn DataSource> {
        Arc::clone(self.store.source())
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub async fn resolve(&self, id: u32) -> Option<Arc<CatalogEntry>> {
        self.resolve_outcome(id).await.entry()
    }

    pub async fn resolve_outcome(&self, id: u32) -> Resolution {
        if let Some(entry) = self.get_resident(id) {
            return Resolution::Loaded(entry);
        }

        let Some(chunk) = self.partitions().chunk_for_id(id).map(str::to_string) else {
            return Resolution::NotFound;
        };

        let _pin = self.pin_guard(&[id]);
        let result = self.ensure_chunk(&chunk, InsertMode::Bounded).await;

        match (self.get_resident(id), result) {
            (Some(entry), _) => Resolution::Loaded(entry),
            (None, Err(e)) => Resolution::LoadFailed(e),
            (None, Ok(_)) => {
                debug!(id, chunk = %chunk, "Id not present in its chunk");
                Resolution::NotFound
            }
        }
    }

    /// Resolve several ids, loading each missing chunk once
    ///
    /// Keeps the order of `ids`; ids that do not resolve are skipped.
    pub async fn resolve_many(&self, ids: &[u32]) -> Vec<Arc<CatalogEntry>> {
        self.resolve_outcomes(ids)
            .await
            .into_iter()
            .filter_map(Resolution::entry)
            .collect()
    }

    /// Per-id outcomes for several ids, in the order of `ids`
    ///
    /// Each missing chunk is loaded once. An id whose chunk failed to load is
    /// `LoadFailed` and can be retried later; a loaded chunk without the id is `NotFound`.
    pub async fn resolve_outcomes(&self, ids: &[u32]) -> Vec<Resolution> {
        let _pins = self.pin_guard(ids);

        let missing: Vec<u32> = {
            let resident = self.lock_resident();
            ids.iter().copied().filter(|id| !resident.contains(*id)).collect()
        };

        let mut failed: HashMap<String, ChunkError> = HashMap::new();
        if !missing.is_empty() {
            let chunks: Vec<String> = self
                .partitions()
                .group_by_chunk(&missing)
                .into_iter()
                .map(|(chunk, _)| chunk)
                .collect();
            for (chunk, result) in self.load_chunks(&chunks).await {
                if let Err(e) = result {
                    failed.insert(chunk, e);
                }
            }
        }

        let resident = self.lock_resident();
        ids.iter()
            .map(|id| match resident.get(*id) {
                Some(entry) => Resolution::Loaded(entry),
                None => match self.partitions().chunk_for_id(*id).and_then(|chunk| failed.get(chunk)) {
                    Some(e) => Resolution::LoadFailed(e.clone()),
                    None => Resolution::NotFound,
                },
            })
            .collect()
    }

    /// Resident entry without loading anything
    pub fn get_resident(&self, id: u32) -> Option<Arc<CatalogEntry>> {
        self.lock_resident().get(id)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load chunks concurrently, each at most once
    ///
    /// With `expand_threshold` or more distinct chunks the residency bound is lifted
    /// for this operation.
    pub async fn load_chunks(&self, names: &[String]) -> Vec<(String, Result<ChunkLoad, ChunkError>)> {
        let mut seen = HashSet::new();
        let distinct: Vec<&String> = names.iter().filter(|n| seen.insert(n.as_str())).collect();

        let mode = if distinct.len() >= self.options.expand_threshold {
            info!(chunks = distinct.len(), "Loading chunks in expand mode");
            InsertMode::Expand
        } else {
            InsertMode::Bounded
        };

        let loads = distinct.into_iter().map(|name| async move {
            let result = self.ensure_chunk(name, mode).await;
            (name.clone(), result)
        });

        futures::future::join_all(loads).await
    }

    /// Load every chunk in expand mode; failures are logged and skipped
    pub async fn preload_all(&self) -> Vec<(String, Result<ChunkLoad, ChunkError>)> {
        let names: Vec<String> = self.partitions().chunk_names().map(str::to_string).collect();
        let results = self.load_chunks(&names).await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "Full catalog preload incomplete");
        } else {
            info!(resident = self.lock_resident().len(), "Full catalog preloaded");
        }

        results
    }

    /// Load the catalog manifest and the core chunk
    pub async fn warm_up(&self) -> Result<ChunkLoad, ChunkError> {
        self.store.load_manifest().await;
        let core = self.partitions().core_chunk().to_string();
        self.ensure_chunk(&core, InsertMode::Bounded).await
    }

    /// Drop every resident entry outside the core chunk (pinned entries stay)
    ///
    /// Returns the number of entries removed.
    pub fn trim_to_core(&self) -> usize {
        let core = self.partitions().core_chunk().to_string();
        let Some(core_range) = self.partitions().range_of(&core) else {
            return 0;
        };

        let removed = self.lock_resident().retain(|id| core_range.contains(&id));
        for chunk in self.partitions().chunk_names().filter(|name| *name != core) {
            self.store.forget(chunk);
        }

        info!(removed = removed.len(), "Trimmed resident cache to core");
        removed.len()
    }

    async fn ensure_chunk(&self, name: &str, mode: InsertMode) -> Result<ChunkLoad, ChunkError> {
        self.store
            .ensure_loaded(name, |file| self.install(name, file, mode))
            .await
    }

    fn install(&self, name: &str, file: &ChunkFile, mode: InsertMode) -> Installed {
        let mut resident = self.lock_resident();
        let evicted = resident.insert_all(file.entries.iter().cloned().map(Arc::new), mode);
        let resident_len = resident.len();
        drop(resident);

        let mut own_evicted = false;
        let mut touched = HashSet::new();
        for id in &evicted {
            match self.partitions().chunk_for_id(*id) {
                Some(chunk) if chunk == name => own_evicted = true,
                Some(chunk) => {
                    touched.insert(chunk);
                }
                None => {}
            }
        }
        for chunk in touched {
            self.store.invalidate(chunk);
        }

        if !evicted.is_empty() {
            debug!(chunk = %name, evicted = evicted.len(), "Evicted entries to stay within bound");
        }

        Installed {
            complete: !own_evicted,
            resident: resident_len,
        }
    }

    // ========================================================================
    // Pinning
    // ========================================================================

    pub fn pin(&self, id: u32) {
        self.lock_resident().pin(id);
    }

    pub fn unpin(&self, id: u32) {
        self.lock_resident().unpin(id);
    }

    pub fn pin_many(&self, ids: &[u32]) {
        let mut resident = self.lock_resident();
        for id in ids {
            resident.pin(*id);
        }
    }

    pub fn unpin_many(&self, ids: &[u32]) {
        let mut resident = self.lock_resident();
        for id in ids {
            resident.unpin(*id);
        }
    }

    pub fn is_pinned(&self, id: u32) -> bool {
        self.lock_resident().is_pinned(id)
    }

    fn pin_guard(&self, ids: &[u32]) -> PinGuard<'_> {
        self.pin_many(ids);
        PinGuard {
            catalog: self,
            ids: ids.to_vec(),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Something to show right away: core entries by rank, or the seed before core
    pub fn instant_entries(&self, limit: usize) -> Vec<Arc<CatalogEntry>> {
        let core = self.partitions().core_chunk();
        if self.store.metadata(core).is_none() {
            return self.store.seed().iter().take(limit).cloned().collect();
        }

        let Some(range) = self.partitions().range_of(core) else {
            return Vec::new();
        };
        let mut entries: Vec<Arc<CatalogEntry>> = self
            .lock_resident()
            .iter()
            .filter(|e| range.contains(&e.id))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.rank, e.id));
        entries.truncate(limit);
        entries
    }

    /// Resident entries matching `predicate`, in insertion order
    pub fn scan_resident<F>(&self, predicate: F, limit: usize) -> Vec<Arc<CatalogEntry>>
    where
        F: Fn(&CatalogEntry) -> bool,
    {
        self.lock_resident()
            .iter()
            .filter(|e| predicate(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn core_loaded(&self) -> bool {
        self.store.is_loaded(self.partitions().core_chunk())
    }

    pub fn manifest(&self) -> Option<Arc<CatalogManifest>> {
        self.store.manifest()
    }

    pub async fn load_manifest(&self) -> Option<Arc<CatalogManifest>> {
        self.store.load_manifest().await
    }

    pub fn status(&self) -> CatalogStatus {
        let (resident, resident_limit, pinned) = {
            let cache = self.lock_resident();
            (cache.len(), cache.limit(), cache.pinned_count())
        };

        let manifest = self.store.manifest();
        let total_names = match &manifest {
            Some(m) => m.total_names,
            None => self
                .partitions()
                .chunk_names()
                .filter_map(|name| self.store.metadata(name))
                .map(|m| m.count)
                .sum(),
        };

        CatalogStatus {
            resident,
            resident_limit,
            pinned,
            loaded_chunks: self.store.loaded_chunks(),
            partial_chunks: self.store.partial_chunks(),
            chunks_in_flight: self.store.in_flight(),
            total_names,
            core_loaded: self.core_loaded(),
            search_degraded: self.search_degraded.load(Ordering::Relaxed),
            annotated: self.read_annotations().len(),
            dataset_version: manifest.map(|m| m.version.clone()),
        }
    }

    pub(crate) fn set_search_degraded(&self, degraded: bool) {
        self.search_degraded.store(degraded, Ordering::Relaxed);
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    /// Merge annotations for an id; returns whether anything changed
    pub fn annotate(&self, id: u32, annotation: &Annotation) -> bool {
        match self.annotations.write() {
            Ok(mut map) => map.merge(id, annotation),
            Err(poisoned) => poisoned.into_inner().merge(id, annotation),
        }
    }

    pub fn annotation(&self, id: u32) -> Option<Annotation> {
        self.read_annotations().get(id).cloned()
    }

    /// Entry with side-map annotations merged in
    pub fn annotated(&self, entry: &CatalogEntry) -> CatalogEntry {
        match self.read_annotations().get(entry.id) {
            Some(annotation) => annotation.apply_to(entry),
            None => entry.clone(),
        }
    }

    fn read_annotations(&self) -> std::sync::RwLockReadGuard<'_, AnnotationMap> {
        match self.annotations.read() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_resident(&self) -> MutexGuard<'_, ResidentCache> {
        match self.resident.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
