//! Search index
//!
//! Lazily loads `names-index.json` and answers lookups with entry ids; entry bodies
//! always come from the catalog. When the manifest cannot be loaded the index runs
//! degraded and answers from resident entries only until a later `load()` succeeds.

use crate::catalog::loader::TieredCatalog;
use crate::catalog::source::Resource;
use crate::error::{Error, Result};
use namedeck_common::events::{EventBus, NamedeckEvent};
use namedeck_common::model::IndexManifest;
use namedeck_common::{time, CatalogEntry, Gender};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Upper bound on entries scanned or returned by degraded bucket lookups
const DEGRADED_SCAN_LIMIT: usize = 5_000;

/// Bucket families of the index manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Letter,
    Gender,
    Origin,
    Category,
    Style,
    List,
}

impl FromStr for BucketKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "letter" => Ok(BucketKind::Letter),
            "gender" => Ok(BucketKind::Gender),
            "origin" => Ok(BucketKind::Origin),
            "category" => Ok(BucketKind::Category),
            "style" => Ok(BucketKind::Style),
            "list" => Ok(BucketKind::List),
            other => Err(Error::BadRequest(format!("Unknown bucket kind: {}", other))),
        }
    }
}

impl BucketKind {
    fn bucket<'a>(&self, index: &'a IndexManifest) -> &'a HashMap<String, Vec<u32>> {
        match self {
            BucketKind::Letter => &index.by_letter,
            BucketKind::Gender => &index.by_gender,
            BucketKind::Origin => &index.by_origin,
            BucketKind::Category => &index.by_category,
            BucketKind::Style => &index.by_style,
            BucketKind::List => &index.by_list,
        }
    }

    /// Key as stored in the manifest: letters upper-case, gender as its code
    fn normalize_key(&self, key: &str) -> String {
        let key = key.trim();
        match self {
            BucketKind::Letter => key
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect::<String>())
                .unwrap_or_default(),
            BucketKind::Gender => {
                // Unknown gender words map to no bucket at all
                let code = match key.to_lowercase().as_str() {
                    "male" | "m" | "boy" => "M",
                    "female" | "f" | "girl" => "F",
                    "unisex" | "u" | "neutral" => "U",
                    _ => "",
                };
                code.to_string()
            }
            _ => key.to_string(),
        }
    }

    fn matches(&self, entry: &CatalogEntry, key: &str) -> bool {
        match self {
            BucketKind::Letter => entry
                .name
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect::<String>() == key)
                .unwrap_or(false),
            BucketKind::Gender => entry.gender == Gender::from_code(key),
            BucketKind::Origin => entry.origin.eq_ignore_ascii_case(key),
            BucketKind::Category => entry.categories.iter().any(|c| c == key),
            BucketKind::Style => entry.styles.iter().any(|s| s == key),
            BucketKind::List => entry.lists.iter().any(|l| l == key),
        }
    }
}

pub struct SearchIndex {
    catalog: Arc<TieredCatalog>,
    manifest: OnceCell<Arc<IndexManifest>>,
    attempted: AtomicBool,
    degraded: AtomicBool,
    events: Arc<EventBus>,
}

impl SearchIndex {
    pub fn new(catalog: Arc<TieredCatalog>, events: Arc<EventBus>) -> Self {
        Self {
            catalog,
            manifest: OnceCell::new(),
            attempted: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            events,
        }
    }

    /// Load the index manifest once; concurrent calls share one fetch
    ///
    /// Returns whether the index is available. A failure is not cached: calling again
    /// retries.
    pub async fn load(&self) -> bool {
        self.attempted.store(true, Ordering::Relaxed);
        let source = self.catalog.source();

        let result = self
            .manifest
            .get_or_try_init(|| async {
                let bytes = source.fetch(&Resource::Index).await?;
                let manifest: IndexManifest = serde_json::from_slice(&bytes)?;
                info!(names = manifest.lookup.len(), "Loaded search index");
                self.events.emit_lossy(NamedeckEvent::SearchIndexLoaded {
                    names: manifest.lookup.len(),
                    timestamp: time::now(),
                });
                Ok::<_, Error>(Arc::new(manifest))
            })
            .await;

        match result {
            Ok(_) => {
                self.set_degraded(false);
                true
            }
            Err(e) => {
                warn!("Search index unavailable, searching resident entries only: {}", e);
                self.set_degraded(true);
                self.events.emit_lossy(NamedeckEvent::SearchIndexDegraded {
                    error: e.to_string(),
                    timestamp: time::now(),
                });
                false
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn is_loaded(&self) -> bool {
        self.manifest.initialized()
    }

    /// Index for a lookup: loads on first use, never retries implicitly after a failure
    async fn index(&self) -> Option<Arc<IndexManifest>> {
        if let Some(index) = self.manifest.get() {
            return Some(Arc::clone(index));
        }
        if !self.attempted.load(Ordering::Relaxed) {
            self.load().await;
        }
        self.manifest.get().cloned()
    }

    /// Case-insensitive exact name lookup
    pub async fn lookup_exact(&self, name: &str) -> Option<u32> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        match self.index().await {
            Some(index) => index.lookup.get(&key).copied(),
            None => self
                .catalog
                .scan_resident(|e| e.lookup_key() == key, 1)
                .first()
                .map(|e| e.id),
        }
    }

    /// Ids in one bucket; empty when the key is unknown
    pub async fn lookup_bucket(&self, kind: BucketKind, key: &str) -> Vec<u32> {
        let key = kind.normalize_key(key);
        if key.is_empty() {
            return Vec::new();
        }

        match self.index().await {
            Some(index) => kind.bucket(&index).get(&key).cloned().unwrap_or_default(),
            None => self
                .catalog
                .scan_resident(|e| kind.matches(e, &key), DEGRADED_SCAN_LIMIT)
                .iter()
                .map(|e| e.id)
                .collect(),
        }
    }

    /// Exact match first, then case-insensitive prefix matches, materialized through
    /// the catalog
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Arc<CatalogEntry>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let Some(index) = self.index().await else {
            return self.search_resident(&query, limit);
        };

        let mut ids = Vec::with_capacity(limit);
        if let Some(id) = index.lookup.get(&query) {
            ids.push(*id);
        }

        let mut prefixed: Vec<u32> = index
            .lookup
            .iter()
            .filter(|(name, _)| name.starts_with(&query) && **name != query)
            .map(|(_, id)| *id)
            .collect();
        // Lower ids are the more popular names
        prefixed.sort_unstable();
        ids.extend(prefixed.into_iter().take(limit.saturating_sub(ids.len())));

        self.catalog.resolve_many(&ids).await
    }

    fn search_resident(&self, query: &str, limit: usize) -> Vec<Arc<CatalogEntry>> {
        let mut exact = self.catalog.scan_resident(|e| e.lookup_key() == query, 1);
        let seen: HashSet<u32> = exact.iter().map(|e| e.id).collect();

        let mut prefixed = self.catalog.scan_resident(
            |e| !seen.contains(&e.id) && e.lookup_key().starts_with(query),
            DEGRADED_SCAN_LIMIT,
        );
        prefixed.sort_by_key(|e| e.id);

        exact.extend(prefixed);
        exact.truncate(limit);
        exact
    }

    fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Relaxed);
        self.catalog.set_search_degraded(degraded);
    }
}
