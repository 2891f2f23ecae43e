//! Test helpers for namedeck-swipe integration tests
//!
//! - `DatasetBuilder`: lays out a small dataset (chunks, index, decks, manifest) in a
//!   counting, failure-injecting `MemorySource`
//! - `TestApp`: catalog, search, decks and session wired together the way `main` does,
//!   with an in-memory snapshot store
//! - `request`: drive the router with `tower::ServiceExt::oneshot`

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use namedeck_common::config::SwipeSettings;
use namedeck_common::events::EventBus;
use namedeck_common::model::{CatalogManifest, ChunkSummary, DeckManifest, IndexManifest};
use namedeck_swipe::api::{create_router, AppContext};
use namedeck_swipe::catalog::{CatalogOptions, PartitionTable, Resource, TieredCatalog};
use namedeck_swipe::catalog::source::MemorySource;
use namedeck_swipe::db::{MemorySnapshotStore, SnapshotStore};
use namedeck_swipe::deck::DeckStore;
use namedeck_swipe::search::SearchIndex;
use namedeck_swipe::session::SwipeSession;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower::ServiceExt;

/// Entry row in chunk-file form
#[derive(Debug, Clone)]
pub struct TestEntry {
    pub id: u32,
    pub name: String,
    pub gender: &'static str,
    pub origin: &'static str,
}

impl TestEntry {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "n": self.name,
            "g": self.gender,
            "r": self.id + 1,
            "o": self.origin,
            "l": self.name.chars().count(),
        })
    }
}

/// Builds a dataset laid out on the standard partition table
#[derive(Default)]
pub struct DatasetBuilder {
    entries: Vec<TestEntry>,
    decks: DeckManifest,
    with_index: bool,
    with_manifest: bool,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, id: u32, name: &str, gender: &'static str) -> Self {
        self.entries.push(TestEntry {
            id,
            name: name.to_string(),
            gender,
            origin: "English",
        });
        self
    }

    /// Entries `NameN` for every id in `ids`, alternating gender
    pub fn entries(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        for id in ids {
            let gender = if id % 2 == 0 { "F" } else { "M" };
            self = self.entry(id, &format!("Name{}", id), gender);
        }
        self
    }

    pub fn quick_deck(mut self, ids: &[u32]) -> Self {
        self.decks.quick = ids.to_vec();
        self
    }

    pub fn category_deck(mut self, name: &str, ids: &[u32]) -> Self {
        self.decks.categories.insert(name.to_string(), ids.to_vec());
        self
    }

    pub fn with_index(mut self) -> Self {
        self.with_index = true;
        self
    }

    pub fn with_manifest(mut self) -> Self {
        self.with_manifest = true;
        self
    }

    pub fn build(self) -> Arc<MemorySource> {
        let partitions = PartitionTable::standard();
        let mut chunks: BTreeMap<String, Vec<&TestEntry>> = BTreeMap::new();
        for entry in &self.entries {
            if let Some(chunk) = partitions.chunk_for_id(entry.id) {
                chunks.entry(chunk.to_string()).or_default().push(entry);
            }
        }

        let source = Arc::new(MemorySource::new());
        for (chunk, entries) in &chunks {
            source.insert(Resource::Chunk(chunk.clone()), chunk_json(chunk, entries));
        }

        source
            .insert_json(Resource::Decks, &self.decks)
            .expect("deck manifest serializes");

        if self.with_index {
            source
                .insert_json(Resource::Index, &index_for(&self.entries))
                .expect("index serializes");
        }

        if self.with_manifest {
            let manifest = CatalogManifest {
                version: "2025.1".to_string(),
                generated: "2025-01-01T00:00:00".to_string(),
                total_names: self.entries.len(),
                chunks: chunks
                    .iter()
                    .map(|(name, entries)| {
                        (
                            name.clone(),
                            ChunkSummary {
                                count: entries.len(),
                                first_id: entries.iter().map(|e| e.id).min().unwrap_or(0),
                                last_id: entries.iter().map(|e| e.id).max().unwrap_or(0),
                            },
                        )
                    })
                    .collect(),
            };
            source
                .insert_json(Resource::Manifest, &manifest)
                .expect("manifest serializes");
        }

        source
    }
}

/// Chunk file bytes for `entries`
pub fn chunk_json(chunk: &str, entries: &[&TestEntry]) -> Vec<u8> {
    let names: Vec<Value> = entries.iter().map(|e| e.to_json()).collect();
    serde_json::to_vec(&json!({
        "metadata": {"chunk": chunk, "count": names.len(), "generated": "2025-01-01T00:00:00"},
        "names": names,
    }))
    .expect("chunk serializes")
}

fn index_for(entries: &[TestEntry]) -> IndexManifest {
    let mut index = IndexManifest::default();
    let mut by_letter: HashMap<String, Vec<u32>> = HashMap::new();
    let mut by_gender: HashMap<String, Vec<u32>> = HashMap::new();
    let mut by_origin: HashMap<String, Vec<u32>> = HashMap::new();
    for entry in entries {
        let letter = entry.name.chars().next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
        by_letter.entry(letter).or_default().push(entry.id);
        by_gender.entry(entry.gender.to_string()).or_default().push(entry.id);
        by_origin.entry(entry.origin.to_string()).or_default().push(entry.id);
        index.lookup.insert(entry.name.to_lowercase(), entry.id);
    }
    index.by_letter = by_letter;
    index.by_gender = by_gender;
    index.by_origin = by_origin;
    index
}

pub fn swipe_settings(window_size: usize, refill_threshold: usize) -> SwipeSettings {
    SwipeSettings {
        window_size,
        refill_threshold,
        undo_depth: 10,
        session_key: "test".to_string(),
    }
}

/// Everything `main` wires up, minus the database
pub struct TestApp {
    pub source: Arc<MemorySource>,
    pub events: Arc<EventBus>,
    pub catalog: Arc<TieredCatalog>,
    pub search: Arc<SearchIndex>,
    pub decks: Arc<DeckStore>,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub session: Arc<SwipeSession>,
}

impl TestApp {
    pub async fn start(source: Arc<MemorySource>, settings: SwipeSettings) -> Self {
        Self::start_with(source, settings, Arc::new(MemorySnapshotStore::new()), CatalogOptions::default()).await
    }

    pub async fn start_with(
        source: Arc<MemorySource>,
        settings: SwipeSettings,
        snapshots: Arc<MemorySnapshotStore>,
        options: CatalogOptions,
    ) -> Self {
        let events = Arc::new(EventBus::new(256));
        let catalog = Arc::new(TieredCatalog::new(source.clone(), options, Arc::clone(&events)));
        let search = Arc::new(SearchIndex::new(Arc::clone(&catalog), Arc::clone(&events)));
        let decks = Arc::new(DeckStore::new(source.clone()));
        let store: Arc<dyn SnapshotStore> = snapshots.clone();
        let session = Arc::new(
            SwipeSession::open(
                Arc::clone(&catalog),
                Arc::clone(&decks),
                store,
                settings,
                Arc::clone(&events),
            )
            .await
            .expect("session opens"),
        );

        Self {
            source,
            events,
            catalog,
            search,
            decks,
            snapshots,
            session,
        }
    }

    pub fn router(&self) -> Router {
        create_router(AppContext {
            catalog: Arc::clone(&self.catalog),
            search: Arc::clone(&self.search),
            decks: Arc::clone(&self.decks),
            session: Arc::clone(&self.session),
            events: Arc::clone(&self.events),
        })
    }
}

/// Send one request and decode the JSON response body (`Value::Null` if not JSON)
pub async fn request(app: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
