//! Integration tests for the tiered catalog
//!
//! Loading, coalescing, eviction and failure handling against a counting in-memory
//! dataset, plus a directory-backed source.

mod helpers;

use helpers::DatasetBuilder;
use namedeck_common::events::{EventBus, NamedeckEvent};
use namedeck_swipe::catalog::source::DirSource;
use namedeck_swipe::catalog::{CatalogOptions, Resolution, Resource, TieredCatalog};
use std::sync::Arc;
use std::time::Duration;

fn catalog(source: Arc<namedeck_swipe::catalog::source::MemorySource>, resident_limit: usize) -> TieredCatalog {
    TieredCatalog::new(
        source,
        CatalogOptions {
            resident_limit,
            expand_threshold: 3,
        },
        Arc::new(EventBus::new(64)),
    )
}

#[tokio::test]
async fn test_sequential_resolves_fetch_once() {
    let source = DatasetBuilder::new().entries(0..20).build();
    let catalog = catalog(source.clone(), 1000);

    let first = catalog.resolve(7).await.unwrap();
    let second = catalog.resolve(7).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.fetch_count(&Resource::Chunk("core".into())), 1);
}

#[tokio::test]
async fn test_resolve_many_skips_unknown_and_loads_owning_chunks_only() {
    let source = DatasetBuilder::new()
        .entries([7, 8])
        .entries([1_500])
        .entries([50_000, 50_001])
        .build();
    let catalog = catalog(source.clone(), 1000);

    let entries = catalog.resolve_many(&[7, 50_000, 999_999_999]).await;

    let ids: Vec<u32> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![7, 50_000]);
    assert_eq!(source.fetch_count(&Resource::Chunk("core".into())), 1);
    assert_eq!(source.fetch_count(&Resource::Chunk("chunk-2".into())), 1);
    assert_eq!(source.fetch_count(&Resource::Chunk("popular".into())), 0);
    assert_eq!(source.total_fetches(), 2);
}

#[tokio::test]
async fn test_concurrent_resolves_share_one_fetch() {
    let source = DatasetBuilder::new().entries(1_000..1_050).build();
    source.set_latency(Some(Duration::from_millis(50)));
    let catalog = Arc::new(catalog(source.clone(), 1000));

    let tasks: Vec<_> = (1_000..1_010)
        .map(|id| {
            let catalog = Arc::clone(&catalog);
            tokio::spawn(async move { catalog.resolve(id).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_some());
    }

    assert_eq!(source.fetch_count(&Resource::Chunk("popular".into())), 1);
    assert!(catalog.status().chunks_in_flight.is_empty());
}

#[tokio::test]
async fn test_concurrent_resolves_on_chunk_larger_than_bound_share_one_fetch() {
    let source = DatasetBuilder::new().entries(0..50).build();
    source.set_latency(Some(Duration::from_millis(30)));
    let catalog = catalog(source.clone(), 10);

    let (a, b, c) = tokio::join!(catalog.resolve(3), catalog.resolve(20), catalog.resolve(45));

    assert_eq!(a.map(|e| e.id), Some(3));
    assert_eq!(b.map(|e| e.id), Some(20));
    assert_eq!(c.map(|e| e.id), Some(45));
    assert_eq!(source.fetch_count(&Resource::Chunk("core".into())), 1);
    assert!(catalog.status().resident <= 10);
    assert_eq!(catalog.status().partial_chunks, vec!["core".to_string()]);
}

#[tokio::test]
async fn test_concurrent_waiters_share_failure_then_retry_succeeds() {
    let source = DatasetBuilder::new().entries(10_000..10_010).build();
    source.set_latency(Some(Duration::from_millis(30)));
    source.fail(Resource::Chunk("chunk-1".into()));
    let catalog = Arc::new(catalog(source.clone(), 1000));

    let (a, b) = tokio::join!(catalog.resolve_outcome(10_001), catalog.resolve_outcome(10_002));
    assert!(matches!(a, Resolution::LoadFailed(_)));
    assert!(matches!(b, Resolution::LoadFailed(_)));
    assert_eq!(source.fetch_count(&Resource::Chunk("chunk-1".into())), 1);
    assert!(catalog.status().loaded_chunks.is_empty());

    source.recover(&Resource::Chunk("chunk-1".into()));
    assert!(catalog.resolve(10_001).await.is_some());
    assert_eq!(source.fetch_count(&Resource::Chunk("chunk-1".into())), 2);
}

#[tokio::test]
async fn test_failure_emits_event() {
    let source = DatasetBuilder::new().entries(0..5).build();
    source.fail(Resource::Chunk("core".into()));
    let events = Arc::new(EventBus::new(16));
    let mut rx = events.subscribe();
    let catalog = TieredCatalog::new(source, CatalogOptions::default(), Arc::clone(&events));

    assert!(catalog.resolve(1).await.is_none());

    match rx.recv().await.unwrap() {
        NamedeckEvent::ChunkLoadFailed { chunk, .. } => assert_eq!(chunk, "core"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_bound_holds_and_pinned_entries_survive() {
    let source = DatasetBuilder::new()
        .entries(0..6)
        .entries(1_000..1_006)
        .build();
    let catalog = catalog(source, 6);

    catalog.resolve(0).await.unwrap();
    catalog.pin(2);

    catalog.resolve(1_000).await.unwrap();

    let status = catalog.status();
    assert!(status.resident <= 6);
    assert!(catalog.get_resident(2).is_some());
    assert!(catalog.get_resident(1_000).is_some());

    catalog.unpin(2);
    assert_eq!(catalog.status().pinned, 0);
}

#[tokio::test]
async fn test_preload_all_expands_past_bound_and_trim_returns_to_core() {
    let source = DatasetBuilder::new()
        .entries(0..4)
        .entries(1_000..1_004)
        .entries(10_000..10_004)
        .entries(50_000..50_004)
        .entries(100_000..100_004)
        .build();
    let catalog = catalog(source, 4);

    let results = catalog.preload_all().await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(catalog.status().resident, 20);

    let removed = catalog.trim_to_core();
    assert_eq!(removed, 16);
    let status = catalog.status();
    assert_eq!(status.resident, 4);
    assert_eq!(status.loaded_chunks, vec!["core".to_string()]);
}

#[tokio::test]
async fn test_warm_up_reads_manifest_and_core() {
    let source = DatasetBuilder::new().entries(0..10).with_manifest().build();
    let catalog = catalog(source, 100);

    let core = catalog.warm_up().await.unwrap();

    assert_eq!(core.metadata.count, 10);
    let status = catalog.status();
    assert!(status.core_loaded);
    assert_eq!(status.total_names, 10);
    assert_eq!(status.dataset_version.as_deref(), Some("2025.1"));
    assert_eq!(catalog.instant_entries(3).iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_seed_serves_before_core_loads() {
    let source = DatasetBuilder::new().build();
    let catalog = catalog(source.clone(), 100);

    let seed = catalog.instant_entries(5);

    assert_eq!(seed.len(), 5);
    assert_eq!(source.total_fetches(), 0);
}

#[tokio::test]
async fn test_directory_source() {
    let dir = tempfile::tempdir().unwrap();
    let entry = helpers::TestEntry {
        id: 3,
        name: "Ada".to_string(),
        gender: "F",
        origin: "English",
    };
    std::fs::write(dir.path().join("names-core.json"), helpers::chunk_json("core", &[&entry])).unwrap();

    let catalog = TieredCatalog::new(
        Arc::new(DirSource::new(dir.path())),
        CatalogOptions::default(),
        Arc::new(EventBus::new(16)),
    );

    assert_eq!(catalog.resolve(3).await.map(|e| e.name.clone()), Some("Ada".to_string()));
    assert!(matches!(catalog.resolve_outcome(1_200).await, Resolution::LoadFailed(_)));
}
