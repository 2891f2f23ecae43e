//! Search integration tests: index-backed lookups across chunks and degraded mode

mod helpers;

use helpers::{swipe_settings, DatasetBuilder, TestApp};
use namedeck_swipe::catalog::Resource;
use namedeck_swipe::search::BucketKind;

fn dataset() -> DatasetBuilder {
    DatasetBuilder::new()
        .entry(1, "Olive", "F")
        .entry(2, "Oliver", "M")
        .entry(3, "Noah", "M")
        .entry(1_500, "Olivette", "F")
        .entry(60_000, "Oona", "F")
}

#[tokio::test]
async fn test_index_search_loads_owning_chunks() {
    let source = dataset().with_index().build();
    let app = TestApp::start(source.clone(), swipe_settings(2, 2)).await;

    assert!(app.search.load().await);
    let ids: Vec<u32> = app.search.search("oliv", 10).await.iter().map(|e| e.id).collect();

    assert_eq!(ids, vec![1, 2, 1_500]);
    assert_eq!(source.fetch_count(&Resource::Chunk("popular".into())), 1);
    assert_eq!(source.fetch_count(&Resource::Chunk("chunk-2".into())), 0);
    assert!(!app.catalog.status().search_degraded);
}

#[tokio::test]
async fn test_bucket_lookup_returns_ids_without_loading() {
    let source = dataset().with_index().build();
    let app = TestApp::start(source.clone(), swipe_settings(2, 2)).await;

    let female = app.search.lookup_bucket(BucketKind::Gender, "girl").await;
    let letter_o = app.search.lookup_bucket(BucketKind::Letter, "o").await;

    assert_eq!(female, vec![1, 1_500, 60_000]);
    assert_eq!(letter_o, vec![1, 2, 1_500, 60_000]);
    assert_eq!(app.search.lookup_exact("NOAH").await, Some(3));
    assert_eq!(source.total_fetches(), 1);
}

#[tokio::test]
async fn test_degraded_search_answers_from_resident_entries() {
    let source = dataset().build();
    let app = TestApp::start(source.clone(), swipe_settings(2, 2)).await;
    app.catalog.warm_up().await.unwrap();

    assert!(!app.search.load().await);
    assert!(app.search.is_degraded());
    assert!(app.catalog.status().search_degraded);

    // Only core is resident, so Olivette (popular) is not found
    let ids: Vec<u32> = app.search.search("oliv", 10).await.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(app.search.lookup_bucket(BucketKind::Gender, "male").await, vec![2, 3]);
}

#[tokio::test]
async fn test_index_recovers_on_later_load() {
    let source = dataset().with_index().build();
    source.fail(Resource::Index);
    let app = TestApp::start(source.clone(), swipe_settings(2, 2)).await;

    assert!(!app.search.load().await);
    assert!(app.search.is_degraded());

    source.recover(&Resource::Index);
    assert!(app.search.load().await);
    assert!(!app.search.is_degraded());
    assert!(app.search.is_loaded());
    assert_eq!(source.fetch_count(&Resource::Index), 2);
}
