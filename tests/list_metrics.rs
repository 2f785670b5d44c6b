use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use quill::application::listing::CachedListQuery;
use quill::application::query::QueryParameters;
use quill::cache::{CacheConfig, CacheKey, KeyValueCache, MemoryCache};
use quill::domain::document::Document;
use quill::infra::db::{DocumentStore, MemoryDocumentStore};
use serde_json::{Value, json};

fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn listing_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = MemoryDocumentStore::new();
    store
        .insert_many(
            "posts",
            vec![
                document(json!({"title": "first"})),
                document(json!({"title": "second"})),
            ],
        )
        .await
        .expect("posts");

    let cache = Arc::new(MemoryCache::new(&CacheConfig {
        capacity: 1,
        ..Default::default()
    }));
    let listing = CachedListQuery::new(
        store.collection("posts"),
        cache.clone(),
        CacheKey::posts_list(),
    );

    // Miss, then hit.
    let params = QueryParameters::default();
    let first = listing.execute(&params).await.expect("miss");
    let second = listing.execute(&params).await.expect("hit");
    assert_eq!(first.data, second.data);

    // A second key pushes the listing entry out of the single slot.
    let other = CacheKey::new("allComments").expect("valid key");
    cache
        .set(&other, "[]".to_string(), Duration::from_secs(60))
        .await
        .expect("set");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "quill_list_cache_hit_total",
        "quill_list_cache_miss_total",
        "quill_list_cache_evict_total",
        "quill_list_query_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
