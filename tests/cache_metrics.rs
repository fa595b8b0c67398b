mod support;

use std::collections::HashSet;
use std::sync::Arc;

use bizdash::application::dashboard::TopClientsQuery;
use bizdash::cache::{
    CacheConfig, CacheConsumer, CacheKey, EventBus, EventSource, InvalidationEvent,
    LocalBroadcaster, ManualClock, MemoryStorage, QueryKind, QueryParams, TwoTierStore,
};
use bizdash::domain::types::EntityType;
use bizdash::infra::telemetry;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use serial_test::serial;
use time::Duration;
use uuid::Uuid;

fn key(year: i32) -> CacheKey {
    CacheKey::for_query(QueryKind::DashboardStats, &QueryParams::new().with("year", year))
}

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    // Memory tier eviction
    let clock = Arc::new(ManualClock::default());
    let tiny = CacheConfig {
        memory_capacity: 1,
        ..CacheConfig::default()
    };
    let store = TwoTierStore::new(&tiny, Arc::new(MemoryStorage::new()), clock.clone());
    store.set(&key(2023), json!(1));
    store.set(&key(2024), json!(2));
    assert!(store.get(&key(2024)).is_some());

    // Persistent hit, miss and write failure
    store.set(&key(2023), json!(1));
    clock.advance(Duration::seconds(301));
    assert!(store.get(&key(2023)).is_some());
    assert!(store.get(&key(1999)).is_none());
    let full = TwoTierStore::new(
        &CacheConfig::default(),
        Arc::new(MemoryStorage::with_quota(8)),
        clock.clone(),
    );
    full.set(&key(2024), json!({ "too": "large" }));

    // Bus queue length, drops and consumption latency
    let bus = Arc::new(EventBus::new_with_limit(1));
    bus.publish(
        InvalidationEvent::new(Uuid::new_v4(), EntityType::Order, None),
        EventSource::Local,
    );
    bus.publish(
        InvalidationEvent::new(Uuid::new_v4(), EntityType::All, None),
        EventSource::Broadcast,
    );
    let consumer = CacheConsumer::new(CacheConfig::default(), Arc::new(store), bus);
    assert!(consumer.consume().invalidated);

    // Dashboard fetch latency
    let session = support::session(
        CacheConfig::default(),
        Arc::new(MemoryStorage::new()),
        Arc::new(LocalBroadcaster::new()),
        clock,
    );
    session
        .service
        .top_clients(TopClientsQuery::new(2024, 5))
        .await
        .expect("top clients");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "bizdash_cache_memory_hit_total",
        "bizdash_cache_memory_miss_total",
        "bizdash_cache_memory_evict_total",
        "bizdash_cache_persistent_hit_total",
        "bizdash_cache_persistent_miss_total",
        "bizdash_cache_persistent_write_error_total",
        "bizdash_cache_invalidated_total",
        "bizdash_cache_bus_queue_len",
        "bizdash_cache_bus_dropped_total",
        "bizdash_cache_consume_ms",
        "bizdash_dashboard_fetch_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
