//! Integration tests for the fail-open cache service
//!
//! Exercise the public cache API over the local backend and over a scripted
//! erroring distributed backend, including the permanent fail-over.

mod common;

use adaptive_cache::ActiveBackend;
use common::{failing_distributed_service, init_tracing, local_service, test_key};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn set_then_get_round_trips_json() {
    init_tracing();
    let service = local_service();
    let key = test_key("roundtrip");
    let value = json!({ "name": "Acme Plumbing", "members": 5 });

    assert!(service.set(&key, &value, Duration::from_secs(60)).await);
    assert_eq!(service.get(&key).await, Some(value));
}

#[tokio::test]
async fn get_of_absent_key_is_none() {
    init_tracing();
    let service = local_service();

    assert_eq!(service.get(&test_key("absent")).await, None);
}

#[tokio::test]
async fn del_removes_the_key() {
    init_tracing();
    let service = local_service();
    let key = test_key("del");

    service.set(&key, &json!(1), Duration::from_secs(60)).await;
    assert!(service.del(&key).await);
    assert_eq!(service.get(&key).await, None);
}

#[tokio::test]
async fn flush_clears_the_active_backend() {
    init_tracing();
    let service = local_service();
    let key_a = test_key("flush_a");
    let key_b = test_key("flush_b");

    service.set(&key_a, &json!(1), Duration::from_secs(60)).await;
    service.set(&key_b, &json!(2), Duration::from_secs(60)).await;

    assert!(service.flush().await);
    assert_eq!(service.get(&key_a).await, None);
    assert_eq!(service.get(&key_b).await, None);
}

#[tokio::test]
async fn pattern_delete_removes_matching_keys_only() {
    init_tracing();
    let service = local_service();

    let listing = json!({ "count": 5 });
    service
        .set("businesses:all", &listing, Duration::from_secs(600))
        .await;
    service
        .set("businesses:42", &json!({ "id": 42 }), Duration::from_secs(600))
        .await;
    service
        .set("deals:all", &json!([]), Duration::from_secs(600))
        .await;

    assert_eq!(service.get("businesses:all").await, Some(listing));

    assert!(service.del_pattern("businesses:.*").await);
    assert_eq!(service.get("businesses:all").await, None);
    assert_eq!(service.get("businesses:42").await, None);
    assert_eq!(service.get("deals:all").await, Some(json!([])));
}

#[tokio::test]
async fn invalid_pattern_is_a_logged_noop() {
    init_tracing();
    let service = local_service();
    let key = test_key("badpattern");

    service.set(&key, &json!(1), Duration::from_secs(60)).await;

    // Unbalanced bracket does not compile as a regex
    assert!(!service.del_pattern("businesses:[").await);
    assert_eq!(service.get(&key).await, Some(json!(1)));
}

#[tokio::test]
async fn entries_expire_after_their_ttl() {
    init_tracing();
    let service = local_service();
    let key = test_key("ttl");

    service.set(&key, &json!("short"), Duration::from_millis(100)).await;
    assert_eq!(service.get(&key).await, Some(json!("short")));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(service.get(&key).await, None);
}

#[tokio::test]
async fn zero_ttl_stores_without_expiry() {
    init_tracing();
    let service = local_service();
    let key = test_key("forever");

    service.set(&key, &json!("kept"), Duration::ZERO).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(service.get(&key).await, Some(json!("kept")));
}

#[tokio::test]
async fn stats_reflect_hits_misses_and_key_count() {
    init_tracing();
    let service = local_service();
    let key = test_key("stats");

    service.get(&key).await; // miss
    service.set(&key, &json!(true), Duration::from_secs(60)).await;
    service.get(&key).await; // hit

    let stats = service.stats().await;
    assert_eq!(stats.backend, "local");
    assert!(!stats.connected);
    assert_eq!(stats.keys, Some(1));
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.sets, 1);
    assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn backend_errors_fail_open_with_neutral_returns() {
    init_tracing();
    let key = test_key("failopen");

    // A fresh erroring backend per call, so every operation exercises the
    // error path itself rather than the post-fail-over local store.
    assert_eq!(failing_distributed_service().get(&key).await, None);
    assert!(
        !failing_distributed_service()
            .set(&key, &json!(1), Duration::from_secs(60))
            .await
    );
    assert!(!failing_distributed_service().del(&key).await);
    assert!(!failing_distributed_service().flush().await);
    assert!(!failing_distributed_service().del_pattern("businesses:.*").await);

    let stats = failing_distributed_service().stats().await;
    assert_eq!(stats.keys, None);
}

#[tokio::test]
async fn transport_error_fails_over_to_local_permanently() {
    init_tracing();
    let service = failing_distributed_service();
    let key = test_key("failover");

    assert_eq!(service.active_backend(), ActiveBackend::Distributed);

    // First error latches the fail-over
    assert!(!service.set(&key, &json!(1), Duration::from_secs(60)).await);
    assert_eq!(service.active_backend(), ActiveBackend::Local);

    // Every subsequent operation lands on the working local store
    assert!(service.set(&key, &json!(2), Duration::from_secs(60)).await);
    assert_eq!(service.get(&key).await, Some(json!(2)));
    assert_eq!(service.active_backend(), ActiveBackend::Local);

    let stats = service.stats().await;
    assert_eq!(stats.backend, "local");
    assert!(!stats.connected);
}

#[tokio::test]
async fn background_sweeper_reclaims_expired_entries() {
    init_tracing();
    let system = adaptive_cache::CacheSystem::new(
        adaptive_cache::Settings::local(),
        std::sync::Arc::new(common::HealthyProbe),
    )
    .await;
    let key = test_key("sweep");

    system
        .service
        .set(&key, &json!("transient"), Duration::from_millis(200))
        .await;
    assert_eq!(system.selector.local().len(), 1);

    // The sweeper, not a read, must reclaim the entry
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(system.selector.local().len(), 0);

    system.shutdown();
}

#[tokio::test]
async fn health_check_round_trips_on_the_local_backend() {
    init_tracing();
    let service = local_service();

    assert!(service.health_check().await);
}
