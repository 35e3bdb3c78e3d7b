//! Integration tests for health aggregation
//!
//! Scripted database probes and cache backends pin down the probe semantics
//! and the combination rule for the overall verdict.

mod common;

use adaptive_cache::{CacheStatus, DatabaseStatus, OverallHealth};
use common::{
    FailingProbe, HealthyProbe, SlowProbe, aggregator, corrupting_service,
    failing_distributed_service, init_tracing, local_service,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn all_probes_healthy_yields_healthy() {
    init_tracing();
    let (health, _) = aggregator(local_service(), Arc::new(HealthyProbe));

    let report = health.report().await;
    assert_eq!(report.status, OverallHealth::Healthy);
    assert_eq!(report.services.database.status, DatabaseStatus::Healthy);
    assert_eq!(report.services.cache.status, CacheStatus::Healthy);
    assert_eq!(report.services.cache.backend, "local");
}

#[tokio::test]
async fn degraded_cache_does_not_fail_the_system() {
    init_tracing();
    let (health, _) = aggregator(corrupting_service(), Arc::new(HealthyProbe));

    let report = health.report().await;
    assert_eq!(report.services.cache.status, CacheStatus::Degraded);
    assert_eq!(report.status, OverallHealth::Healthy);
}

#[tokio::test]
async fn unhealthy_database_with_working_cache_is_degraded() {
    init_tracing();
    let (health, _) = aggregator(local_service(), Arc::new(FailingProbe));

    let report = health.report().await;
    assert_eq!(report.services.database.status, DatabaseStatus::Unhealthy);
    assert_eq!(report.services.cache.status, CacheStatus::Healthy);
    assert_eq!(report.status, OverallHealth::Degraded);
}

#[tokio::test]
async fn database_and_cache_both_down_is_an_error() {
    init_tracing();
    let (health, _) = aggregator(failing_distributed_service(), Arc::new(FailingProbe));

    let report = health.report().await;
    assert_eq!(report.services.database.status, DatabaseStatus::Unhealthy);
    assert_eq!(report.services.cache.status, CacheStatus::Unhealthy);
    assert_eq!(report.status, OverallHealth::Error);
}

#[tokio::test]
async fn database_probe_reports_stats_and_timing() {
    init_tracing();
    let (health, _) = aggregator(local_service(), Arc::new(HealthyProbe));

    let db = health.database_health(Duration::from_secs(5)).await;
    assert_eq!(db.status, DatabaseStatus::Healthy);
    assert_eq!(db.stats, serde_json::json!({ "businesses": 5, "users": 12 }));
    assert_eq!(db.pool, serde_json::json!({ "size": 10, "idle": 9 }));
    assert!(db.error.is_none());
}

#[tokio::test]
async fn database_probe_failure_carries_the_error() {
    init_tracing();
    let (health, _) = aggregator(local_service(), Arc::new(FailingProbe));

    let db = health.database_health(Duration::from_secs(5)).await;
    assert_eq!(db.status, DatabaseStatus::Unhealthy);
    assert_eq!(db.stats, serde_json::Value::Null);
    assert!(db.error.as_deref().unwrap_or_default().contains("connection refused"));
}

#[tokio::test]
async fn database_probe_deadline_is_enforced() {
    init_tracing();
    let probe = Arc::new(SlowProbe {
        delay: Duration::from_millis(500),
    });
    let (health, _) = aggregator(local_service(), probe);

    let db = health.database_health(Duration::from_millis(50)).await;
    assert_eq!(db.status, DatabaseStatus::Unhealthy);
    assert_eq!(db.error.as_deref(), Some("probe deadline exceeded"));
}

#[tokio::test]
async fn cache_probe_cleans_up_after_itself() {
    init_tracing();
    let service = local_service();
    let (health, _) = aggregator(Arc::clone(&service), Arc::new(HealthyProbe));

    let cache = health.cache_health().await;
    assert_eq!(cache.status, CacheStatus::Healthy);

    // The disposable probe key is deleted after the round-trip
    assert_eq!(service.stats().await.keys, Some(0));
}

#[tokio::test]
async fn report_carries_recent_slow_requests_capped_at_ten() {
    init_tracing();
    let (health, tracker) = aggregator(local_service(), Arc::new(HealthyProbe));

    for i in 0..15_u64 {
        tracker.record("GET", &format!("/slow/{i}"), 200, 1500, None, None);
    }

    let report = health.report().await;
    assert_eq!(report.performance.metrics.total, 15);
    assert_eq!(report.performance.slow_requests.len(), 10);
    assert_eq!(
        report.performance.slow_requests.first().map(|r| r.path.as_str()),
        Some("/slow/5")
    );
}

#[tokio::test]
async fn no_recommendations_on_a_quiet_system() {
    init_tracing();
    let (health, _) = aggregator(local_service(), Arc::new(HealthyProbe));

    assert!(health.recommendations().is_empty());
}

#[tokio::test]
async fn latency_and_throughput_recommendations_trigger_on_thresholds() {
    init_tracing();
    let (health, tracker) = aggregator(local_service(), Arc::new(HealthyProbe));

    // Enough slow samples to push the smoothed average well past 1000ms
    // and the slow count past its threshold
    for _ in 0..12 {
        tracker.record("GET", "/reports", 200, 5000, None, None);
    }

    let recommendations = health.recommendations();
    let kinds: Vec<&str> = recommendations.iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&"latency"), "kinds: {kinds:?}");
    assert!(kinds.contains(&"throughput"), "kinds: {kinds:?}");

    assert!(recommendations.iter().all(|r| r.severity == "warning"));
}

#[tokio::test]
async fn reset_metrics_zeroes_the_tracker() {
    init_tracing();
    let (health, tracker) = aggregator(local_service(), Arc::new(HealthyProbe));

    tracker.record("GET", "/x", 200, 2000, None, None);
    assert_eq!(tracker.metrics().total, 1);

    health.reset_metrics();
    let metrics = tracker.metrics();
    assert_eq!(metrics.total, 0);
    assert_eq!(metrics.slow_request_count, 0);
    assert_eq!(tracker.slow_buffer_len(), 0);
}

#[tokio::test]
async fn system_metrics_never_fail() {
    init_tracing();
    let (health, _) = aggregator(local_service(), Arc::new(HealthyProbe));

    let metrics = health.system_metrics();
    assert!(metrics.process_uptime_secs < 60);
    assert!(metrics.total_memory_bytes >= metrics.used_memory_bytes);
}
