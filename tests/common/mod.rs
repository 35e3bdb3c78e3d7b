//! Common utilities for integration tests
//!
//! Shared test infrastructure: unique key generation, local-only service
//! setup, scripted cache backends and database probes for exercising the
//! fail-open and health-combination paths without external services.

#![allow(dead_code)]

use adaptive_cache::{
    BackendCounters, BackendSelector, CacheBackend, CacheError, CacheService, DatabaseProbe,
    HealthAggregator, RequestTracker, async_trait,
};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Initialize tracing once for a test binary; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Create a test key with a unique suffix to avoid conflicts between tests.
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Cache service backed only by the local in-process store.
pub fn local_service() -> Arc<CacheService> {
    Arc::new(CacheService::new(Arc::new(BackendSelector::local_only())))
}

/// Cache service whose distributed backend errors on every operation.
///
/// The first error latches the permanent fail-over to the local store.
pub fn failing_distributed_service() -> Arc<CacheService> {
    let selector = BackendSelector::with_distributed(Arc::new(FailingBackend));
    Arc::new(CacheService::new(Arc::new(selector)))
}

/// Cache service whose backend accepts writes but reads back garbage,
/// producing a `degraded` cache-health verdict.
pub fn corrupting_service() -> Arc<CacheService> {
    let selector = BackendSelector::with_distributed(Arc::new(CorruptingBackend));
    Arc::new(CacheService::new(Arc::new(selector)))
}

/// Health aggregator over the given service and probe with a fresh tracker.
pub fn aggregator(
    service: Arc<CacheService>,
    probe: Arc<dyn DatabaseProbe>,
) -> (Arc<HealthAggregator>, Arc<RequestTracker>) {
    let tracker = Arc::new(RequestTracker::new());
    let health = Arc::new(HealthAggregator::new(service, Arc::clone(&tracker), probe));
    (health, tracker)
}

/// Poll `condition` every 10ms until it holds or `timeout_ms` elapses.
pub async fn wait_for<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Backend that raises a transport error on every operation.
pub struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Transport("connection refused".into()))
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Transport("connection refused".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Transport("connection refused".into()))
    }

    async fn flush(&self) -> Result<(), CacheError> {
        Err(CacheError::Transport("connection refused".into()))
    }

    async fn del_pattern(&self, _pattern: &Regex) -> Result<u64, CacheError> {
        Err(CacheError::Transport("connection refused".into()))
    }

    async fn key_count(&self) -> Result<Option<u64>, CacheError> {
        Err(CacheError::Transport("connection refused".into()))
    }

    fn counters(&self) -> BackendCounters {
        BackendCounters::default()
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "distributed"
    }
}

/// Backend that accepts writes but returns an unrelated payload on reads,
/// breaking probe round-trip integrity without raising errors.
pub struct CorruptingBackend;

#[async_trait]
impl CacheBackend for CorruptingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(Some(b"\"unrelated\"".to_vec()))
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn del_pattern(&self, _pattern: &Regex) -> Result<u64, CacheError> {
        Ok(0)
    }

    async fn key_count(&self) -> Result<Option<u64>, CacheError> {
        Ok(None)
    }

    fn counters(&self) -> BackendCounters {
        BackendCounters::default()
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "distributed"
    }
}

/// Database probe that always answers.
pub struct HealthyProbe;

#[async_trait]
impl DatabaseProbe for HealthyProbe {
    async fn liveness(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn aggregate_stats(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "businesses": 5, "users": 12 }))
    }

    fn pool_info(&self) -> serde_json::Value {
        serde_json::json!({ "size": 10, "idle": 9 })
    }
}

/// Database probe whose liveness query always fails.
pub struct FailingProbe;

#[async_trait]
impl DatabaseProbe for FailingProbe {
    async fn liveness(&self) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn aggregate_stats(&self) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("connection refused")
    }
}

/// Database probe that answers only after a fixed delay, for deadline tests.
pub struct SlowProbe {
    pub delay: Duration,
}

#[async_trait]
impl DatabaseProbe for SlowProbe {
    async fn liveness(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn aggregate_stats(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}
