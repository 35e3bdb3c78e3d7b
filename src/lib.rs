//! Adaptive Cache
//!
//! An adaptive caching and health-monitoring layer for request-driven services:
//! - **Backend selection**: distributed (Redis) when configured and reachable,
//!   local in-process store otherwise, with permanent fail-over on transport error
//! - **Fail-open cache API**: `get`/`set`/`del`/`flush`/`del_pattern`/`stats`
//!   never raise to callers; errors become neutral values and warning logs
//! - **HTTP middleware**: read-through response caching, write-through pattern
//!   invalidation, and per-request latency tracking for axum
//! - **Health aggregation**: database, cache and system probes combined into a
//!   single verdict with advisory recommendations, served by operational endpoints
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use adaptive_cache::{CacheSystem, DatabaseProbe, Settings, async_trait};
//! use std::sync::Arc;
//!
//! struct Postgres; // your data-store handle
//!
//! #[async_trait]
//! impl DatabaseProbe for Postgres {
//!     async fn liveness(&self) -> anyhow::Result<()> { Ok(()) }
//!     async fn aggregate_stats(&self) -> anyhow::Result<serde_json::Value> {
//!         Ok(serde_json::json!({ "businesses": 42 }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let system = CacheSystem::new(Settings::from_env(), Arc::new(Postgres)).await;
//!
//!     // Fail-open cache operations
//!     let data = serde_json::json!({ "count": 5 });
//!     system.service.set("businesses:all", &data, std::time::Duration::from_secs(600)).await;
//!
//!     // Operational endpoints, mounted into your app's router
//!     let ops = system.ops_router();
//!     # drop(ops);
//!
//!     system.shutdown();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Request → track_requests → invalidate_after → read_through → Handler
//!                                 │                  │
//!                                 └── del_pattern    └── get / set (detached)
//!                                          │                │
//!                                     CacheService ── BackendSelector ── Redis | DashMap
//!
//! GET /health … → HealthAggregator → DatabaseProbe + cache probe + sysinfo
//! ```
//!
//! The subsystem is designed to never be the cause of a failed request:
//! everything below the HTTP boundary recovers locally, and only the health
//! endpoints ever surface a degraded status code.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

pub mod backends;
pub mod config;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod selector;
pub mod service;
pub mod tracker;
pub mod traits;

pub use backends::{DistributedBackend, LocalBackend, LocalCache, RedisCache};
pub use config::Settings;
pub use health::{
    CacheHealth, CacheStatus, DatabaseHealth, DatabaseStatus, HealthAggregator, HealthReport,
    OverallHealth, Recommendation, SystemMetrics,
};
pub use middleware::{
    CacheLayerState, InvalidationLayerState, InvalidationPattern, RouteCache,
};
pub use routes::{AdminUser, OpsState, ops_router};
pub use selector::{ActiveBackend, BackendSelector};
pub use service::{CacheService, CacheStats};
pub use tracker::{RequestMetrics, RequestTracker, SlowRequestRecord};
pub use traits::{BackendCounters, CacheBackend, CacheError, DatabaseProbe};

// Re-export async_trait for user convenience when implementing the traits
pub use async_trait::async_trait;

/// How often the local store sweeps expired entries.
///
/// Kept below one second so short TTLs expire promptly between reads.
const LOCAL_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Main entry point bundling the whole subsystem with an explicit lifecycle.
///
/// Constructed once at startup and injected into the request pipeline; there
/// are no process-wide singletons. Construction never fails: if the
/// distributed backend is unreachable the system simply starts local-active.
pub struct CacheSystem {
    /// Backend selection and fail-over state
    pub selector: Arc<BackendSelector>,
    /// The fail-open cache API
    pub service: Arc<CacheService>,
    /// Request latency aggregation
    pub tracker: Arc<RequestTracker>,
    /// Health probing and reporting
    pub health: Arc<HealthAggregator>,
    settings: Arc<Settings>,
    sweeper: JoinHandle<()>,
}

impl CacheSystem {
    /// Initialize the subsystem.
    ///
    /// Attempts the distributed connection per the settings, starts the local
    /// expiry sweeper, and wires the tracker and health aggregator together.
    pub async fn new(settings: Settings, database: Arc<dyn DatabaseProbe>) -> Self {
        info!("Initializing adaptive cache subsystem");

        let selector = Arc::new(BackendSelector::initialize(&settings).await);
        let sweeper = selector.local().spawn_sweeper(LOCAL_SWEEP_INTERVAL);

        let service = Arc::new(CacheService::new(Arc::clone(&selector)));
        let tracker = Arc::new(RequestTracker::new());
        let health = Arc::new(HealthAggregator::new(
            Arc::clone(&service),
            Arc::clone(&tracker),
            database,
        ));

        info!(backend = ?selector.active_kind(), "Adaptive cache subsystem initialized");

        Self {
            selector,
            service,
            tracker,
            health,
            settings: Arc::new(settings),
            sweeper,
        }
    }

    /// Build the operational router over this system's components.
    #[must_use]
    pub fn ops_router(&self) -> axum::Router {
        routes::ops_router(OpsState {
            health: Arc::clone(&self.health),
            cache: Arc::clone(&self.service),
            tracker: Arc::clone(&self.tracker),
            settings: Arc::clone(&self.settings),
        })
    }

    /// The settings this system was constructed with.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stop the background expiry sweeper.
    ///
    /// Cache state is in-memory (or remote) only, so there is nothing else to
    /// tear down.
    pub fn shutdown(&self) {
        self.sweeper.abort();
        info!("Adaptive cache subsystem shut down");
    }
}
