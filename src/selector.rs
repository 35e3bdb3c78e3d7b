//! Backend Selector
//!
//! Decides which cache backend is authoritative: the distributed store when it
//! is configured and reachable, the local in-process store otherwise. Owns the
//! single transition the subsystem ever makes at runtime - the permanent
//! fail-over from distributed to local after a transport error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::backends::{LocalCache, RedisCache};
use crate::config::Settings;
use crate::traits::CacheBackend;

/// Which backend is currently authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBackend {
    /// The Redis-backed distributed store
    Distributed,
    /// The in-process `DashMap` store
    Local,
}

/// Selects the active cache backend and owns the fail-over transition.
///
/// Both handles are created at startup and never destroyed mid-process; the
/// inactive backend is simply not consulted. Fail-over is fail-safe-once:
/// after the distributed backend errors there is no automatic promotion back,
/// the local store stays authoritative until the process restarts.
pub struct BackendSelector {
    /// Distributed handle; `None` when never configured or the initial
    /// connection (with retries) failed
    distributed: Option<Arc<dyn CacheBackend>>,
    /// Local handle; always present, it is the fail-over target
    local: Arc<LocalCache>,
    /// Latched once the distributed backend reports a transport error
    distributed_down: AtomicBool,
}

impl BackendSelector {
    /// Initialize the selector per the configured settings.
    ///
    /// The distributed connection is attempted only when a URL is supplied or
    /// the process runs in production mode; connection failure (after the
    /// retry budget) is logged and the selector starts local-active. This
    /// constructor never fails.
    pub async fn initialize(settings: &Settings) -> Self {
        let local = Arc::new(LocalCache::new());

        let should_attempt = settings.redis_url.is_some() || settings.production;
        if !should_attempt {
            info!("No distributed cache configured; local backend active");
            return Self {
                distributed: None,
                local,
                distributed_down: AtomicBool::new(false),
            };
        }

        let url = settings
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        match RedisCache::connect_with_retry(&url).await {
            Ok(cache) => {
                info!("Distributed backend active");
                Self {
                    distributed: Some(Arc::new(cache)),
                    local,
                    distributed_down: AtomicBool::new(false),
                }
            }
            Err(e) => {
                warn!(error = %e, "Distributed cache unavailable; falling back to local backend");
                Self {
                    distributed: None,
                    local,
                    distributed_down: AtomicBool::new(false),
                }
            }
        }
    }

    /// Build a selector that only ever uses the local backend.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            distributed: None,
            local: Arc::new(LocalCache::new()),
            distributed_down: AtomicBool::new(false),
        }
    }

    /// Build a selector around an already-connected distributed backend.
    ///
    /// Mostly useful for tests and for hosts that manage the Redis connection
    /// themselves.
    #[must_use]
    pub fn with_distributed(distributed: Arc<dyn CacheBackend>) -> Self {
        Self {
            distributed: Some(distributed),
            local: Arc::new(LocalCache::new()),
            distributed_down: AtomicBool::new(false),
        }
    }

    /// The backend every cache operation must target right now.
    #[must_use]
    pub fn active(&self) -> Arc<dyn CacheBackend> {
        match (&self.distributed, self.distributed_down.load(Ordering::Acquire)) {
            (Some(distributed), false) => Arc::clone(distributed),
            _ => Arc::clone(&self.local) as Arc<dyn CacheBackend>,
        }
    }

    /// Which backend [`Self::active`] currently resolves to.
    #[must_use]
    pub fn active_kind(&self) -> ActiveBackend {
        match (&self.distributed, self.distributed_down.load(Ordering::Acquire)) {
            (Some(_), false) => ActiveBackend::Distributed,
            _ => ActiveBackend::Local,
        }
    }

    /// Whether the distributed backend is connected and authoritative.
    #[must_use]
    pub fn distributed_connected(&self) -> bool {
        self.active_kind() == ActiveBackend::Distributed
    }

    /// Record a transport error on the distributed backend.
    ///
    /// Latches the permanent fail-over; the transition itself is logged, never
    /// raised. Safe to call concurrently and when already failed over.
    pub fn report_transport_error(&self) {
        if self.distributed.is_some() && !self.distributed_down.swap(true, Ordering::AcqRel) {
            warn!("Distributed cache transport error; failing over to local backend permanently");
        }
    }

    /// Handle to the local store, for the sweeper task.
    #[must_use]
    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }
}
