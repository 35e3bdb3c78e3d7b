//! Cache Service - The Single Public Cache API
//!
//! Every cache operation in the host application goes through this service.
//! All operations **fail open**: backend errors are logged at warning level
//! and converted to a neutral return (`None` / `false`), so the cache layer
//! can never be the cause of a failed request. A transport error on the
//! distributed backend additionally reports to the selector, which fails over
//! to the local store for all subsequent operations.

use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::selector::{ActiveBackend, BackendSelector};
use crate::traits::{CacheBackend, CacheError};

/// Backend-specific statistics exposed by [`CacheService::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Active backend: `"distributed"` or `"local"`
    pub backend: &'static str,
    /// Whether the distributed backend is connected and authoritative
    pub connected: bool,
    /// Number of stored keys, when the backend can report it
    pub keys: Option<u64>,
    /// Successful lookups
    pub hits: u64,
    /// Missed lookups
    pub misses: u64,
    /// Completed writes
    pub sets: u64,
    /// Hit rate in percent
    pub hit_rate: f64,
}

/// Fail-open cache API over whichever backend the selector holds active.
///
/// The service holds no backend-selection state of its own: every operation
/// resolves the active backend through the [`BackendSelector`] at call time.
pub struct CacheService {
    selector: Arc<BackendSelector>,
}

impl CacheService {
    /// Create a service over the given selector.
    #[must_use]
    pub fn new(selector: Arc<BackendSelector>) -> Self {
        Self { selector }
    }

    /// Get a value by key.
    ///
    /// Returns `None` on a miss, on a deserialization failure (a malformed
    /// payload is treated exactly like a miss), or on any backend error.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let backend = self.selector.active();

        match backend.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached payload failed to deserialize; treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.note_backend_error(&backend, &e, "get");
                None
            }
        }
    }

    /// Store a value with a time-to-live. A zero TTL stores without expiry.
    ///
    /// Returns `false` on serialization or backend errors; never raises.
    pub async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> bool {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Value failed to serialize; not cached");
                return false;
            }
        };

        let backend = self.selector.active();
        match backend.set_with_ttl(key, &bytes, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.note_backend_error(&backend, &e, "set");
                false
            }
        }
    }

    /// Delete a single key. Returns `false` only on a backend error.
    pub async fn del(&self, key: &str) -> bool {
        let backend = self.selector.active();
        match backend.remove(key).await {
            Ok(()) => true,
            Err(e) => {
                self.note_backend_error(&backend, &e, "del");
                false
            }
        }
    }

    /// Clear all entries in the currently active backend only.
    pub async fn flush(&self) -> bool {
        let backend = self.selector.active();
        match backend.flush().await {
            Ok(()) => true,
            Err(e) => {
                self.note_backend_error(&backend, &e, "flush");
                false
            }
        }
    }

    /// Delete all keys whose name matches a regular expression.
    ///
    /// The local backend iterates its key set; the distributed backend has no
    /// regex scan primitive, so there this is a no-op with a logged warning.
    /// An invalid pattern is likewise logged and ignored.
    pub async fn del_pattern(&self, pattern: &str) -> bool {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid invalidation pattern; skipping");
                return false;
            }
        };

        let backend = self.selector.active();
        match backend.del_pattern(&regex).await {
            Ok(removed) => {
                debug!(pattern = %pattern, count = removed, "Pattern invalidation complete");
                true
            }
            Err(CacheError::PatternUnsupported { backend }) => {
                warn!(pattern = %pattern, backend = backend, "Pattern deletes unsupported on this backend; skipping");
                false
            }
            Err(e) => {
                self.note_backend_error(&backend, &e, "del_pattern");
                false
            }
        }
    }

    /// Backend-specific statistics for the active backend.
    ///
    /// `keys` is `None` when the backend cannot report a count (e.g. the
    /// distributed backend mid-error); hit/miss counters always reflect the
    /// active backend's own counters.
    pub async fn stats(&self) -> CacheStats {
        let backend = self.selector.active();
        let counters = backend.counters();

        let keys = match backend.key_count().await {
            Ok(count) => count,
            Err(e) => {
                self.note_backend_error(&backend, &e, "stats");
                None
            }
        };

        CacheStats {
            backend: backend.name(),
            connected: self.selector.distributed_connected(),
            keys,
            hits: counters.hits,
            misses: counters.misses,
            sets: counters.sets,
            hit_rate: counters.hit_rate(),
        }
    }

    /// Round-trip health probe against the active backend.
    pub async fn health_check(&self) -> bool {
        self.selector.active().health_check().await
    }

    /// Which backend operations currently target.
    #[must_use]
    pub fn active_backend(&self) -> ActiveBackend {
        self.selector.active_kind()
    }

    fn note_backend_error(&self, backend: &Arc<dyn CacheBackend>, error: &CacheError, op: &str) {
        warn!(backend = backend.name(), op = op, error = %error, "Cache backend error; failing open");
        // The local store never raises transport errors, so this only latches
        // the fail-over when the distributed backend was the one that failed.
        if error.is_transport() {
            self.selector.report_transport_error();
        }
    }
}
