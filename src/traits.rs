//! Backend Traits and Error Taxonomy
//!
//! This module defines the trait abstractions behind the adaptive cache:
//!
//! - `CacheBackend`: core trait implemented by the local and distributed stores
//! - `DatabaseProbe`: seam to the relational data store, used only for liveness probing
//! - `CacheError`: the internal error taxonomy that the service layer folds into
//!   fail-open neutral returns
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use adaptive_cache::{CacheBackend, CacheError, async_trait};
//! use regex::Regex;
//! use std::time::Duration;
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl CacheBackend for MyStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
//!         // Your implementation
//!     }
//!     // ... remaining operations
//! }
//! ```

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by cache backends.
///
/// These never escape the `CacheService` boundary: transport and serialization
/// failures are converted into neutral return values (`None` / `false`) and a
/// warning log. The taxonomy exists so the service can tell a transport error
/// (which triggers backend fail-over) apart from a bad payload (which does not).
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend was unreachable or the operation failed in transit.
    #[error("cache transport error: {0}")]
    Transport(String),

    /// The stored payload could not be serialized or deserialized.
    #[error("cache payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend has no efficient primitive for pattern-based deletes.
    #[error("pattern deletes are not supported by the {backend} backend")]
    PatternUnsupported {
        /// Name of the backend that rejected the operation
        backend: &'static str,
    },
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl CacheError {
    /// Whether this error indicates the backend itself is unreachable.
    ///
    /// Transport errors on the distributed backend trigger the permanent
    /// fail-over to the local store; other error kinds do not.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Raw hit/miss/set counters maintained by every backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendCounters {
    /// Successful lookups
    pub hits: u64,
    /// Lookups that found nothing (or an expired entry)
    pub misses: u64,
    /// Completed writes
    pub sets: u64,
}

impl BackendCounters {
    /// Hit rate in percent over all recorded lookups, `0.0` when idle.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                (self.hits as f64 / lookups as f64) * 100.0
            }
        }
    }
}

/// Core trait implemented by both cache backends.
///
/// Values are opaque byte payloads (serialized JSON); the service layer owns
/// serialization so that a malformed payload is indistinguishable from a miss
/// to callers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every operation may be invoked from
/// any worker thread of the runtime.
///
/// # Error Contract
///
/// Operations return `Err` only for genuine backend failures. A missing key is
/// `Ok(None)`, never an error. `del_pattern` returns
/// [`CacheError::PatternUnsupported`] when the backend cannot enumerate keys
/// by pattern; callers treat that as a logged no-op.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the raw payload stored under `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - key present and not expired
    /// * `Ok(None)` - key absent or expired
    /// * `Err(e)` - backend failure
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key` with a time-to-live.
    ///
    /// A zero `ttl` stores the entry without expiry.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Remove a single key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry held by this backend.
    async fn flush(&self) -> Result<(), CacheError>;

    /// Remove every key whose name matches `pattern`.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - number of keys removed
    /// * `Err(CacheError::PatternUnsupported)` - the backend cannot scan keys
    ///   by regular expression
    async fn del_pattern(&self, pattern: &Regex) -> Result<u64, CacheError>;

    /// Number of keys currently held, when the backend can report it cheaply.
    async fn key_count(&self) -> Result<Option<u64>, CacheError>;

    /// Snapshot of this backend's hit/miss/set counters.
    fn counters(&self) -> BackendCounters;

    /// Verify the backend is operational with a write/read/delete round-trip.
    async fn health_check(&self) -> bool;

    /// Short backend name used in logs and stats payloads.
    fn name(&self) -> &'static str;
}

/// Liveness seam to the relational data store.
///
/// The data store itself is an external collaborator; the health aggregator
/// only needs one lightweight liveness query and one aggregate-count query,
/// both of which run under a caller-supplied deadline. Implementations wrap
/// whatever query layer the host application uses.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Execute one lightweight liveness query (e.g. `SELECT 1`).
    async fn liveness(&self) -> anyhow::Result<()>;

    /// Execute one aggregate-count query and return its result as JSON
    /// (e.g. row counts of the main business tables).
    async fn aggregate_stats(&self) -> anyhow::Result<serde_json::Value>;

    /// Connection-pool status as JSON. Defaults to an empty object for
    /// probes with no pool to report on.
    fn pool_info(&self) -> serde_json::Value {
        serde_json::json!({})
    }
}
