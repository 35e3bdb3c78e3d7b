//! Local Cache - In-Process `DashMap` Backend
//!
//! Single-instance key/value store with per-key TTL, used as the fallback
//! backend whenever the distributed cache is unconfigured or has failed over.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::traits::{BackendCounters, CacheBackend, CacheError};
use async_trait::async_trait;

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        // Zero TTL stores without expiry
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// In-process cache backend using `DashMap`.
///
/// **Features**:
/// - Lock-free concurrent reads/writes
/// - Per-key TTL with lazy expiry on read plus a periodic sweeper task
/// - Full key-set iteration, so pattern deletes are always supported
///
/// **Limitations**:
/// - Not shared across processes
/// - No eviction policy beyond TTL expiry (unbounded growth between sweeps)
pub struct LocalCache {
    /// Concurrent `HashMap`
    map: Arc<DashMap<String, LocalEntry>>,
    /// Hit counter
    hits: Arc<AtomicU64>,
    /// Miss counter
    misses: Arc<AtomicU64>,
    /// Set counter
    sets: Arc<AtomicU64>,
}

impl LocalCache {
    /// Create a new local cache
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing local cache backend (DashMap)");

        Self {
            map: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Remove expired entries, returning how many were dropped.
    ///
    /// Reads already skip expired entries; this reclaims their memory.
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[Local] Swept expired entries");
        }
        removed
    }

    /// Spawn a background task that sweeps expired entries every `interval`.
    ///
    /// The returned handle can be aborted at shutdown; the task holds no
    /// strong reference cycles.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired();
            }
        })
    }

    /// Current number of stored entries (expired-but-unswept included)
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Trait Implementations =====

#[async_trait]
impl CacheBackend for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(entry) = self.map.get(key) {
            if entry.is_expired() {
                drop(entry); // Release read lock before removing
                self.map.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let entry = LocalEntry::new(value.to_vec(), ttl);
        self.map.insert(key.to_string(), entry);
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[Local] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.map.remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let count = self.map.len();
        self.map.clear();
        info!(count = count, "[Local] Flushed all entries");
        Ok(())
    }

    async fn del_pattern(&self, pattern: &Regex) -> Result<u64, CacheError> {
        let mut removed: u64 = 0;
        self.map.retain(|key, _| {
            if pattern.is_match(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        debug!(pattern = %pattern.as_str(), count = removed, "[Local] Removed keys matching pattern");
        Ok(removed)
    }

    async fn key_count(&self) -> Result<Option<u64>, CacheError> {
        Ok(Some(self.map.len() as u64))
    }

    fn counters(&self) -> BackendCounters {
        BackendCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_local";
        let test_value = b"health_check_value";

        match self
            .set_with_ttl(test_key, test_value, Duration::from_secs(60))
            .await
        {
            Ok(()) => match self.get(test_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.remove(test_key).await;
                    retrieved == test_value
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let cache = LocalCache::new();
        cache
            .set_with_ttl("forever", b"v", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.get("forever").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_gets_swept() {
        let cache = LocalCache::new();
        cache
            .set_with_ttl("soon", b"v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("soon").await.unwrap(), None);

        cache
            .set_with_ttl("soon2", b"v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn pattern_delete_only_touches_matches() {
        let cache = LocalCache::new();
        for key in ["deals:1", "deals:2", "users:1"] {
            cache
                .set_with_ttl(key, b"v", Duration::from_secs(60))
                .await
                .unwrap();
        }

        let pattern = Regex::new("^deals:").unwrap();
        let removed = cache.del_pattern(&pattern).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(cache.get("users:1").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get("deals:1").await.unwrap(), None);
    }
}
