//! Redis Cache - Distributed Cache Backend
//!
//! Redis-based distributed cache shared across processes. Used as the
//! authoritative backend when a connection URL is configured (or the process
//! runs in production mode) and the initial connection succeeds.

use anyhow::{Context, Result};
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::traits::{BackendCounters, CacheBackend, CacheError};
use async_trait::async_trait;

/// Base delay for connection retries; actual delay is `base * attempt`.
const CONNECT_BASE_DELAY: Duration = Duration::from_millis(500);
/// Upper bound on any single retry delay.
const CONNECT_MAX_DELAY: Duration = Duration::from_secs(10);
/// Attempt budget before the distributed backend is written off for this process.
const CONNECT_MAX_ATTEMPTS: u32 = 5;

/// Redis distributed cache with `ConnectionManager` for connection pooling.
///
/// Provides:
/// - Distributed caching shared across instances
/// - Capped exponential backoff on the initial connection
/// - `FLUSHDB` / `DBSIZE` for flush and key counting
///
/// Pattern-based deletes are **not** supported here: Redis scans use glob
/// patterns, not regular expressions, and emulating a regex scan would mean a
/// full key dump. `del_pattern` therefore returns
/// [`CacheError::PatternUnsupported`]; only the local backend honors it.
pub struct RedisCache {
    /// Redis connection manager
    conn_manager: ConnectionManager,
    /// Hit counter
    hits: Arc<AtomicU64>,
    /// Miss counter
    misses: Arc<AtomicU64>,
    /// Set counter
    sets: Arc<AtomicU64>,
}

impl RedisCache {
    /// Create a new Redis cache, connecting once without retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or the connection
    /// (including the `PING` probe) fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!(redis_url = %redis_url, "Connecting distributed cache backend (Redis)");

        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client with URL: {redis_url}"))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        // Verify the connection before declaring the backend usable
        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redis_url, "Distributed cache backend connected");

        Ok(Self {
            conn_manager,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create a new Redis cache with capped exponential backoff.
    ///
    /// Delay grows as `base * attempt` (capped, with a little jitter) up to a
    /// fixed attempt budget. Once the budget is exhausted the caller should
    /// treat the distributed backend as permanently unavailable for this
    /// process.
    ///
    /// # Errors
    ///
    /// Returns the final connection error after all attempts failed.
    pub async fn connect_with_retry(redis_url: &str) -> Result<Self> {
        let mut last_err = None;

        for attempt in 1..=CONNECT_MAX_ATTEMPTS {
            match Self::connect(redis_url).await {
                Ok(cache) => return Ok(cache),
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = CONNECT_MAX_ATTEMPTS,
                        error = %e,
                        "Redis connection attempt failed"
                    );
                    last_err = Some(e);

                    if attempt < CONNECT_MAX_ATTEMPTS {
                        let delay = CONNECT_BASE_DELAY
                            .saturating_mul(attempt)
                            .min(CONNECT_MAX_DELAY);
                        let jitter =
                            Duration::from_millis(rand::thread_rng().gen_range(0..100));
                        tokio::time::sleep(delay + jitter).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Redis connection retries exhausted")))
    }
}

// ===== Trait Implementations =====

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn_manager.clone();

        let value: Option<Vec<u8>> = conn.get(key).await?;
        match value {
            Some(bytes) if !bytes.is_empty() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(bytes))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();

        // SETEX rejects a zero expiry; zero TTL means "no expiry" here
        if ttl.is_zero() {
            let _: () = conn.set(key, value).await?;
        } else {
            let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        }
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        info!("[Redis] Flushed database");
        Ok(())
    }

    async fn del_pattern(&self, _pattern: &Regex) -> Result<u64, CacheError> {
        // Redis SCAN matches glob patterns, not regular expressions; a regex
        // scan would require dumping every key. Known-degraded path.
        Err(CacheError::PatternUnsupported { backend: "redis" })
    }

    async fn key_count(&self) -> Result<Option<u64>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(Some(count))
    }

    fn counters(&self) -> BackendCounters {
        BackendCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_redis";
        let test_value = vec![1, 2, 3, 4];

        match self
            .set_with_ttl(test_key, &test_value, Duration::from_secs(10))
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
        "distributed"
    }
}
