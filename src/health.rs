//! Health Aggregator
//!
//! On-demand liveness probing: runs database, cache and system probes
//! concurrently and folds them into a single health verdict plus advisory
//! recommendations. Probes never raise - every failure becomes a status field.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sysinfo::System;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::service::CacheService;
use crate::tracker::{RequestMetrics, RequestTracker, SlowRequestRecord};
use crate::traits::DatabaseProbe;

/// Default deadline for the database liveness probe.
pub const DB_PROBE_DEADLINE: Duration = Duration::from_secs(5);
/// TTL on the disposable cache probe key.
const CACHE_PROBE_TTL: Duration = Duration::from_secs(10);
/// Slow-request records included in a health report.
const REPORT_SLOW_REQUESTS: usize = 10;

/// Process heap (RSS) above this triggers a memory recommendation.
const HEAP_WARN_BYTES: u64 = 500 * 1024 * 1024;
/// Smoothed average latency above this triggers a latency recommendation.
const AVG_LATENCY_WARN_MS: f64 = 1000.0;
/// Slow-request count above this triggers a throughput recommendation.
const SLOW_COUNT_WARN: u64 = 10;

/// Overall verdict for the whole subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    /// Database healthy and cache not unhealthy
    Healthy,
    /// Something is off but the system is still serving
    Degraded,
    /// Database and cache are both down
    Error,
}

/// Database probe verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    /// Liveness query returned within the deadline
    Healthy,
    /// Query error or deadline exceeded
    Unhealthy,
}

/// Cache probe verdict.
///
/// `Degraded` means the cache responded but without round-trip integrity;
/// only an outright probe error is `Unhealthy`. A degraded cache does not
/// fail the overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Probe round-trip matched
    Healthy,
    /// Cache responded but the probe value did not round-trip
    Degraded,
    /// Probe write failed outright
    Unhealthy,
}

/// Process and OS metrics. Read failures degrade to zero values.
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    /// Resident memory of this process in bytes
    pub process_memory_bytes: u64,
    /// Seconds since the aggregator was constructed
    pub process_uptime_secs: u64,
    /// Total system memory in bytes
    pub total_memory_bytes: u64,
    /// Used system memory in bytes
    pub used_memory_bytes: u64,
    /// Logical CPU count
    pub cpu_count: usize,
    /// Global CPU usage in percent
    pub cpu_usage_percent: f32,
    /// 1/5/15 minute load averages
    pub load_average: [f64; 3],
}

/// Database probe result.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    /// Probe verdict
    pub status: DatabaseStatus,
    /// Time the liveness query took, milliseconds
    pub connection_time_ms: u64,
    /// Aggregate-count query result, `null` on failure
    pub stats: serde_json::Value,
    /// Connection-pool status as reported by the probe
    pub pool: serde_json::Value,
    /// Error description when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cache probe result.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    /// Probe verdict
    pub status: CacheStatus,
    /// Which backend served the probe
    pub backend: &'static str,
}

/// Advisory recommendation emitted when a threshold is exceeded.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    /// Category: `memory`, `latency` or `throughput`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `warning` for all current thresholds
    pub severity: &'static str,
    /// Human-readable advisory
    pub message: String,
    /// The measured value that crossed the threshold
    pub value: f64,
}

/// Full health report, recomputed on every call and never cached.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall verdict
    pub status: OverallHealth,
    /// Per-collaborator probe results
    pub services: HealthServices,
    /// Request metrics and the most recent slow requests
    pub performance: HealthPerformance,
    /// Unix timestamp (seconds) at report time
    pub timestamp: u64,
}

/// Probe results grouped per collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct HealthServices {
    /// Database liveness
    pub database: DatabaseHealth,
    /// Cache round-trip
    pub cache: CacheHealth,
    /// Process/OS metrics
    pub system: SystemMetrics,
}

/// Request-level performance section of the report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthPerformance {
    /// Aggregate request counters
    pub metrics: RequestMetrics,
    /// Last slow requests, oldest first
    pub slow_requests: Vec<SlowRequestRecord>,
}

/// Aggregates database, cache and system probes into one verdict.
pub struct HealthAggregator {
    cache: Arc<CacheService>,
    tracker: Arc<RequestTracker>,
    database: Arc<dyn DatabaseProbe>,
    system: Mutex<System>,
    started_at: Instant,
}

impl HealthAggregator {
    /// Create an aggregator over the given collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<CacheService>,
        tracker: Arc<RequestTracker>,
        database: Arc<dyn DatabaseProbe>,
    ) -> Self {
        Self {
            cache,
            tracker,
            database,
            system: Mutex::new(System::new()),
            started_at: Instant::now(),
        }
    }

    /// Read process memory/uptime and OS CPU/load info.
    ///
    /// Pure read with no side effects beyond refreshing the sampler; always
    /// succeeds - unreadable metrics come back as zero.
    pub fn system_metrics(&self) -> SystemMetrics {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        sys.refresh_cpu();

        let process_memory_bytes = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| {
                sys.refresh_process(pid);
                sys.process(pid).map(|p| p.memory())
            })
            .unwrap_or(0);

        let load = System::load_average();

        SystemMetrics {
            process_memory_bytes,
            process_uptime_secs: self.started_at.elapsed().as_secs(),
            total_memory_bytes: sys.total_memory(),
            used_memory_bytes: sys.used_memory(),
            cpu_count: sys.cpus().len(),
            cpu_usage_percent: sys.global_cpu_info().cpu_usage(),
            load_average: [load.one, load.five, load.fifteen],
        }
    }

    /// Run the database liveness and aggregate-count queries under `deadline`.
    ///
    /// Never raises: errors and timeouts produce an `unhealthy` result.
    pub async fn database_health(&self, deadline: Duration) -> DatabaseHealth {
        let started = Instant::now();

        let probe = async {
            self.database.liveness().await?;
            let connection_time_ms = started.elapsed().as_millis() as u64;
            let stats = self.database.aggregate_stats().await?;
            anyhow::Ok((connection_time_ms, stats))
        };

        match tokio::time::timeout(deadline, probe).await {
            Ok(Ok((connection_time_ms, stats))) => DatabaseHealth {
                status: DatabaseStatus::Healthy,
                connection_time_ms,
                stats,
                pool: self.database.pool_info(),
                error: None,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Database health probe failed");
                DatabaseHealth {
                    status: DatabaseStatus::Unhealthy,
                    connection_time_ms: started.elapsed().as_millis() as u64,
                    stats: serde_json::Value::Null,
                    pool: self.database.pool_info(),
                    error: Some(e.to_string()),
                }
            }
            Err(_) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Database health probe timed out");
                DatabaseHealth {
                    status: DatabaseStatus::Unhealthy,
                    connection_time_ms: deadline.as_millis() as u64,
                    stats: serde_json::Value::Null,
                    pool: self.database.pool_info(),
                    error: Some("probe deadline exceeded".to_string()),
                }
            }
        }
    }

    /// Write, read back and delete a disposable probe key.
    ///
    /// Healthy iff the round-trip value matches; a cache that responded
    /// without integrity is degraded, and only an outright probe-write error
    /// is unhealthy.
    pub async fn cache_health(&self) -> CacheHealth {
        let backend = match self.cache.active_backend() {
            crate::selector::ActiveBackend::Distributed => "distributed",
            crate::selector::ActiveBackend::Local => "local",
        };

        let probe_key = format!("health:probe:{}", Uuid::new_v4());
        let probe_value = serde_json::json!({ "probe": probe_key });

        if !self.cache.set(&probe_key, &probe_value, CACHE_PROBE_TTL).await {
            return CacheHealth {
                status: CacheStatus::Unhealthy,
                backend,
            };
        }

        let status = match self.cache.get(&probe_key).await {
            Some(read_back) if read_back == probe_value => CacheStatus::Healthy,
            _ => CacheStatus::Degraded,
        };
        let _ = self.cache.del(&probe_key).await;

        debug!(backend = backend, status = ?status, "Cache health probe complete");
        CacheHealth { status, backend }
    }

    /// Run all three probes concurrently and combine them.
    ///
    /// Overall status is `healthy` only if the database is healthy **and**
    /// the cache is not unhealthy; a degraded cache alone never fails the
    /// system. `error` is reserved for the total outage where database and
    /// cache are both down.
    pub async fn report(&self) -> HealthReport {
        let (database, cache) = tokio::join!(
            self.database_health(DB_PROBE_DEADLINE),
            self.cache_health()
        );
        let system = self.system_metrics();

        let status = match (database.status, cache.status) {
            (DatabaseStatus::Healthy, CacheStatus::Healthy | CacheStatus::Degraded) => {
                OverallHealth::Healthy
            }
            (DatabaseStatus::Unhealthy, CacheStatus::Unhealthy) => OverallHealth::Error,
            _ => OverallHealth::Degraded,
        };

        HealthReport {
            status,
            services: HealthServices {
                database,
                cache,
                system,
            },
            performance: HealthPerformance {
                metrics: self.tracker.metrics(),
                slow_requests: self.tracker.recent_slow(REPORT_SLOW_REQUESTS),
            },
            timestamp: unix_secs(),
        }
    }

    /// Advisory recommendations over the current metrics.
    ///
    /// Pure function of request metrics and process memory against fixed
    /// thresholds; returns an empty list when nothing is notable.
    #[must_use]
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let metrics = self.tracker.metrics();
        let system = self.system_metrics();
        let mut out = Vec::new();

        if system.process_memory_bytes > HEAP_WARN_BYTES {
            out.push(Recommendation {
                kind: "memory",
                severity: "warning",
                message: format!(
                    "Process memory {} MiB exceeds {} MiB; consider restarting or investigating leaks",
                    system.process_memory_bytes / (1024 * 1024),
                    HEAP_WARN_BYTES / (1024 * 1024)
                ),
                #[allow(clippy::cast_precision_loss)]
                value: system.process_memory_bytes as f64,
            });
        }

        if metrics.avg_response_time_ms > AVG_LATENCY_WARN_MS {
            out.push(Recommendation {
                kind: "latency",
                severity: "warning",
                message: format!(
                    "Average response time {:.0}ms exceeds {AVG_LATENCY_WARN_MS:.0}ms; check slow queries and cache hit rate",
                    metrics.avg_response_time_ms
                ),
                value: metrics.avg_response_time_ms,
            });
        }

        if metrics.slow_request_count > SLOW_COUNT_WARN {
            out.push(Recommendation {
                kind: "throughput",
                severity: "warning",
                message: format!(
                    "{} slow requests recorded (threshold {SLOW_COUNT_WARN}); inspect the slow-request log",
                    metrics.slow_request_count
                ),
                #[allow(clippy::cast_precision_loss)]
                value: metrics.slow_request_count as f64,
            });
        }

        out
    }

    /// Zero the request metrics and clear the slow-request ring buffer.
    pub fn reset_metrics(&self) {
        self.tracker.reset();
    }

    /// Seconds since this aggregator was constructed.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
