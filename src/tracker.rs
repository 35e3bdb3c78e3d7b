//! Request Tracker - Per-Request Latency Instrumentation
//!
//! Maintains aggregate request counters, an exponentially-smoothed response
//! time, and a bounded ring buffer of slow-request records. Fed by the
//! tracking middleware once per completed response; read by the health
//! aggregator; reset only through the explicit operator-triggered reset.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Requests slower than this are recorded as slow (milliseconds).
pub const SLOW_REQUEST_THRESHOLD_MS: u64 = 1000;
/// Fixed capacity of the slow-request ring buffer.
pub const SLOW_REQUEST_CAPACITY: usize = 100;

/// One slow request, as kept in the ring buffer. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SlowRequestRecord {
    /// Unix timestamp in milliseconds at record time
    pub timestamp_ms: u64,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Total handler latency in milliseconds
    pub duration_ms: u64,
    /// `User-Agent` header, when present
    pub user_agent: Option<String>,
    /// Client address as reported upstream, when present
    pub client_ip: Option<String>,
}

/// Snapshot of the aggregate request counters.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    /// Total requests recorded since start or last reset
    pub total: u64,
    /// Request count per HTTP method
    pub by_method: HashMap<String, u64>,
    /// Request count per response status code
    pub by_status: HashMap<u16, u64>,
    /// Smoothed response time, see [`RequestTracker::record`]
    pub avg_response_time_ms: f64,
    /// Requests that exceeded [`SLOW_REQUEST_THRESHOLD_MS`]
    pub slow_request_count: u64,
}

/// Aggregates per-request latency data under concurrent request handling.
///
/// Counters are atomics; the maps, the average and the ring buffer sit behind
/// `parking_lot` locks since requests complete on arbitrary worker threads.
pub struct RequestTracker {
    total: AtomicU64,
    slow_count: AtomicU64,
    by_method: RwLock<HashMap<String, u64>>,
    by_status: RwLock<HashMap<u16, u64>>,
    avg_response_time_ms: Mutex<f64>,
    slow_requests: Mutex<VecDeque<SlowRequestRecord>>,
}

impl RequestTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            slow_count: AtomicU64::new(0),
            by_method: RwLock::new(HashMap::new()),
            by_status: RwLock::new(HashMap::new()),
            avg_response_time_ms: Mutex::new(0.0),
            slow_requests: Mutex::new(VecDeque::with_capacity(SLOW_REQUEST_CAPACITY)),
        }
    }

    /// Record one completed request.
    ///
    /// The average uses `avg = (avg + duration) / 2` - not a true running
    /// mean. Each new sample contributes roughly half the delta, heavily
    /// weighting the most recent request. This smoothing quirk is preserved
    /// deliberately for compatibility and is asserted by tests; a follow-up
    /// may replace it with a real running mean.
    pub fn record(
        &self,
        method: &str,
        path: &str,
        status: u16,
        duration_ms: u64,
        user_agent: Option<&str>,
        client_ip: Option<&str>,
    ) {
        self.total.fetch_add(1, Ordering::Relaxed);

        *self
            .by_method
            .write()
            .entry(method.to_string())
            .or_insert(0) += 1;
        *self.by_status.write().entry(status).or_insert(0) += 1;

        {
            let mut avg = self.avg_response_time_ms.lock();
            #[allow(clippy::cast_precision_loss)]
            {
                *avg = (*avg + duration_ms as f64) / 2.0;
            }
        }

        if duration_ms > SLOW_REQUEST_THRESHOLD_MS {
            self.slow_count.fetch_add(1, Ordering::Relaxed);

            let record = SlowRequestRecord {
                timestamp_ms: unix_millis(),
                method: method.to_string(),
                path: path.to_string(),
                duration_ms,
                user_agent: user_agent.map(ToString::to_string),
                client_ip: client_ip.map(ToString::to_string),
            };

            let mut ring = self.slow_requests.lock();
            if ring.len() >= SLOW_REQUEST_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(record);

            warn!(
                method = %method,
                path = %path,
                status = status,
                duration_ms = duration_ms,
                "Slow request"
            );
        }
    }

    /// Snapshot of the aggregate counters.
    #[must_use]
    pub fn metrics(&self) -> RequestMetrics {
        RequestMetrics {
            total: self.total.load(Ordering::Relaxed),
            by_method: self.by_method.read().clone(),
            by_status: self.by_status.read().clone(),
            avg_response_time_ms: *self.avg_response_time_ms.lock(),
            slow_request_count: self.slow_count.load(Ordering::Relaxed),
        }
    }

    /// The most recent `limit` slow-request records, oldest first.
    #[must_use]
    pub fn recent_slow(&self, limit: usize) -> Vec<SlowRequestRecord> {
        let ring = self.slow_requests.lock();
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    /// Number of records currently held in the ring buffer.
    #[must_use]
    pub fn slow_buffer_len(&self) -> usize {
        self.slow_requests.lock().len()
    }

    /// Zero all counters and clear the ring buffer.
    ///
    /// Operator-triggered only; nothing resets metrics automatically.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.slow_count.store(0, Ordering::Relaxed);
        self.by_method.write().clear();
        self.by_status.write().clear();
        *self.avg_response_time_ms.lock() = 0.0;
        self.slow_requests.lock().clear();
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
