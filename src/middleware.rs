//! HTTP Middleware
//!
//! Three axum middlewares wire the subsystem into the request pipeline:
//!
//! - **Read-through** ([`read_through`]): for qualifying requests, consult the
//!   cache before the handler and populate it from the handler's 200 response.
//! - **Invalidation** ([`invalidate_after`]): after a successful mutating
//!   request, fire pattern deletes against the cache.
//! - **Tracking** ([`track_requests`]): measure handler latency and feed the
//!   [`RequestTracker`].
//!
//! Cache writes and invalidations run as detached tasks; their failures feed
//! logging only and can never affect the response already on its way out.
//!
//! # Example
//!
//! ```rust,ignore
//! use adaptive_cache::middleware::{self, CacheLayerState, RouteCache};
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use std::time::Duration;
//!
//! let cached = CacheLayerState::new(service.clone(), RouteCache::new(Duration::from_secs(600)));
//! let app: Router = Router::new()
//!     .route("/businesses", get(list_businesses))
//!     .layer(from_fn_with_state(cached, middleware::read_through));
//! ```

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::service::CacheService;
use crate::tracker::RequestTracker;

/// Default TTL for read-through cached responses.
const DEFAULT_ROUTE_TTL: Duration = Duration::from_secs(300);

/// Generates the cache key for a request.
pub type KeyGenerator = Arc<dyn Fn(&Parts) -> String + Send + Sync>;
/// Decides whether a request qualifies for read-through caching.
pub type CacheCondition = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Per-route read-through configuration.
///
/// Defaults: 5 minute TTL, `"METHOD:path"` keys, and "method is GET" as the
/// qualifying condition.
#[derive(Clone)]
pub struct RouteCache {
    /// TTL applied to cached response bodies
    pub ttl: Duration,
    /// Request-to-key function
    pub key_generator: KeyGenerator,
    /// Qualifying condition; non-qualifying requests pass through untouched
    pub condition: CacheCondition,
}

impl RouteCache {
    /// Config with the given TTL and default key/condition.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            key_generator: Arc::new(default_key),
            condition: Arc::new(|parts| parts.method == Method::GET),
        }
    }

    /// Replace the key generator.
    #[must_use]
    pub fn with_key_generator(
        mut self,
        key_generator: impl Fn(&Parts) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_generator = Arc::new(key_generator);
        self
    }

    /// Replace the qualifying condition.
    #[must_use]
    pub fn with_condition(
        mut self,
        condition: impl Fn(&Parts) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Arc::new(condition);
        self
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_TTL)
    }
}

fn default_key(parts: &Parts) -> String {
    format!("{}:{}", parts.method, parts.uri.path())
}

/// State for [`read_through`], one per cached route (or route group).
#[derive(Clone)]
pub struct CacheLayerState {
    /// The shared cache service
    pub service: Arc<CacheService>,
    /// Route-level configuration
    pub config: RouteCache,
}

impl CacheLayerState {
    /// Bundle a service with a route configuration.
    #[must_use]
    pub fn new(service: Arc<CacheService>, config: RouteCache) -> Self {
        Self { service, config }
    }
}

/// Read-through cache middleware.
///
/// 1. Non-qualifying requests (per the configured condition) pass through and
///    never touch the cache.
/// 2. On a hit, short-circuits with the cached JSON body and `x-cache: HIT`;
///    the handler is not invoked.
/// 3. On a miss, invokes the handler; a 200 response with a JSON body is
///    written back to the cache by a detached task (fire-and-forget - a set
///    failure cannot affect the response).
pub async fn read_through(
    State(state): State<CacheLayerState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    if !(state.config.condition)(&parts) {
        return next.run(Request::from_parts(parts, body)).await;
    }

    let key = (state.config.key_generator)(&parts);

    if let Some(cached) = state.service.get(&key).await {
        if let Ok(bytes) = serde_json::to_vec(&cached) {
            debug!(key = %key, "Cache hit; short-circuiting handler");
            return cached_response(bytes);
        }
    }

    let response = next.run(Request::from_parts(parts, body)).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut res_parts, res_body) = response.into_parts();
    let bytes = match to_bytes(res_body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read response body for caching");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Only JSON payloads are cached; anything else passes through untouched
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        let service = Arc::clone(&state.service);
        let ttl = state.config.ttl;
        let task_key = key.clone();
        tokio::spawn(async move {
            if !service.set(&task_key, &value, ttl).await {
                warn!(key = %task_key, "Background cache set failed");
            }
        });
    }

    res_parts
        .headers
        .insert(x_cache_header(), HeaderValue::from_static("MISS"));
    Response::from_parts(res_parts, Body::from(bytes))
}

fn cached_response(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (x_cache_header(), HeaderValue::from_static("HIT")),
        ],
        bytes,
    )
        .into_response()
}

fn x_cache_header() -> HeaderName {
    HeaderName::from_static("x-cache")
}

/// A pattern fed to `del_pattern` after a successful mutating request.
#[derive(Clone)]
pub enum InvalidationPattern {
    /// Fixed regex string
    Literal(String),
    /// Pattern derived from the request (e.g. embedding a path parameter)
    Dynamic(Arc<dyn Fn(&Parts) -> String + Send + Sync>),
}

impl InvalidationPattern {
    /// Fixed pattern.
    #[must_use]
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self::Literal(pattern.into())
    }

    /// Request-derived pattern.
    #[must_use]
    pub fn dynamic(f: impl Fn(&Parts) -> String + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    fn resolve(&self, parts: &Parts) -> String {
        match self {
            Self::Literal(pattern) => pattern.clone(),
            Self::Dynamic(f) => f(parts),
        }
    }
}

impl From<&str> for InvalidationPattern {
    fn from(pattern: &str) -> Self {
        Self::literal(pattern)
    }
}

/// State for [`invalidate_after`].
#[derive(Clone)]
pub struct InvalidationLayerState {
    /// The shared cache service
    pub service: Arc<CacheService>,
    /// Patterns resolved and deleted after each 2xx response
    pub patterns: Vec<InvalidationPattern>,
}

impl InvalidationLayerState {
    /// Bundle a service with a pattern list.
    #[must_use]
    pub fn new(service: Arc<CacheService>, patterns: Vec<InvalidationPattern>) -> Self {
        Self { service, patterns }
    }
}

/// Write-through invalidation middleware.
///
/// After the wrapped handler completes with any 2xx status, each pattern is
/// resolved against the request and deleted in a detached task. Invalidation
/// errors are logged, never surfaced.
///
/// Known quirk, preserved on purpose: "status in 2xx" is the sole trigger, so
/// a 2xx response served from the cache by [`read_through`] still fires
/// invalidation even though nothing mutated. Tests assert this behavior; fixing
/// it is left to a deliberate follow-up.
pub async fn invalidate_after(
    State(state): State<InvalidationLayerState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let resolved: Vec<String> = state
        .patterns
        .iter()
        .map(|pattern| pattern.resolve(&parts))
        .collect();

    let response = next.run(Request::from_parts(parts, body)).await;

    if response.status().is_success() {
        let service = Arc::clone(&state.service);
        tokio::spawn(async move {
            for pattern in resolved {
                if service.del_pattern(&pattern).await {
                    debug!(pattern = %pattern, "Invalidated cache pattern");
                } else {
                    warn!(pattern = %pattern, "Cache invalidation did not complete");
                }
            }
        });
    }

    response
}

/// Latency-tracking middleware.
///
/// Measures the time to produce the response and records it with the
/// [`RequestTracker`] along with method, path, status, user agent and client
/// address. Place this outermost so the measurement covers the whole pipeline.
pub async fn track_requests(
    State(tracker): State<Arc<RequestTracker>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let client_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let started = Instant::now();
    let response = next.run(req).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    tracker.record(
        &method,
        &path,
        response.status().as_u16(),
        duration_ms,
        user_agent.as_deref(),
        client_ip.as_deref(),
    );

    response
}
