//! Operational Endpoints
//!
//! JSON endpoints consumed by operators and admin tooling. Authentication is
//! an upstream concern: the host's auth layer inserts an [`AdminUser`] marker
//! into request extensions for authenticated admins, and in production mode
//! its absence yields 403 on the gated endpoints - the only client-visible
//! error this subsystem produces.

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

use crate::config::Settings;
use crate::health::{DB_PROBE_DEADLINE, HealthAggregator, OverallHealth};
use crate::service::CacheService;
use crate::tracker::RequestTracker;

/// Marker inserted into request extensions by the upstream auth layer for
/// authenticated administrators.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

/// Shared state for the operational router.
#[derive(Clone)]
pub struct OpsState {
    /// Health aggregator
    pub health: Arc<HealthAggregator>,
    /// Cache service (for flush and stats)
    pub cache: Arc<CacheService>,
    /// Request tracker (for the metrics payload)
    pub tracker: Arc<RequestTracker>,
    /// Runtime settings (production gate, version string)
    pub settings: Arc<Settings>,
}

/// Build the operational router.
pub fn ops_router(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/metrics", get(metrics))
        .route("/metrics/reset", post(metrics_reset))
        .route("/cache/clear", post(cache_clear))
        .route("/cache/stats", get(cache_stats))
        .route("/system", get(system_info))
        .with_state(state)
}

/// Admin gate applied outside dev: in production the [`AdminUser`] extension
/// must be present.
fn admin_gate_passed(settings: &Settings, req: &Request) -> bool {
    !settings.production || req.extensions().get::<AdminUser>().is_some()
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Admin access required" })),
    )
        .into_response()
}

/// `GET /health` - public liveness summary; 503 unless fully healthy.
async fn health(State(state): State<OpsState>) -> Response {
    let report = state.health.report().await;

    let status_code = if report.status == OverallHealth::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": report.status,
            "timestamp": report.timestamp,
            "uptime": state.health.uptime_secs(),
            "version": state.settings.version,
        })),
    )
        .into_response()
}

/// `GET /health/detailed` - full report plus recommendations; admin outside dev.
async fn health_detailed(State(state): State<OpsState>, req: Request) -> Response {
    if !admin_gate_passed(&state.settings, &req) {
        return forbidden();
    }

    let report = state.health.report().await;
    let recommendations = state.health.recommendations();

    Json(json!({
        "status": report.status,
        "services": report.services,
        "performance": report.performance,
        "recommendations": recommendations,
        "timestamp": report.timestamp,
    }))
    .into_response()
}

/// `GET /metrics` - system, cache, database and request metrics; admin outside dev.
async fn metrics(State(state): State<OpsState>, req: Request) -> Response {
    if !admin_gate_passed(&state.settings, &req) {
        return forbidden();
    }

    let (database, cache) = tokio::join!(
        state.health.database_health(DB_PROBE_DEADLINE),
        state.cache.stats()
    );

    Json(json!({
        "system": state.health.system_metrics(),
        "cache": cache,
        "database": database,
        "requests": state.tracker.metrics(),
    }))
    .into_response()
}

/// `POST /metrics/reset` - operator-triggered reset, blocked in production.
async fn metrics_reset(State(state): State<OpsState>) -> Response {
    if state.settings.production {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Metrics reset is disabled in production" })),
        )
            .into_response();
    }

    state.health.reset_metrics();
    Json(json!({ "success": true, "message": "Metrics reset" })).into_response()
}

/// `POST /cache/clear` - flush the active backend; always admin-only.
async fn cache_clear(State(state): State<OpsState>, req: Request) -> Response {
    if req.extensions().get::<AdminUser>().is_none() {
        return forbidden();
    }

    let success = state.cache.flush().await;
    let message = if success {
        "Cache cleared"
    } else {
        "Cache flush failed; see logs"
    };

    Json(json!({
        "success": success,
        "message": message,
        "timestamp": unix_secs(),
    }))
    .into_response()
}

/// `GET /cache/stats` - active-backend statistics; admin outside dev.
async fn cache_stats(State(state): State<OpsState>, req: Request) -> Response {
    if !admin_gate_passed(&state.settings, &req) {
        return forbidden();
    }

    Json(state.cache.stats().await).into_response()
}

/// `GET /system` - system metrics plus environment; admin outside dev.
async fn system_info(State(state): State<OpsState>, req: Request) -> Response {
    if !admin_gate_passed(&state.settings, &req) {
        return forbidden();
    }

    Json(json!({
        "system": state.health.system_metrics(),
        "environment": {
            "production": state.settings.production,
            "version": state.settings.version,
        },
    }))
    .into_response()
}

fn unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
