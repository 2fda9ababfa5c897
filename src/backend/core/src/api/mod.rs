//! REST surface for CoursePulse.
//!
//! Unversioned:
//! - `GET /health`
//! - `GET /metrics` (Prometheus text format)
//!
//! Under `/api/v1` (API key required when one is configured):
//! - `GET  /courses/:id/stats`
//! - `GET  /courses?instructor=<id>`
//! - `GET  /users/:user_id/courses/:course_id/progress`
//! - `GET  /overview`
//! - `POST /events`
//! - `POST /cache/flush`
//! - `GET  /cache/stats`
//! - `GET  /cache/invalidations?limit=<n>`

mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::events::EventBus;
use crate::invalidation::InvalidationTriggers;
use crate::stats::StatsService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub stats: StatsService,
    pub bus: EventBus,
    pub triggers: Arc<InvalidationTriggers>,
    pub metrics: Option<PrometheusHandle>,
    api_key_hash: Option<Arc<str>>,
}

impl AppState {
    pub fn new(stats: StatsService, bus: EventBus, triggers: Arc<InvalidationTriggers>) -> Self {
        Self {
            stats,
            bus,
            triggers,
            metrics: None,
            api_key_hash: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Require `key` on every `/api/v1` route. Only its digest is kept.
    pub fn with_api_key(mut self, key: Option<&str>) -> Self {
        self.api_key_hash = key
            .filter(|k| !k.is_empty())
            .map(|k| Arc::from(middleware::hash_key(k)));
        self
    }

    pub(crate) fn api_key_hash(&self) -> Option<&str> {
        self.api_key_hash.as_deref()
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1_router(state.clone()))
        .layer(axum_middleware::from_fn(middleware::request_id_headers))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/courses", get(handlers::list_courses))
        .route("/courses/:id/stats", get(handlers::course_stats))
        .route(
            "/users/:user_id/courses/:course_id/progress",
            get(handlers::user_progress),
        )
        .route("/overview", get(handlers::overview))
        .route("/events", post(handlers::publish_event))
        .route("/cache/flush", post(handlers::flush_cache))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/invalidations", get(handlers::recent_invalidations))
        .layer(axum_middleware::from_fn(middleware::content_type_validation))
        .layer(axum_middleware::from_fn_with_state(state, middleware::require_api_key))
}

/// Route constants for clients and documentation.
pub mod paths {
    pub const HEALTH: &str = "/health";
    pub const METRICS: &str = "/metrics";
    pub const COURSES: &str = "/api/v1/courses";
    pub const OVERVIEW: &str = "/api/v1/overview";
    pub const EVENTS: &str = "/api/v1/events";
    pub const CACHE_FLUSH: &str = "/api/v1/cache/flush";
    pub const CACHE_STATS: &str = "/api/v1/cache/stats";
    pub const CACHE_INVALIDATIONS: &str = "/api/v1/cache/invalidations";

    pub fn course_stats(course_id: i64) -> String {
        format!("{}/{}/stats", COURSES, course_id)
    }

    pub fn user_progress(user_id: i64, course_id: i64) -> String {
        format!("/api/v1/users/{}/courses/{}/progress", user_id, course_id)
    }
}

/// API response wrapper.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn error_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_code: Some(code.into()),
        }
    }
}
