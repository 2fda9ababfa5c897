//! API request handlers.
//!
//! Handlers return `Result<impl IntoResponse, PulseError>` so errors map to
//! HTTP status codes through `PulseError`'s `IntoResponse`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiResponse, AppState};
use crate::cache::FlushMode;
use crate::error::{ErrorCode, PulseError};
use crate::events::DomainEvent;
use crate::invalidation::LOG_CAPACITY;
use crate::stats::model::{CourseId, ListPartition, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn from_result<T>(result: &crate::error::Result<T>) -> Self {
        match result {
            Ok(_) => Self {
                status: "healthy",
                error: None,
            },
            Err(e) => Self {
                status: "unhealthy",
                error: Some(e.user_message().to_string()),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Store down: 503. Cache down: degraded, still 200 since reads fall through.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = ComponentHealth::from_result(&state.stats.store().ping().await);
    let cache = ComponentHealth::from_result(&state.stats.cache().stats().await);

    let (status_code, status) = match (store.is_healthy(), cache.is_healthy()) {
        (true, true) => (StatusCode::OK, "healthy"),
        (true, false) => (StatusCode::OK, "degraded"),
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "components": {
                "store": store,
                "cache": cache,
            }
        })),
    )
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn course_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, PulseError> {
    let snapshot = state
        .stats
        .course_stats(CourseId(id))
        .await?
        .ok_or_else(|| PulseError::course_not_found(id))?;

    Ok(Json(ApiResponse::success(snapshot)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub instructor: Option<i64>,
}

impl ListQuery {
    fn partition(&self) -> ListPartition {
        match self.instructor {
            Some(id) => ListPartition::Instructor(UserId(id)),
            None => ListPartition::Admin,
        }
    }
}

pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, PulseError> {
    let courses = state.stats.course_list(query.partition()).await?;
    Ok(Json(ApiResponse::success(courses)))
}

pub async fn user_progress(
    State(state): State<AppState>,
    Path((user_id, course_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, PulseError> {
    let progress = state
        .stats
        .user_progress(UserId(user_id), CourseId(course_id))
        .await?;
    Ok(Json(ApiResponse::success(progress)))
}

pub async fn overview(State(state): State<AppState>) -> Result<impl IntoResponse, PulseError> {
    let overview = state.stats.overview().await?;
    Ok(Json(ApiResponse::success(overview)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Events & Cache Administration
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct EventAccepted {
    pub event: String,
    pub handlers: usize,
}

/// Dispatch an event; invalidations have run by the time this responds.
pub async fn publish_event(
    State(state): State<AppState>,
    Json(event): Json<DomainEvent>,
) -> Result<impl IntoResponse, PulseError> {
    let handlers = state.bus.dispatch(&event).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(EventAccepted {
            event: event.kind().to_string(),
            handlers,
        })),
    ))
}

pub async fn flush_cache(State(state): State<AppState>) -> Result<impl IntoResponse, PulseError> {
    let mode = state.stats.cache().flush_all().await;
    if mode == FlushMode::Failed {
        return Err(PulseError::new(ErrorCode::CacheError, "Cache flush failed"));
    }

    info!(mode = mode.as_str(), "Cache flushed via API");
    Ok(Json(ApiResponse::success(serde_json::json!({ "mode": mode }))))
}

pub async fn cache_stats(State(state): State<AppState>) -> Result<impl IntoResponse, PulseError> {
    let stats = state.stats.cache().stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

pub async fn recent_invalidations(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, PulseError> {
    let limit = query.limit.unwrap_or(50);
    if limit == 0 || limit > LOG_CAPACITY {
        return Err(PulseError::validation(format!(
            "limit must be between 1 and {}",
            LOG_CAPACITY
        )));
    }

    Ok(Json(ApiResponse::success(state.triggers.log().recent(limit))))
}
