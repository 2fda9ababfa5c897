//! Request middleware: API-key authorization, content-type enforcement and
//! request-id headers.

use axum::{
    extract::{Request, State},
    http::{
        header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
        Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};

use super::{ApiResponse, AppState};
use crate::error::PulseError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Hex SHA-256 digest of an API key.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()))
        .map(str::trim)
}

/// Reject requests without the configured key. A no-op when none is set.
pub async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_key_hash() else {
        return next.run(req).await;
    };

    match presented_key(req.headers()) {
        Some(key) if hash_key(key) == expected => next.run(req).await,
        Some(_) => PulseError::unauthorized("Invalid API key").into_response(),
        None => PulseError::unauthorized("API key required").into_response(),
    }
}

/// POST bodies must be JSON. Body-less POSTs pass.
pub async fn content_type_validation(req: Request, next: Next) -> Response {
    if req.method() == Method::POST {
        if let Some(content_type) = req.headers().get(CONTENT_TYPE) {
            let ct_str = content_type.to_str().unwrap_or("");
            if !ct_str.contains("application/json") {
                return (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    Json(ApiResponse::<()>::error_with_code(
                        "Content-Type must be application/json",
                        "UNSUPPORTED_MEDIA_TYPE",
                    )),
                )
                    .into_response();
            }
        }
    }
    next.run(req).await
}

/// Echo or mint `x-request-id` on every response.
pub async fn request_id_headers(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        let _ = headers.try_insert(HeaderName::from_static("x-request-id"), val);
    }
    let _ = headers.try_insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    response
}
