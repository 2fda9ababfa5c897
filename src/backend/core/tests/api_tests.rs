//! Route tests for the REST surface, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use coursepulse_core::api::{build_router, paths, AppState};
use coursepulse_core::cache::Cache;
use coursepulse_core::events::EventBus;
use coursepulse_core::invalidation::InvalidationTriggers;
use coursepulse_core::stats::{CourseId, InMemoryStore, StatsService, StoreOp, UserId};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
}

fn app_with_key(api_key: Option<&str>) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    store.add_user(UserId(1), "Ada");
    store.add_course(CourseId(42), "Compilers", UserId(1));
    store.add_course(CourseId(43), "Databases", UserId(2));
    for user in 101..=110 {
        store.enroll(UserId(user), CourseId(42));
    }
    for user in 101..=104 {
        store.complete_course(UserId(user), CourseId(42));
    }

    let stats = StatsService::new(Cache::in_memory(1_000), store.clone());
    let bus = EventBus::new();
    let triggers = Arc::new(InvalidationTriggers::new(&stats));
    let _ = triggers.register(&bus);

    let state = AppState::new(stats, bus, triggers).with_api_key(api_key);
    TestApp {
        router: build_router(state),
        store,
    }
}

fn app() -> TestApp {
    app_with_key(None)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app.router, get(paths::HEALTH)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["store"]["status"], "healthy");
}

#[tokio::test]
async fn test_course_stats() {
    let app = app();
    let (status, body) = send(&app.router, get(&paths::course_stats(42))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["student_count"], 10);
    assert_eq!(body["data"]["completed_students"], 4);
    assert_eq!(body["data"]["completion_rate"], 40.0);
}

#[tokio::test]
async fn test_unknown_course_is_404() {
    let app = app();
    let (status, body) = send(&app.router, get(&paths::course_stats(999))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "COURSE_NOT_FOUND");
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let app = app();
    app.store.fail(StoreOp::FindCourse);

    let (status, body) = send(&app.router, get(&paths::course_stats(42))).await;
    assert!(status.is_server_error());
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_course_list_partitions() {
    let app = app();

    let (status, body) = send(&app.router, get(paths::COURSES)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = send(&app.router, get(&format!("{}?instructor=2", paths::COURSES))).await;
    let courses = body["data"].as_array().unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["id"], 43);
}

#[tokio::test]
async fn test_user_progress_and_overview() {
    let app = app();

    let (status, body) = send(&app.router, get(&paths::user_progress(101, 42))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], 101);
    assert_eq!(body["data"]["course_id"], 42);

    let (status, body) = send(&app.router, get(paths::OVERVIEW)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_courses"], 2);
    assert_eq!(body["data"]["total_enrollments"], 10);
}

#[tokio::test]
async fn test_event_invalidates_before_responding() {
    let app = app();
    send(&app.router, get(&paths::course_stats(42))).await;

    app.store.enroll(UserId(111), CourseId(42));
    let (status, body) = send(
        &app.router,
        post_json(
            paths::EVENTS,
            json!({"event": "user_enrolled", "user_id": 111, "course_id": 42}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["event"], "user_enrolled");
    assert_eq!(body["data"]["handlers"], 1);

    let (_, body) = send(&app.router, get(&paths::course_stats(42))).await;
    assert_eq!(body["data"]["student_count"], 11);
    assert_eq!(body["data"]["completion_rate"], 36.4);

    let (_, body) = send(&app.router, get(paths::CACHE_INVALIDATIONS)).await;
    let log = body["data"].as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["event"]["event"], "user_enrolled");
}

#[tokio::test]
async fn test_malformed_event_rejected() {
    let app = app();
    let (status, _) = send(
        &app.router,
        post_json(paths::EVENTS, json!({"event": "course_deleted", "course_id": 1})),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_cache_flush_and_stats() {
    let app = app();
    send(&app.router, get(&paths::course_stats(42))).await;

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri(paths::CACHE_FLUSH)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mode"], "prefix");

    send(&app.router, get(&paths::course_stats(42))).await;
    assert_eq!(app.store.calls(StoreOp::FindCourse), 2);

    let (status, body) = send(&app.router, get(paths::CACHE_STATS)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["backend_stats"]["namespace"], "coursepulse");
}

#[tokio::test]
async fn test_invalidation_limit_validated() {
    let app = app();
    let (status, _) = send(
        &app.router,
        get(&format!("{}?limit=0", paths::CACHE_INVALIDATIONS)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = app_with_key(Some("s3cret"));

    let (status, _) = send(&app.router, get(paths::OVERVIEW)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri(paths::OVERVIEW)
        .header("x-api-key", "guess")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = Request::builder()
        .uri(paths::OVERVIEW)
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, bearer).await;
    assert_eq!(status, StatusCode::OK);

    // health stays open
    let (status, _) = send(&app.router, get(paths::HEALTH)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_echoed() {
    let app = app();
    let request = Request::builder()
        .uri(paths::HEALTH)
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}
