//! Client tests against live local servers
//!
//! Refresh coordination is exercised against a small scripted server so
//! token expiry and refresh failures can be forced; the endpoint groups are
//! exercised against the real router.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use super::*;
use crate::api::build_router;
use crate::api::middleware::AppState;
use crate::config::Config;
use crate::db::{create_test_pool, migrations::run_migrations};
use crate::models::{CreatePostInput, EventInput, RegistrationStatus, UserRole};
use crate::services::{ExportFormat, RegisterInput};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<ErrorCategory>>,
}

impl RecordingReporter {
    fn count(&self, category: ErrorCategory) -> usize {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == category)
            .count()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, category: ErrorCategory, _detail: &str) {
        self.reports.lock().unwrap().push(category);
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://{}/api", addr)
}

/// Scripted server: `/api/protected` accepts only the current access
/// token, `/api/auth/refresh` issues a new one for `good-refresh`.
#[derive(Clone, Default)]
struct Script {
    access_token: Arc<Mutex<String>>,
    refresh_calls: Arc<AtomicUsize>,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "code": "UNAUTHORIZED", "message": "Token expired" } })),
    )
        .into_response()
}

async fn protected(State(script): State<Script>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {}", script.access_token.lock().unwrap());
    match headers.get("authorization").and_then(|h| h.to_str().ok()) {
        Some(value) if value == expected => Json(json!({ "ok": true })).into_response(),
        _ => unauthorized(),
    }
}

/// Like `protected`, but a stale token is only rejected after a delay
/// longer than a refresh takes
async fn slow_protected(State(script): State<Script>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {}", script.access_token.lock().unwrap());
    match headers.get("authorization").and_then(|h| h.to_str().ok()) {
        Some(value) if value == expected => Json(json!({ "ok": true })).into_response(),
        _ => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            unauthorized()
        }
    }
}

async fn refresh(State(script): State<Script>, Json(body): Json<Value>) -> Response {
    script.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    if body["refreshToken"] != "good-refresh" {
        return unauthorized();
    }
    *script.access_token.lock().unwrap() = "fresh-access".to_string();
    Json(json!({
        "accessToken": "fresh-access",
        "refreshToken": "rotated-refresh",
        "tokenType": "Bearer",
        "id": 1,
        "email": "vera@example.com",
        "fullName": "Vera",
        "role": "volunteer",
    }))
    .into_response()
}

async fn scripted_server() -> (String, Script) {
    let script = Script::default();
    *script.access_token.lock().unwrap() = "valid-access".to_string();
    let router = Router::new()
        .route("/api/protected", get(protected))
        .route("/api/slow", get(slow_protected))
        .route("/api/auth/refresh", post(refresh))
        .route(
            "/api/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": { "code": "NOT_FOUND", "message": "Event not found" } })),
                )
            }),
        )
        .route(
            "/api/boom",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .with_state(script.clone());
    (serve(router).await, script)
}

fn client_with(
    base_url: &str,
    store: MemoryTokenStore,
) -> (Arc<ApiClient>, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());
    let client = ApiClient::new(base_url, Arc::new(store))
        .unwrap()
        .with_reporter(reporter.clone());
    (Arc::new(client), reporter)
}

async fn hit_protected(client: &ApiClient) -> Result<Value, ClientError> {
    client.fetch(ApiRequest::get("/protected")).await
}

// ============================================================================
// Refresh coordination
// ============================================================================

#[tokio::test]
async fn test_valid_token_needs_no_refresh() {
    let (base_url, script) = scripted_server().await;
    let (client, _) = client_with(&base_url, MemoryTokenStore::with_tokens("valid-access", "good-refresh"));

    let body = hit_protected(&client).await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let (base_url, script) = scripted_server().await;
    let (client, reporter) = client_with(&base_url, MemoryTokenStore::with_tokens("stale", "good-refresh"));

    let requests = (0..5).map(|_| {
        let client = client.clone();
        async move { hit_protected(&client).await }
    });
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.tokens().access_token().as_deref(), Some("fresh-access"));
    assert_eq!(client.tokens().refresh_token().as_deref(), Some("rotated-refresh"));
    assert!(reporter.reports.lock().unwrap().is_empty());

    // Later requests go straight through with the new token
    hit_protected(&client).await.unwrap();
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_late_401_reuses_token_from_finished_refresh() {
    let (base_url, script) = scripted_server().await;
    let (client, reporter) = client_with(&base_url, MemoryTokenStore::with_tokens("stale", "good-refresh"));

    // The slow request is rejected after the refresh started by the others
    // has already stored a new token
    let slow = {
        let client = client.clone();
        async move { client.fetch::<Value>(ApiRequest::get("/slow")).await }
    };
    let fast = (0..3).map(|_| {
        let client = client.clone();
        async move { hit_protected(&client).await }
    });
    let (slow, fast) = tokio::join!(slow, futures::future::join_all(fast));

    assert_eq!(slow.unwrap()["ok"], true);
    assert!(fast.iter().all(|r| r.is_ok()));
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.tokens().access_token().as_deref(), Some("fresh-access"));
    assert!(reporter.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_expires_session_once() {
    let (base_url, script) = scripted_server().await;
    let (client, reporter) = client_with(&base_url, MemoryTokenStore::with_tokens("stale", "revoked"));

    let requests = (0..4).map(|_| {
        let client = client.clone();
        async move { hit_protected(&client).await }
    });
    let results = futures::future::join_all(requests).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(ClientError::SessionExpired))));
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(client.tokens().access_token().is_none());
    assert!(!client.is_logged_in());
    assert_eq!(reporter.count(ErrorCategory::SessionExpired), 1);
}

#[tokio::test]
async fn test_401_without_refresh_token_reports_not_logged_in() {
    let (base_url, script) = scripted_server().await;
    let (client, reporter) = client_with(&base_url, MemoryTokenStore::new());

    let err = hit_protected(&client).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(err.code(), Some("UNAUTHORIZED"));
    assert_eq!(reporter.count(ErrorCategory::NotLoggedIn), 1);
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_error_statuses_are_reported() {
    let (base_url, _) = scripted_server().await;
    let (client, reporter) = client_with(&base_url, MemoryTokenStore::new());

    let missing = client
        .execute(ApiRequest::get("/missing"))
        .await
        .unwrap_err();
    assert_eq!(missing.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(missing.to_string(), "Event not found (404 Not Found)");
    assert_eq!(reporter.count(ErrorCategory::NotFound), 1);

    let boom = client.execute(ApiRequest::get("/boom")).await.unwrap_err();
    assert_eq!(boom.code(), Some("HTTP_500"));
    assert_eq!(reporter.count(ErrorCategory::ServerError), 1);
}

#[tokio::test]
async fn test_unreachable_server_reports_connection_failure() {
    // Bind then drop to get a port nothing listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let (client, reporter) = client_with(&format!("http://127.0.0.1:{}/api", port), MemoryTokenStore::new());

    let err = client.events().get(1).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)));
    assert_eq!(reporter.count(ErrorCategory::ConnectionFailed), 1);
}

// ============================================================================
// Endpoint groups against the real router
// ============================================================================

async fn backend() -> (String, AppState) {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let state = AppState::new(pool, &Config::default()).unwrap();
    let router = build_router(state.clone(), "*").unwrap();
    (serve(router).await, state)
}

async fn signed_in(base_url: &str, email: &str, role: Role) -> ApiClient {
    let client = ApiClient::new(base_url, Arc::new(MemoryTokenStore::new())).unwrap();
    client
        .auth()
        .register(&RegisterInput {
            email: email.to_string(),
            password: "secret123".to_string(),
            full_name: "Test Person".to_string(),
            phone: None,
            role: Some(role),
        })
        .await
        .unwrap();
    client.auth().login(email, "secret123").await.unwrap();
    client
}

fn event_input() -> EventInput {
    let start = chrono::Utc::now() + chrono::Duration::days(2);
    EventInput {
        name: "Park cleanup".to_string(),
        description: "Picking up litter around the lake and the playground.".to_string(),
        category: Some("environment".to_string()),
        location: "City park".to_string(),
        address: None,
        start_date: start,
        end_date: start + chrono::Duration::hours(3),
        max_volunteers: Some(10),
        image_url: None,
        requirements: None,
        benefits: None,
        contact_info: None,
    }
}

#[tokio::test]
async fn test_login_profile_and_logout() {
    let (base_url, _) = backend().await;
    let client = signed_in(&base_url, "vera@example.com", UserRole::Volunteer).await;
    assert!(client.is_logged_in());

    let me = client.auth().me().await.unwrap();
    assert_eq!(me.email, "vera@example.com");
    assert!(me.role.allows(&[Role::Volunteer, Role::Organizer]));
    assert!(!me.role.allows(&[Role::Admin]));

    client.auth().logout().await.unwrap();
    assert!(!client.is_logged_in());
    assert!(client.auth().me().await.is_err());
}

#[tokio::test]
async fn test_bad_login_is_not_refreshed() {
    let (base_url, _) = backend().await;
    let reporter = Arc::new(RecordingReporter::default());
    let client = ApiClient::new(&base_url, Arc::new(MemoryTokenStore::new()))
        .unwrap()
        .with_reporter(reporter.clone());

    let err = client
        .auth()
        .login("nobody@example.com", "whatever")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(reporter.reports.lock().unwrap().is_empty());
    assert!(!client.is_logged_in());
}

#[tokio::test]
async fn test_event_registration_and_discussion() {
    let (base_url, state) = backend().await;
    state
        .auth_service
        .seed_admin("admin@volunteerhub.local", "secret123")
        .await
        .unwrap();
    let admin = ApiClient::new(&base_url, Arc::new(MemoryTokenStore::new())).unwrap();
    admin
        .auth()
        .login("admin@volunteerhub.local", "secret123")
        .await
        .unwrap();
    let organizer = signed_in(&base_url, "olga@example.com", UserRole::Organizer).await;
    let volunteer = signed_in(&base_url, "vera@example.com", UserRole::Volunteer).await;

    let event = organizer.events().create(&event_input()).await.unwrap();
    admin.events().approve(event.id).await.unwrap();

    let listed = volunteer.events().list(&EventQuery::default()).await.unwrap();
    assert_eq!(listed.total, 1);

    let registration = volunteer
        .registrations()
        .register(event.id, Some("Bringing gloves"))
        .await
        .unwrap();
    assert_eq!(registration.status, RegistrationStatus::Pending);

    let approved = organizer
        .registrations()
        .approve(event.id, registration.id)
        .await
        .unwrap();
    assert_eq!(approved.status, RegistrationStatus::Approved);
    assert_eq!(volunteer.notifications().unread_count().await.unwrap(), 1);

    let post = volunteer
        .posts()
        .create(
            event.id,
            &CreatePostInput {
                content: "See everyone Saturday".to_string(),
                image_url: None,
            },
        )
        .await
        .unwrap();
    organizer.posts().comment(post.id, "Thanks!").await.unwrap();
    let liked = organizer.posts().like(post.id).await.unwrap();
    assert_eq!(liked.likes_count, 1);
    assert_eq!(volunteer.posts().comments(post.id).await.unwrap().len(), 1);

    let csv = admin.admin().export_users(ExportFormat::Csv).await.unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.contains("vera@example.com"));

    // Volunteers may not read the admin surface
    let denied = volunteer.admin().dashboard().await.unwrap_err();
    assert_eq!(denied.status(), Some(StatusCode::FORBIDDEN));
}
