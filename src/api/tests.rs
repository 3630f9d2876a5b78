//! End-to-end tests of the HTTP surface over an in-memory database

use axum::extract::connect_info::MockConnectInfo;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;

use super::{build_router, AppState};
use crate::config::Config;
use crate::db::{create_test_pool, migrations::run_migrations};

const PASSWORD: &str = "secret123";

async fn test_server() -> (TestServer, AppState) {
    test_server_with(&Config::default()).await
}

/// Every request appears to come from the same peer, as with one client
/// connecting directly
async fn test_server_with(config: &Config) -> (TestServer, AppState) {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let state = AppState::new(pool, config).unwrap();
    let router = build_router(state.clone(), "*")
        .unwrap()
        .layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 50], 51000))));
    (TestServer::new(router).unwrap(), state)
}

/// Failed login for an unknown account, optionally behind a proxy header
async fn failed_login(server: &TestServer, n: usize, forwarded_for: Option<&str>) -> axum_test::TestResponse {
    let mut request = server
        .post("/api/auth/login")
        .json(&json!({ "email": format!("nobody{}@example.com", n), "password": PASSWORD }));
    if let Some(ip) = forwarded_for {
        request = request.add_header("x-forwarded-for", ip);
    }
    request.await
}

async fn login(server: &TestServer, email: &str) -> Value {
    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": PASSWORD }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

/// Register an account and return its access token
async fn sign_up(server: &TestServer, email: &str, role: &str) -> String {
    server
        .post("/api/auth/register")
        .json(&json!({
            "email": email,
            "password": PASSWORD,
            "fullName": "Test Person",
            "role": role,
        }))
        .await
        .assert_status(StatusCode::CREATED);
    login(server, email).await["accessToken"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn admin_token(server: &TestServer, state: &AppState) -> String {
    state
        .auth_service
        .seed_admin("admin@volunteerhub.local", PASSWORD)
        .await
        .unwrap();
    login(server, "admin@volunteerhub.local").await["accessToken"]
        .as_str()
        .unwrap()
        .to_string()
}

fn event_body(name: &str, max_volunteers: Option<i32>) -> Value {
    let start = Utc::now() + Duration::days(3);
    json!({
        "name": name,
        "description": "Cleaning the river bank with the neighbourhood.",
        "category": "environment",
        "location": "Riverside park",
        "startDate": start.to_rfc3339(),
        "endDate": (start + Duration::hours(4)).to_rfc3339(),
        "maxVolunteers": max_volunteers,
    })
}

/// Create an event as the organizer and approve it as admin
async fn approved_event(server: &TestServer, organizer: &str, admin: &str, max: Option<i32>) -> i64 {
    let created = server
        .post("/api/events")
        .authorization_bearer(organizer)
        .json(&event_body("River cleanup", max))
        .await;
    created.assert_status(StatusCode::CREATED);
    let id = created.json::<Value>()["id"].as_i64().unwrap();

    server
        .post(&format!("/api/events/{}/approve", id))
        .authorization_bearer(admin)
        .await
        .assert_status_ok();
    id
}

async fn register_for(server: &TestServer, token: &str, event_id: i64) -> i64 {
    let response = server
        .post(&format!("/api/events/{}/register", event_id))
        .authorization_bearer(token)
        .json(&json!({ "note": "Happy to help" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let (server, _) = test_server().await;
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let (server, _) = test_server().await;
    let token = sign_up(&server, "Vera@Example.com", "volunteer").await;

    let me = server.get("/api/auth/me").authorization_bearer(&token).await;
    me.assert_status_ok();
    let profile = me.json::<Value>();
    assert_eq!(profile["email"], "vera@example.com");
    assert_eq!(profile["role"], "volunteer");
    assert!(profile.get("passwordHash").is_none());

    let updated = server
        .put("/api/auth/me")
        .authorization_bearer(&token)
        .json(&json!({ "fullName": "Vera V", "bio": "Weekend helper" }))
        .await;
    updated.assert_status_ok();
    assert_eq!(updated.json::<Value>()["fullName"], "Vera V");
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let (server, _) = test_server().await;
    sign_up(&server, "dup@example.com", "volunteer").await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": "dup@example.com",
            "password": PASSWORD,
            "fullName": "Again",
        }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let (server, _) = test_server().await;
    sign_up(&server, "vera@example.com", "volunteer").await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "vera@example.com", "password": "wrong-one" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_protected_routes_need_token() {
    let (server, _) = test_server().await;

    for path in ["/api/auth/me", "/api/notifications", "/api/me/registrations"] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");
    }

    server
        .get("/api/auth/me")
        .authorization_bearer("not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_need_admin_role() {
    let (server, state) = test_server().await;
    let volunteer = sign_up(&server, "vera@example.com", "volunteer").await;

    server
        .get("/api/admin/users")
        .authorization_bearer(&volunteer)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let admin = admin_token(&server, &state).await;
    server
        .get("/api/admin/users")
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let (server, _) = test_server().await;
    sign_up(&server, "vera@example.com", "volunteer").await;
    let first = login(&server, "vera@example.com").await["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();

    let rotated = server
        .post("/api/auth/refresh")
        .json(&json!({ "refreshToken": first }))
        .await;
    rotated.assert_status_ok();
    let second = rotated.json::<Value>()["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first, second);

    // The old token was revoked by the rotation
    server
        .post("/api/auth/refresh")
        .json(&json!({ "refreshToken": first }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/auth/logout")
        .json(&json!({ "refreshToken": second }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .post("/api/auth/refresh")
        .json(&json!({ "refreshToken": second }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_limited_per_peer_address() {
    let (server, _state) = test_server().await;

    for n in 0..10 {
        failed_login(&server, n, None)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    let limited = failed_login(&server, 10, None).await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body = limited.json::<Value>();
    assert_eq!(body["error"]["code"], "RATE_LIMIT");
    assert!(body["error"]["details"]["retry_after"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_forwarded_header_ignored_by_default() {
    let (server, _state) = test_server().await;

    for n in 0..10 {
        let forwarded = format!("198.51.100.{}", n);
        failed_login(&server, n, Some(&forwarded))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    failed_login(&server, 10, Some("198.51.100.99"))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_header_trusted_when_configured() {
    let mut config = Config::default();
    config.server.trust_proxy_headers = true;
    let (server, _state) = test_server_with(&config).await;

    for n in 0..11 {
        let forwarded = format!("198.51.100.{}", n);
        failed_login(&server, n, Some(&forwarded))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    // Without the header the peer address is used
    for n in 11..21 {
        failed_login(&server, n, None).await;
    }
    failed_login(&server, 21, None)
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_locked_user_is_rejected() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    let volunteer = sign_up(&server, "vera@example.com", "volunteer").await;
    let id = server
        .get("/api/auth/me")
        .authorization_bearer(&volunteer)
        .await
        .json::<Value>()["id"]
        .as_i64()
        .unwrap();

    server
        .post(&format!("/api/admin/users/{}/lock", id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();

    let response = server
        .get("/api/auth/me")
        .authorization_bearer(&volunteer)
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "USER_LOCKED");

    let relogin = server
        .post("/api/auth/login")
        .json(&json!({ "email": "vera@example.com", "password": PASSWORD }))
        .await;
    relogin.assert_status(StatusCode::FORBIDDEN);

    server
        .post(&format!("/api/admin/users/{}/unlock", id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
    server
        .get("/api/auth/me")
        .authorization_bearer(&volunteer)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_event_visibility() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    let organizer = sign_up(&server, "olga@example.com", "organizer").await;

    let pending = server
        .post("/api/events")
        .authorization_bearer(&organizer)
        .json(&event_body("Food bank shift", None))
        .await;
    pending.assert_status(StatusCode::CREATED);
    assert_eq!(pending.json::<Value>()["status"], "pending");
    approved_event(&server, &organizer, &admin, None).await;

    // Anonymous callers only see approved events
    let public = server.get("/api/events").await.json::<Value>();
    assert_eq!(public["total"], 1);

    let mine = server
        .get("/api/events?status=pending")
        .authorization_bearer(&organizer)
        .await
        .json::<Value>();
    assert_eq!(mine["total"], 1);

    let everything = server
        .get("/api/events?status=pending")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(everything["total"], 1);
}

#[tokio::test]
async fn test_volunteer_cannot_create_event() {
    let (server, _) = test_server().await;
    let volunteer = sign_up(&server, "vera@example.com", "volunteer").await;

    server
        .post("/api/events")
        .authorization_bearer(&volunteer)
        .json(&event_body("Food bank shift", None))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_event_transition_conflicts() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    let organizer = sign_up(&server, "olga@example.com", "organizer").await;
    let id = approved_event(&server, &organizer, &admin, None).await;

    // Approving twice is not a valid transition
    let response = server
        .post(&format!("/api/events/{}/approve", id))
        .authorization_bearer(&admin)
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_flow_and_capacity() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    let organizer = sign_up(&server, "olga@example.com", "organizer").await;
    let vera = sign_up(&server, "vera@example.com", "volunteer").await;
    let vic = sign_up(&server, "vic@example.com", "volunteer").await;
    let event_id = approved_event(&server, &organizer, &admin, Some(1)).await;

    let first = register_for(&server, &vera, event_id).await;
    let second = register_for(&server, &vic, event_id).await;

    // Second sign-up by the same volunteer
    server
        .post(&format!("/api/events/{}/register", event_id))
        .authorization_bearer(&vera)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::CONFLICT);

    let listed = server
        .get(&format!("/api/events/{}/registrations", event_id))
        .authorization_bearer(&organizer)
        .await;
    listed.assert_status_ok();
    assert_eq!(listed.json::<Value>().as_array().unwrap().len(), 2);

    let approved = server
        .post(&format!("/api/events/{}/registrations/{}/approve", event_id, first))
        .authorization_bearer(&organizer)
        .await;
    approved.assert_status_ok();
    assert_eq!(approved.json::<Value>()["status"], "approved");

    // The only seat is taken
    server
        .post(&format!("/api/events/{}/registrations/{}/approve", event_id, second))
        .authorization_bearer(&organizer)
        .await
        .assert_status(StatusCode::CONFLICT);

    let event = server
        .get(&format!("/api/events/{}", event_id))
        .await
        .json::<Value>();
    assert_eq!(event["currentVolunteers"], 1);

    // Vera is told about the approval
    let unread = server
        .get("/api/notifications/unread-count")
        .authorization_bearer(&vera)
        .await
        .json::<Value>();
    assert_eq!(unread["count"], 1);

    let mine = server
        .get("/api/me/registrations")
        .authorization_bearer(&vera)
        .await
        .json::<Value>();
    assert_eq!(mine[0]["status"], "approved");

    // Cancelling frees the seat for the next volunteer
    server
        .post(&format!("/api/events/{}/registrations/{}/cancel", event_id, first))
        .authorization_bearer(&vera)
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/events/{}/registrations/{}/approve", event_id, second))
        .authorization_bearer(&organizer)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_only_participants_post() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    let organizer = sign_up(&server, "olga@example.com", "organizer").await;
    let vera = sign_up(&server, "vera@example.com", "volunteer").await;
    let event_id = approved_event(&server, &organizer, &admin, None).await;
    let posts = format!("/api/events/{}/posts", event_id);

    let outsider = server
        .post(&posts)
        .authorization_bearer(&vera)
        .json(&json!({ "content": "Can I join?" }))
        .await;
    outsider.assert_status(StatusCode::FORBIDDEN);

    let registration = register_for(&server, &vera, event_id).await;
    server
        .post(&format!(
            "/api/events/{}/registrations/{}/approve",
            event_id, registration
        ))
        .authorization_bearer(&organizer)
        .await
        .assert_status_ok();

    let post = server
        .post(&posts)
        .authorization_bearer(&vera)
        .json(&json!({ "content": "See you there!" }))
        .await;
    post.assert_status(StatusCode::CREATED);
    let post_id = post.json::<Value>()["id"].as_i64().unwrap();

    let liked = server
        .post(&format!("/api/posts/{}/likes", post_id))
        .authorization_bearer(&organizer)
        .await
        .json::<Value>();
    assert_eq!(liked["changed"], true);
    assert_eq!(liked["likesCount"], 1);

    server
        .post(&format!("/api/posts/{}/comments", post_id))
        .authorization_bearer(&organizer)
        .json(&json!({ "content": "Welcome aboard" }))
        .await
        .assert_status(StatusCode::CREATED);

    let page = server
        .get(&posts)
        .authorization_bearer(&vera)
        .await
        .json::<Value>();
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["commentsCount"], 1);
}

#[tokio::test]
async fn test_paged_envelope() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    for i in 0..3 {
        sign_up(&server, &format!("user{}@example.com", i), "volunteer").await;
    }

    let page = server
        .get("/api/admin/users?page=2&size=2")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(page["total"], 4);
    assert_eq!(page["page"], 2);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["hasNext"], false);
    assert_eq!(page["hasPrev"], true);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_export_download() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    sign_up(&server, "vera@example.com", "volunteer").await;

    let csv = server
        .get("/api/admin/export/users?format=csv")
        .authorization_bearer(&admin)
        .await;
    csv.assert_status_ok();
    assert_eq!(
        csv.header("content-disposition"),
        "attachment; filename=users.csv"
    );
    assert!(csv.text().contains("vera@example.com"));

    let json = server
        .get("/api/admin/export/events?format=json")
        .authorization_bearer(&admin)
        .await;
    json.assert_status_ok();
    assert_eq!(
        json.header("content-disposition"),
        "attachment; filename=events.json"
    );

    server
        .get("/api/admin/export/users?format=xml")
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_notify_and_dashboard() {
    let (server, state) = test_server().await;
    let admin = admin_token(&server, &state).await;
    let vera = sign_up(&server, "vera@example.com", "volunteer").await;
    let vera_id = server
        .get("/api/auth/me")
        .authorization_bearer(&vera)
        .await
        .json::<Value>()["id"]
        .as_i64()
        .unwrap();

    server
        .post("/api/admin/notify")
        .authorization_bearer(&admin)
        .json(&json!({ "userId": vera_id, "title": "Welcome", "message": "Glad you joined" }))
        .await
        .assert_status(StatusCode::CREATED);

    let inbox = server
        .get("/api/notifications")
        .authorization_bearer(&vera)
        .await
        .json::<Value>();
    assert_eq!(inbox["total"], 1);
    assert_eq!(inbox["data"][0]["title"], "Welcome");

    let dashboard = server
        .get("/api/admin/dashboard")
        .authorization_bearer(&admin)
        .await;
    dashboard.assert_status_ok();
    let body = dashboard.json::<Value>();
    assert_eq!(body["totalUsers"], 2);
    assert!(body["requests"]["totalRequests"].as_u64().unwrap() > 0);

    let audits = server
        .get("/api/admin/audits?action=admin:notify_user")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(audits["total"], 1);
}

#[tokio::test]
async fn test_vapid_key_requires_configuration() {
    let (server, _) = test_server().await;
    let response = server.get("/api/push/vapidPublicKey").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}
