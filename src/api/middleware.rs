//! API middleware
//!
//! Contains:
//! - Shared application state and its wiring
//! - The JSON error envelope and service error mapping
//! - Authentication (bearer access token validation)
//! - Authorization (admin gate)
//! - Request statistics

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAuditRepository, SqlxEventRepository, SqlxNotificationRepository, SqlxPostRepository,
    SqlxPushSubscriptionRepository, SqlxRefreshTokenRepository, SqlxRegistrationRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AdminService, AdminServiceError, AuditService, AuthService, AuthServiceError, EventService,
    EventServiceError, LoginRateLimiter, NotificationService, NotificationServiceError,
    PostService, PostServiceError, RegistrationService, RegistrationServiceError, TokenService,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Summed response time in microseconds
    total_response_time_us: AtomicU64,
    server_errors: AtomicU64,
    start_time: Instant,
}

/// Point-in-time view of [`RequestStats`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatsSnapshot {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub server_errors: u64,
    pub avg_response_time_ms: f64,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64, status: StatusCode) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
        if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> RequestStatsSnapshot {
        RequestStatsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            total_requests: self.total_requests(),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            avg_response_time_ms: self.avg_response_time_us() / 1000.0,
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub auth_service: Arc<AuthService>,
    pub event_service: Arc<EventService>,
    pub registration_service: Arc<RegistrationService>,
    pub post_service: Arc<PostService>,
    pub notification_service: Arc<NotificationService>,
    pub admin_service: Arc<AdminService>,
    pub request_stats: Arc<RequestStats>,
    /// Whether proxy headers name the client, see [`ClientAddr`]
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(pool: DynDatabasePool, config: &Config) -> anyhow::Result<Self> {
        let users = SqlxUserRepository::boxed(pool.clone());
        let refresh_tokens = SqlxRefreshTokenRepository::boxed(pool.clone());
        let events = SqlxEventRepository::boxed(pool.clone());
        let registrations = SqlxRegistrationRepository::boxed(pool.clone());

        let tokens = Arc::new(TokenService::new(&config.auth)?);
        let auth_service = Arc::new(AuthService::new(
            users.clone(),
            refresh_tokens.clone(),
            tokens,
            Arc::new(LoginRateLimiter::new()),
        ));

        let notification_service = Arc::new(NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            SqlxPushSubscriptionRepository::boxed(pool.clone()),
            &config.push,
        ));
        let audit = Arc::new(AuditService::new(SqlxAuditRepository::boxed(pool.clone())));

        let event_service = Arc::new(EventService::new(
            events.clone(),
            create_cache(&config.cache),
            notification_service.clone(),
            audit.clone(),
        ));
        let registration_service = Arc::new(RegistrationService::new(
            registrations.clone(),
            event_service.clone(),
            notification_service.clone(),
            audit.clone(),
        ));
        let post_service = Arc::new(PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            registrations.clone(),
            event_service.clone(),
        ));
        let admin_service = Arc::new(AdminService::new(
            users,
            refresh_tokens,
            events,
            registrations,
            notification_service.clone(),
            audit,
        ));

        Ok(Self {
            pool,
            auth_service,
            event_service,
            registration_service,
            post_service,
            notification_service,
            admin_service,
            request_stats: Arc::new(RequestStats::new()),
            trust_proxy_headers: config.server.trust_proxy_headers,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn user_locked() -> Self {
        Self::new("USER_LOCKED", "Account is locked")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(retry_after: i64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            "Too many attempts, please try again later",
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    /// Logs the cause; the client only sees a generic message
    pub fn internal_error(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_LOCKED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "BAD_REQUEST" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::ValidationError(msg) => Self::validation_error(msg),
            AuthServiceError::EmailInUse => Self::conflict(err.to_string()),
            AuthServiceError::InvalidCredentials
            | AuthServiceError::InvalidRefreshToken
            | AuthServiceError::RefreshTokenExpired => Self::unauthorized(err.to_string()),
            AuthServiceError::Unauthorized(msg) => Self::unauthorized(msg),
            AuthServiceError::UserLocked => Self::user_locked(),
            AuthServiceError::RateLimited { retry_after } => Self::rate_limited(retry_after),
            AuthServiceError::NotFound => Self::not_found("User not found"),
            AuthServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<EventServiceError> for ApiError {
    fn from(err: EventServiceError) -> Self {
        match err {
            EventServiceError::NotFound => Self::not_found("Event not found"),
            EventServiceError::Forbidden(msg) => Self::forbidden(msg),
            EventServiceError::ValidationError(msg) => Self::validation_error(msg),
            EventServiceError::InvalidTransition(msg) => Self::conflict(msg),
            EventServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<RegistrationServiceError> for ApiError {
    fn from(err: RegistrationServiceError) -> Self {
        match err {
            RegistrationServiceError::NotFound(msg) => Self::not_found(msg),
            RegistrationServiceError::Forbidden(msg) => Self::forbidden(msg),
            RegistrationServiceError::InvalidState(msg) => Self::bad_request(msg),
            RegistrationServiceError::AlreadyRegistered
            | RegistrationServiceError::EventFull
            | RegistrationServiceError::Conflict => Self::conflict(err.to_string()),
            RegistrationServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(msg) => Self::not_found(msg),
            PostServiceError::NotParticipant => Self::forbidden(err.to_string()),
            PostServiceError::Forbidden(msg) => Self::forbidden(msg),
            PostServiceError::ValidationError(msg) => Self::validation_error(msg),
            PostServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(err: NotificationServiceError) -> Self {
        match err {
            NotificationServiceError::NotFound => Self::not_found("Notification not found"),
            NotificationServiceError::Forbidden => {
                Self::forbidden("Not allowed to access this notification")
            }
            NotificationServiceError::ValidationError(msg) => Self::validation_error(msg),
            NotificationServiceError::PushNotConfigured => {
                Self::new("INTERNAL_ERROR", "Push notifications are not configured")
            }
            NotificationServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<AdminServiceError> for ApiError {
    fn from(err: AdminServiceError) -> Self {
        match err {
            AdminServiceError::NotFound => Self::not_found(err.to_string()),
            AdminServiceError::Forbidden(msg) => Self::forbidden(msg),
            AdminServiceError::ValidationError(msg) => Self::validation_error(msg),
            AdminServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// The caller when a valid token was sent, for public routes
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
        ))
    }
}

/// Bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Client address from proxy headers
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Address of the caller.
///
/// The peer address of the connection, unless the server is configured to
/// trust proxy headers and one is present. `None` only when the server runs
/// without connection info.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_proxy_headers {
            if let Some(ip) = forwarded_ip(&parts.headers) {
                return Ok(ClientAddr(Some(ip)));
            }
        }
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientAddr(peer))
    }
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?
        .to_string();

    let user = state.auth_service.authenticate(&token).await?;
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware; invalid tokens are ignored
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(request.headers()).map(str::to_string) {
        if let Ok(user) = state.auth_service.authenticate(&token).await {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(duration_us, response.status());
    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        let headers = headers_with("authorization", "Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_token_rejects_other_schemes() {
        assert!(extract_bearer_token(&headers_with("authorization", "Basic Zm9v")).is_none());
        assert!(extract_bearer_token(&headers_with("authorization", "Bearer   ")).is_none());
        assert!(extract_bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_forwarded_ip() {
        let forwarded = headers_with("x-forwarded-for", "203.0.113.7, 10.0.0.1");
        assert_eq!(forwarded_ip(&forwarded), "203.0.113.7".parse().ok());

        let real = headers_with("x-real-ip", "198.51.100.2");
        assert_eq!(forwarded_ip(&real), "198.51.100.2".parse().ok());

        assert!(forwarded_ip(&headers_with("x-real-ip", "not-an-ip")).is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::user_locked(), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::rate_limited(60), StatusCode::TOO_MANY_REQUESTS),
            (ApiError::new("SOMETHING_ELSE", "x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error.error.code);
        }
    }

    #[test]
    fn test_rate_limit_details() {
        let error = ApiError::rate_limited(42);
        assert_eq!(error.error.details, Some(serde_json::json!({"retry_after": 42})));
    }

    #[test]
    fn test_service_errors_map_to_codes() {
        assert_eq!(ApiError::from(AuthServiceError::EmailInUse).error.code, "CONFLICT");
        assert_eq!(ApiError::from(AuthServiceError::UserLocked).error.code, "USER_LOCKED");
        assert_eq!(
            ApiError::from(RegistrationServiceError::EventFull).error.message,
            "Event is full"
        );
        assert_eq!(
            ApiError::from(PostServiceError::NotParticipant).error.code,
            "FORBIDDEN"
        );
        assert_eq!(
            ApiError::from(EventServiceError::InvalidTransition("x".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error = ApiError::internal_error(anyhow::anyhow!("db password is hunter2"));
        assert_eq!(error.error.message, "Internal server error");
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        stats.record(1000, StatusCode::OK);
        stats.record(3000, StatusCode::INTERNAL_SERVER_ERROR);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.server_errors, 1);
        assert!((snapshot.avg_response_time_ms - 2.0).abs() < f64::EPSILON);
    }
}
