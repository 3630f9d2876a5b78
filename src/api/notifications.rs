//! Notification and web push API endpoints
//!
//! - GET /api/notifications?unreadOnly=&page=&size=
//! - GET /api/notifications/unread-count
//! - POST /api/notifications/{id}/read
//! - POST /api/notifications/read-all
//! - GET /api/push/vapidPublicKey
//! - POST /api/push/subscribe
//! - POST /api/push/unsubscribe

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Notification, PushSubscription};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyResponse {
    pub public_key: String,
}

/// Body of a push subscription. `keysJson` may be a JSON string or an
/// object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys_json: serde_json::Value,
}

impl SubscribeRequest {
    fn keys_text(&self) -> String {
        match &self.keys_json {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

/// Routes nested under /api/notifications
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/{id}/read", post(mark_read))
        .route("/read-all", post(mark_all_read))
}

/// Public routes nested under /api/push
pub fn push_public_router() -> Router<AppState> {
    Router::new().route("/vapidPublicKey", get(vapid_public_key))
}

/// Protected routes nested under /api/push
pub fn push_router() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
}

/// GET /api/notifications
async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(paging): Query<PaginationQuery>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<PagedResponse<Notification>>, ApiError> {
    let page = state
        .notification_service
        .list(user.0.id, query.unread_only, &paging.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = state.notification_service.unread_count(user.0.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// POST /api/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.notification_service.mark_read(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MarkedResponse>, ApiError> {
    let updated = state.notification_service.mark_all_read(user.0.id).await?;
    Ok(Json(MarkedResponse { updated }))
}

/// GET /api/push/vapidPublicKey
async fn vapid_public_key(
    State(state): State<AppState>,
) -> Result<Json<VapidKeyResponse>, ApiError> {
    let key = state.notification_service.vapid_public_key()?;
    Ok(Json(VapidKeyResponse {
        public_key: key.to_string(),
    }))
}

/// POST /api/push/subscribe
async fn subscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<PushSubscription>), ApiError> {
    let subscription = state
        .notification_service
        .subscribe(user.0.id, &body.endpoint, &body.keys_text())
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /api/push/unsubscribe
async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UnsubscribeRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .notification_service
        .unsubscribe(user.0.id, &body.endpoint)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
