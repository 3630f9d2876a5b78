//! Registration API endpoints
//!
//! - POST /api/events/{id}/register - Sign up (volunteer)
//! - GET /api/events/{id}/my-registration - Caller's registration
//! - GET /api/events/{id}/registrations - All registrations (owner/admin)
//! - POST /api/events/{eid}/registrations/{rid}/cancel - Withdraw (volunteer)
//! - POST /api/events/{eid}/registrations/{rid}/approve|reject|complete - Review
//! - GET /api/me/registrations - Caller's registrations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Registration;

/// Body of a sign-up
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// Body of a rejection
#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `?present=&note=` of a completion
#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    #[serde(default = "default_present")]
    pub present: bool,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_present() -> bool {
    true
}

/// Routes nested under /api/events (all require authentication)
pub fn event_router() -> Router<AppState> {
    Router::new()
        .route("/{id}/register", post(register))
        .route("/{id}/my-registration", get(my_registration))
        .route("/{id}/registrations", get(list_for_event))
        .route("/{id}/registrations/{rid}/cancel", post(cancel))
        .route("/{id}/registrations/{rid}/approve", post(approve))
        .route("/{id}/registrations/{rid}/reject", post(reject))
        .route("/{id}/registrations/{rid}/complete", post(complete))
}

/// Routes nested under /api/me
pub fn me_router() -> Router<AppState> {
    Router::new().route("/registrations", get(list_mine))
}

/// POST /api/events/{id}/register
async fn register(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(event_id): Path<i64>,
    body: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let note = body.and_then(|Json(b)| b.note);
    let registration = state
        .registration_service
        .register(&user.0, event_id, note)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// GET /api/events/{id}/my-registration
async fn my_registration(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Registration>, ApiError> {
    Ok(Json(
        state
            .registration_service
            .my_registration(&user.0, event_id)
            .await?,
    ))
}

/// GET /api/events/{id}/registrations
async fn list_for_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Vec<Registration>>, ApiError> {
    Ok(Json(
        state
            .registration_service
            .list_for_event(&user.0, event_id)
            .await?,
    ))
}

/// GET /api/me/registrations
async fn list_mine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Registration>>, ApiError> {
    Ok(Json(state.registration_service.list_mine(&user.0).await?))
}

/// POST /api/events/{eid}/registrations/{rid}/cancel
async fn cancel(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((event_id, registration_id)): Path<(i64, i64)>,
) -> Result<Json<Registration>, ApiError> {
    Ok(Json(
        state
            .registration_service
            .cancel(&user.0, event_id, registration_id)
            .await?,
    ))
}

/// POST /api/events/{eid}/registrations/{rid}/approve
async fn approve(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((event_id, registration_id)): Path<(i64, i64)>,
) -> Result<Json<Registration>, ApiError> {
    Ok(Json(
        state
            .registration_service
            .approve(&user.0, event_id, registration_id)
            .await?,
    ))
}

/// POST /api/events/{eid}/registrations/{rid}/reject
async fn reject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((event_id, registration_id)): Path<(i64, i64)>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<Registration>, ApiError> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(
        state
            .registration_service
            .reject(&user.0, event_id, registration_id, reason)
            .await?,
    ))
}

/// POST /api/events/{eid}/registrations/{rid}/complete?present=&note=
async fn complete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((event_id, registration_id)): Path<(i64, i64)>,
    Query(query): Query<CompleteQuery>,
) -> Result<Json<Registration>, ApiError> {
    Ok(Json(
        state
            .registration_service
            .complete(&user.0, event_id, registration_id, query.present, query.note)
            .await?,
    ))
}
