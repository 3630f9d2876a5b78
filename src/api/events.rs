//! Event API endpoints
//!
//! - GET /api/events - List events visible to the caller
//! - GET /api/events/{id} - Event detail
//! - POST /api/events - Create (organizer/admin)
//! - PUT /api/events/{id} - Update (owner/admin)
//! - DELETE /api/events/{id} - Soft delete (owner/admin)
//! - POST /api/events/{id}/approve|reject|cancel|complete - Lifecycle

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{non_empty, PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{timestamp, Event, EventFilter, EventInput};
use crate::services::EventAction;

/// Listing filters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub start_date_from: Option<String>,
    pub start_date_to: Option<String>,
}

impl EventListQuery {
    fn into_filter(self) -> Result<EventFilter, ApiError> {
        let status = non_empty(self.status)
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| ApiError::validation_error("Invalid event status"))?;
        let parse_date = |raw: Option<String>| -> Result<_, ApiError> {
            non_empty(raw)
                .map(|s| {
                    timestamp::parse(&s)
                        .ok_or_else(|| ApiError::validation_error(format!("Invalid date: {}", s)))
                })
                .transpose()
        };

        Ok(EventFilter {
            category: non_empty(self.category),
            status,
            search: non_empty(self.search),
            start_from: parse_date(self.start_date_from)?,
            start_to: parse_date(self.start_date_to)?,
            organizer_id: None,
        })
    }
}

/// Routes readable without a token (the caller is picked up when present)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events))
        .route("/{id}", get(get_event))
}

/// Routes that require authentication
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_event))
        .route("/{id}", axum::routing::put(update_event).delete(delete_event))
        .route("/{id}/approve", post(approve_event))
        .route("/{id}/reject", post(reject_event))
        .route("/{id}/cancel", post(cancel_event))
        .route("/{id}/complete", post(complete_event))
}

/// GET /api/events
async fn list_events(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(paging): Query<PaginationQuery>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<PagedResponse<Event>>, ApiError> {
    let filter = query.into_filter()?;
    let page = state
        .event_service
        .list(filter, &paging.params(), viewer.0.as_ref())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/events/{id}
async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.get(id).await?))
}

/// POST /api/events
async fn create_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<EventInput>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.event_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /api/events/{id}
async fn update_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<EventInput>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.update(&user.0, id, body).await?))
}

/// DELETE /api/events/{id}
async fn delete_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.event_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transition(
    state: AppState,
    user: AuthenticatedUser,
    id: i64,
    action: EventAction,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.transition(&user.0, id, action).await?))
}

/// POST /api/events/{id}/approve
async fn approve_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    transition(state, user, id, EventAction::Approve).await
}

/// POST /api/events/{id}/reject
async fn reject_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    transition(state, user, id, EventAction::Reject).await
}

/// POST /api/events/{id}/cancel
async fn cancel_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    transition(state, user, id, EventAction::Cancel).await
}

/// POST /api/events/{id}/complete
async fn complete_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    transition(state, user, id, EventAction::Complete).await
}
