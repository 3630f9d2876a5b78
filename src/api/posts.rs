//! Event discussion API endpoints
//!
//! - GET/POST /api/events/{id}/posts
//! - DELETE /api/posts/{id}
//! - GET/POST /api/posts/{id}/comments
//! - GET/POST/DELETE /api/posts/{id}/likes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateCommentInput, CreatePostInput, Post, PostComment, PostLike};
use crate::services::LikeOutcome;

/// Like state after a like or unlike
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub post_id: i64,
    pub changed: bool,
    pub likes_count: i32,
}

impl LikeResponse {
    fn new(post_id: i64, outcome: LikeOutcome) -> Self {
        Self {
            post_id,
            changed: outcome.changed,
            likes_count: outcome.likes_count,
        }
    }
}

/// Routes nested under /api/events
pub fn event_router() -> Router<AppState> {
    Router::new().route("/{id}/posts", get(list_posts).post(create_post))
}

/// Routes nested under /api/posts
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", delete(delete_post))
        .route("/{id}/comments", get(list_comments).post(create_comment))
        .route(
            "/{id}/likes",
            get(list_likes).post(like_post).delete(unlike_post),
        )
}

/// GET /api/events/{id}/posts
async fn list_posts(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(event_id): Path<i64>,
    Query(paging): Query<PaginationQuery>,
) -> Result<Json<PagedResponse<Post>>, ApiError> {
    let page = state.post_service.list(event_id, &paging.params()).await?;
    Ok(Json(page.into()))
}

/// POST /api/events/{id}/posts
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(event_id): Path<i64>,
    Json(body): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(&user.0, event_id, body).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// DELETE /api/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(&user.0, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/posts/{id}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<PostComment>>, ApiError> {
    Ok(Json(state.post_service.comments(post_id).await?))
}

/// POST /api/posts/{id}/comments
async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(post_id): Path<i64>,
    Json(body): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.post_service.comment(&user.0, post_id, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /api/posts/{id}/likes
async fn list_likes(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<PostLike>>, ApiError> {
    Ok(Json(state.post_service.likes(post_id).await?))
}

/// POST /api/posts/{id}/likes
async fn like_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(post_id): Path<i64>,
) -> Result<Json<LikeResponse>, ApiError> {
    let outcome = state.post_service.like(&user.0, post_id).await?;
    Ok(Json(LikeResponse::new(post_id, outcome)))
}

/// DELETE /api/posts/{id}/likes
async fn unlike_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(post_id): Path<i64>,
) -> Result<Json<LikeResponse>, ApiError> {
    let outcome = state.post_service.unlike(&user.0, post_id).await?;
    Ok(Json(LikeResponse::new(post_id, outcome)))
}
