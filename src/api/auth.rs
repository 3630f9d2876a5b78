//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create a volunteer or organizer account
//! - POST /api/auth/login - Exchange credentials for a token pair
//! - POST /api/auth/refresh - Rotate a refresh token
//! - POST /api/auth/logout - Revoke a refresh token
//! - GET /api/auth/me - Current profile
//! - PUT /api/auth/me - Update the current profile

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, ClientAddr};
use crate::models::{UpdateProfileInput, User, UserRole};
use crate::services::{AuthTokens, LoginInput, RegisterInput};

/// Response for a newly created account
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
}

/// Profile of the current user
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            phone: user.phone,
            avatar_url: user.avatar_url,
            bio: user.bio,
        }
    }
}

/// Body carrying a refresh token
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/me", get(get_current_user).put(update_profile))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth_service.register(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisteredResponse {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
        }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Json(body): Json<LoginInput>,
) -> Result<Json<AuthTokens>, ApiError> {
    let tokens = state.auth_service.login(body, ip).await?;
    Ok(Json(tokens))
}

/// POST /api/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, ApiError> {
    Ok(Json(state.auth_service.refresh(&body.refresh_token).await?))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    state.auth_service.logout(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<ProfileResponse> {
    Json(user.0.into())
}

/// PUT /api/auth/me
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let updated = state.auth_service.update_profile(user.0.id, body).await?;
    Ok(Json(updated.into()))
}
