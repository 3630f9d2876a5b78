//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints of VolunteerHub, mounted
//! under `/api`:
//! - Auth endpoints (register, login, token refresh, profile)
//! - Event endpoints and their lifecycle actions
//! - Registration endpoints
//! - Event discussion endpoints (posts, comments, likes)
//! - Notification and web push endpoints
//! - Admin endpoints (users, exports, audit trail, dashboard)

pub mod admin;
pub mod auth;
pub mod common;
pub mod events;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod registrations;

#[cfg(test)]
mod tests;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, RequestStats};

/// Build the API router (mounted at `/api`)
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest(
            "/events",
            events::protected_router()
                .merge(registrations::event_router())
                .merge(posts::event_router()),
        )
        .nest("/me", registrations::me_router())
        .nest("/posts", posts::router())
        .nest("/notifications", notifications::router())
        .nest("/push", notifications::push_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public event reads pick up the caller when a valid token is sent
    let browse_routes = Router::new()
        .nest("/events", events::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    // Public routes
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::public_router())
        .nest("/push", notifications::push_public_router())
        .merge(browse_routes)
        .merge(admin_routes)
        .merge(protected_routes)
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.pool.ping().await.map_err(ApiError::internal_error)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// CORS for the single-page frontend; `*` allows any origin
pub fn cors_layer(cors_origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = if cors_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(cors_origin.trim().parse::<HeaderValue>()?)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin)?)
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state))
}
