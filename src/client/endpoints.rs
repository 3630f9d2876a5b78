//! Endpoint groups of [`ApiClient`]

use serde_json::Value;

use super::{ApiClient, ApiRequest, ClientError, Role};
use crate::api::auth::{ProfileResponse, RegisteredResponse};
use crate::api::common::PagedResponse;
use crate::api::notifications::{MarkedResponse, UnreadCountResponse, VapidKeyResponse};
use crate::api::posts::LikeResponse;
use crate::models::{
    AuditLog, CreateCommentInput, CreatePostInput, Event, EventInput, EventStatus, Notification,
    Post, PostComment, PostLike, PushSubscription, Registration, UpdateProfileInput, User,
    UserStatus,
};
use crate::services::{AdminNotifyInput, AuthTokens, ExportFormat, LoginInput, RegisterInput};

/// Filters for the public event listing
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub category: Option<String>,
    pub status: Option<EventStatus>,
    pub search: Option<String>,
    pub start_date_from: Option<String>,
    pub start_date_to: Option<String>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
}

// ============================================================================
// Auth
// ============================================================================

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Log in and keep the issued token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, ClientError> {
        let input = LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        };
        let tokens: AuthTokens = self
            .client
            .fetch(ApiRequest::post("/auth/login").json(&input)?.without_refresh())
            .await?;
        self.client
            .tokens()
            .set_tokens(&tokens.access_token, &tokens.refresh_token)?;
        Ok(tokens)
    }

    pub async fn register(&self, input: &RegisterInput) -> Result<RegisteredResponse, ClientError> {
        self.client
            .fetch(ApiRequest::post("/auth/register").json(input)?.without_refresh())
            .await
    }

    /// Revoke the refresh token on the server and forget the session.
    /// The local session is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(refresh_token) = self.client.tokens().refresh_token() {
            let request = ApiRequest::post("/auth/logout")
                .json(&serde_json::json!({ "refreshToken": refresh_token }))?
                .without_refresh();
            if let Err(e) = self.client.execute(request).await {
                tracing::debug!("Server logout failed: {}", e);
            }
        }
        self.client.tokens().clear()
    }

    pub async fn me(&self) -> Result<ProfileResponse, ClientError> {
        self.client.fetch(ApiRequest::get("/auth/me")).await
    }

    pub async fn update_profile(
        &self,
        input: &UpdateProfileInput,
    ) -> Result<ProfileResponse, ClientError> {
        self.client
            .fetch(ApiRequest::put("/auth/me").json(input)?)
            .await
    }
}

// ============================================================================
// Events
// ============================================================================

pub struct EventsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> EventsApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &EventQuery) -> Result<PagedResponse<Event>, ClientError> {
        let request = ApiRequest::get("/events")
            .param("page", query.page)
            .param("size", query.size)
            .param("category", query.category.as_deref())
            .param("status", query.status)
            .param("search", query.search.as_deref())
            .param("startDateFrom", query.start_date_from.as_deref())
            .param("startDateTo", query.start_date_to.as_deref());
        self.client.fetch(request).await
    }

    pub async fn get(&self, id: i64) -> Result<Event, ClientError> {
        self.client.fetch(ApiRequest::get(format!("/events/{}", id))).await
    }

    pub async fn create(&self, input: &EventInput) -> Result<Event, ClientError> {
        self.client
            .fetch(ApiRequest::post("/events").json(input)?)
            .await
    }

    pub async fn update(&self, id: i64, input: &EventInput) -> Result<Event, ClientError> {
        self.client
            .fetch(ApiRequest::put(format!("/events/{}", id)).json(input)?)
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.client
            .execute(ApiRequest::delete(format!("/events/{}", id)))
            .await
    }

    pub async fn approve(&self, id: i64) -> Result<Event, ClientError> {
        self.action(id, "approve").await
    }

    pub async fn reject(&self, id: i64) -> Result<Event, ClientError> {
        self.action(id, "reject").await
    }

    pub async fn cancel(&self, id: i64) -> Result<Event, ClientError> {
        self.action(id, "cancel").await
    }

    pub async fn complete(&self, id: i64) -> Result<Event, ClientError> {
        self.action(id, "complete").await
    }

    async fn action(&self, id: i64, verb: &str) -> Result<Event, ClientError> {
        self.client
            .fetch(ApiRequest::post(format!("/events/{}/{}", id, verb)))
            .await
    }
}

// ============================================================================
// Registrations
// ============================================================================

pub struct RegistrationsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> RegistrationsApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Sign up for an event
    pub async fn register(
        &self,
        event_id: i64,
        note: Option<&str>,
    ) -> Result<Registration, ClientError> {
        let request = ApiRequest::post(format!("/events/{}/register", event_id))
            .json(&serde_json::json!({ "note": note }))?;
        self.client.fetch(request).await
    }

    pub async fn mine(&self) -> Result<Vec<Registration>, ClientError> {
        self.client.fetch(ApiRequest::get("/me/registrations")).await
    }

    pub async fn my_registration(&self, event_id: i64) -> Result<Registration, ClientError> {
        self.client
            .fetch(ApiRequest::get(format!("/events/{}/my-registration", event_id)))
            .await
    }

    pub async fn for_event(&self, event_id: i64) -> Result<Vec<Registration>, ClientError> {
        self.client
            .fetch(ApiRequest::get(format!("/events/{}/registrations", event_id)))
            .await
    }

    pub async fn cancel(&self, event_id: i64, registration_id: i64) -> Result<Registration, ClientError> {
        self.client
            .fetch(ApiRequest::post(review_path(event_id, registration_id, "cancel")))
            .await
    }

    pub async fn approve(&self, event_id: i64, registration_id: i64) -> Result<Registration, ClientError> {
        self.client
            .fetch(ApiRequest::post(review_path(event_id, registration_id, "approve")))
            .await
    }

    pub async fn reject(
        &self,
        event_id: i64,
        registration_id: i64,
        reason: Option<&str>,
    ) -> Result<Registration, ClientError> {
        let request = ApiRequest::post(review_path(event_id, registration_id, "reject"))
            .json(&serde_json::json!({ "reason": reason }))?;
        self.client.fetch(request).await
    }

    /// Mark attendance after the event
    pub async fn complete(
        &self,
        event_id: i64,
        registration_id: i64,
        present: bool,
        note: Option<&str>,
    ) -> Result<Registration, ClientError> {
        let request = ApiRequest::post(review_path(event_id, registration_id, "complete"))
            .param("present", Some(present))
            .param("note", note);
        self.client.fetch(request).await
    }
}

fn review_path(event_id: i64, registration_id: i64, verb: &str) -> String {
    format!("/events/{}/registrations/{}/{}", event_id, registration_id, verb)
}

// ============================================================================
// Posts
// ============================================================================

pub struct PostsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> PostsApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        event_id: i64,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<PagedResponse<Post>, ClientError> {
        let request = ApiRequest::get(format!("/events/{}/posts", event_id))
            .param("page", page)
            .param("size", size);
        self.client.fetch(request).await
    }

    pub async fn create(&self, event_id: i64, input: &CreatePostInput) -> Result<Post, ClientError> {
        self.client
            .fetch(ApiRequest::post(format!("/events/{}/posts", event_id)).json(input)?)
            .await
    }

    pub async fn delete(&self, post_id: i64) -> Result<(), ClientError> {
        self.client
            .execute(ApiRequest::delete(format!("/posts/{}", post_id)))
            .await
    }

    pub async fn comments(&self, post_id: i64) -> Result<Vec<PostComment>, ClientError> {
        self.client
            .fetch(ApiRequest::get(format!("/posts/{}/comments", post_id)))
            .await
    }

    pub async fn comment(&self, post_id: i64, content: &str) -> Result<PostComment, ClientError> {
        let input = CreateCommentInput {
            content: content.to_string(),
        };
        self.client
            .fetch(ApiRequest::post(format!("/posts/{}/comments", post_id)).json(&input)?)
            .await
    }

    pub async fn likes(&self, post_id: i64) -> Result<Vec<PostLike>, ClientError> {
        self.client
            .fetch(ApiRequest::get(format!("/posts/{}/likes", post_id)))
            .await
    }

    pub async fn like(&self, post_id: i64) -> Result<LikeResponse, ClientError> {
        self.client
            .fetch(ApiRequest::post(format!("/posts/{}/likes", post_id)))
            .await
    }

    pub async fn unlike(&self, post_id: i64) -> Result<LikeResponse, ClientError> {
        self.client
            .fetch(ApiRequest::delete(format!("/posts/{}/likes", post_id)))
            .await
    }
}

// ============================================================================
// Notifications and push
// ============================================================================

pub struct NotificationsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> NotificationsApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        unread_only: bool,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<PagedResponse<Notification>, ClientError> {
        let request = ApiRequest::get("/notifications")
            .param("unreadOnly", Some(unread_only))
            .param("page", page)
            .param("size", size);
        self.client.fetch(request).await
    }

    pub async fn unread_count(&self) -> Result<i64, ClientError> {
        let response: UnreadCountResponse = self
            .client
            .fetch(ApiRequest::get("/notifications/unread-count"))
            .await?;
        Ok(response.count)
    }

    pub async fn mark_read(&self, id: i64) -> Result<(), ClientError> {
        self.client
            .execute(ApiRequest::post(format!("/notifications/{}/read", id)))
            .await
    }

    pub async fn mark_all_read(&self) -> Result<u64, ClientError> {
        let response: MarkedResponse = self
            .client
            .fetch(ApiRequest::post("/notifications/read-all"))
            .await?;
        Ok(response.updated)
    }
}

pub struct PushApi<'a> {
    client: &'a ApiClient,
}

impl<'a> PushApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn vapid_public_key(&self) -> Result<String, ClientError> {
        let response: VapidKeyResponse = self
            .client
            .fetch(ApiRequest::get("/push/vapidPublicKey"))
            .await?;
        Ok(response.public_key)
    }

    /// Register a browser push subscription; `keys` is the subscription's
    /// key material as produced by the Push API
    pub async fn subscribe(&self, endpoint: &str, keys: &Value) -> Result<PushSubscription, ClientError> {
        let request = ApiRequest::post("/push/subscribe")
            .json(&serde_json::json!({ "endpoint": endpoint, "keysJson": keys }))?;
        self.client.fetch(request).await
    }

    pub async fn unsubscribe(&self, endpoint: &str) -> Result<(), ClientError> {
        let request = ApiRequest::post("/push/unsubscribe")
            .json(&serde_json::json!({ "endpoint": endpoint }))?;
        self.client.execute(request).await
    }
}

// ============================================================================
// Admin
// ============================================================================

pub struct AdminApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AdminApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Counts by role and status plus request statistics
    pub async fn dashboard(&self) -> Result<Value, ClientError> {
        self.client.fetch(ApiRequest::get("/admin/dashboard")).await
    }

    pub async fn users(&self, query: &UserQuery) -> Result<PagedResponse<User>, ClientError> {
        let request = ApiRequest::get("/admin/users")
            .param("page", query.page)
            .param("size", query.size)
            .param("role", query.role)
            .param("status", query.status)
            .param("search", query.search.as_deref());
        self.client.fetch(request).await
    }

    pub async fn lock_user(&self, id: i64) -> Result<User, ClientError> {
        self.client
            .fetch(ApiRequest::post(format!("/admin/users/{}/lock", id)))
            .await
    }

    pub async fn unlock_user(&self, id: i64) -> Result<User, ClientError> {
        self.client
            .fetch(ApiRequest::post(format!("/admin/users/{}/unlock", id)))
            .await
    }

    pub async fn change_role(&self, id: i64, role: Role) -> Result<User, ClientError> {
        let request = ApiRequest::post(format!("/admin/users/{}/role", id))
            .json(&serde_json::json!({ "role": role }))?;
        self.client.fetch(request).await
    }

    /// Raw file contents of the user export
    pub async fn export_users(&self, format: ExportFormat) -> Result<Vec<u8>, ClientError> {
        self.client
            .fetch_bytes(ApiRequest::get("/admin/export/users").param("format", Some(format.extension())))
            .await
    }

    /// Raw file contents of the event export
    pub async fn export_events(&self, format: ExportFormat) -> Result<Vec<u8>, ClientError> {
        self.client
            .fetch_bytes(ApiRequest::get("/admin/export/events").param("format", Some(format.extension())))
            .await
    }

    pub async fn notify(&self, input: &AdminNotifyInput) -> Result<Notification, ClientError> {
        self.client
            .fetch(ApiRequest::post("/admin/notify").json(input)?)
            .await
    }

    pub async fn audits(
        &self,
        action: Option<&str>,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<PagedResponse<AuditLog>, ClientError> {
        let request = ApiRequest::get("/admin/audits")
            .param("action", action)
            .param("page", page)
            .param("size", size);
        self.client.fetch(request).await
    }

    pub async fn export_audits(&self, format: ExportFormat) -> Result<Vec<u8>, ClientError> {
        self.client
            .fetch_bytes(ApiRequest::get("/admin/audits/export").param("format", Some(format.extension())))
            .await
    }
}
