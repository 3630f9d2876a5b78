//! Admin console service
//!
//! Account moderation, exports, direct notifications, the audit viewer
//! and dashboard counters. Every operation here is recorded in the audit
//! trail under an `admin:` action.

use crate::db::repositories::{
    EventRepository, RefreshTokenRepository, RegistrationRepository, UserRepository,
};
use crate::models::{
    timestamp, AuditFilter, AuditLog, ListParams, NewNotification, Notification, PagedResult,
    User, UserFilter, UserRole, UserStatus,
};
use crate::services::audit::AuditService;
use crate::services::export::{self, ExportFile, ExportFormat};
use crate::services::notification::{NotificationService, NotificationServiceError};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Error types for admin operations
#[derive(Debug, thiserror::Error)]
pub enum AdminServiceError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<NotificationServiceError> for AdminServiceError {
    fn from(err: NotificationServiceError) -> Self {
        match err {
            NotificationServiceError::NotFound => Self::NotFound,
            NotificationServiceError::Forbidden => Self::Forbidden("Forbidden".to_string()),
            NotificationServiceError::ValidationError(msg) => Self::ValidationError(msg),
            NotificationServiceError::PushNotConfigured => {
                Self::InternalError(anyhow::anyhow!("Push is not configured"))
            }
            NotificationServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Body of a direct notification sent by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotifyInput {
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Row counts shown on the admin dashboard
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub total_users: i64,
    pub users_by_role: BTreeMap<String, i64>,
    pub total_events: i64,
    pub events_by_status: BTreeMap<String, i64>,
    pub total_registrations: i64,
    pub registrations_by_status: BTreeMap<String, i64>,
}

/// Admin service
pub struct AdminService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    events: Arc<dyn EventRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditService>,
}

impl AdminService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        events: Arc<dyn EventRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            events,
            registrations,
            notifications,
            audit,
        }
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn list_users(
        &self,
        admin: &User,
        filter: &UserFilter,
        params: &ListParams,
    ) -> Result<PagedResult<User>, AdminServiceError> {
        let (users, total) = self.users.list(filter, params).await?;
        self.audit
            .record(
                Some(admin.id),
                "admin:list_users",
                Some(json!({
                    "role": filter.role.map(|r| r.to_string()),
                    "status": filter.status.map(|s| s.to_string()),
                    "search": filter.search,
                    "page": params.page,
                })),
            )
            .await;
        Ok(PagedResult::new(users, total, params))
    }

    /// Lock an account and end all of its sessions
    pub async fn lock_user(&self, admin: &User, user_id: i64) -> Result<User, AdminServiceError> {
        if admin.id == user_id {
            return Err(AdminServiceError::Forbidden(
                "Admins cannot lock their own account".to_string(),
            ));
        }
        let user = self.set_status(user_id, UserStatus::Locked).await?;
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(user_id)
            .await
            .context("Failed to revoke sessions")?;

        tracing::info!("User {} locked by admin {}, {} sessions ended", user_id, admin.id, revoked);
        self.audit
            .record(
                Some(admin.id),
                "admin:lock_user",
                Some(json!({ "userId": user_id, "revokedTokens": revoked })),
            )
            .await;
        Ok(user)
    }

    pub async fn unlock_user(&self, admin: &User, user_id: i64) -> Result<User, AdminServiceError> {
        let user = self.set_status(user_id, UserStatus::Active).await?;
        tracing::info!("User {} unlocked by admin {}", user_id, admin.id);
        self.audit
            .record(Some(admin.id), "admin:unlock_user", Some(json!({ "userId": user_id })))
            .await;
        Ok(user)
    }

    pub async fn change_role(
        &self,
        admin: &User,
        user_id: i64,
        role: &str,
    ) -> Result<User, AdminServiceError> {
        let role: UserRole = role
            .parse()
            .map_err(|_| AdminServiceError::ValidationError("Invalid role".to_string()))?;

        let mut user = self.load(user_id).await?;
        let previous = user.role;
        user.role = role;
        user.updated_at = Utc::now();
        let user = self.users.update(&user).await.context("Failed to change role")?;

        self.audit
            .record(
                Some(admin.id),
                "admin:change_role",
                Some(json!({
                    "userId": user_id,
                    "from": previous.to_string(),
                    "to": role.to_string(),
                })),
            )
            .await;
        Ok(user)
    }

    // ========================================================================
    // Exports
    // ========================================================================

    pub async fn export_users(
        &self,
        admin: &User,
        format: ExportFormat,
    ) -> Result<ExportFile, AdminServiceError> {
        let users = self.users.list_all().await?;
        let file = export::export_users(&users, format)?;
        self.audit
            .record(
                Some(admin.id),
                "admin:export_users",
                Some(json!({ "format": format.to_string(), "count": users.len() })),
            )
            .await;
        Ok(file)
    }

    pub async fn export_events(
        &self,
        admin: &User,
        format: ExportFormat,
    ) -> Result<ExportFile, AdminServiceError> {
        let events = self.events.list_with_organizer().await?;
        let file = export::export_events(&events, format)?;
        self.audit
            .record(
                Some(admin.id),
                "admin:export_events",
                Some(json!({ "format": format.to_string(), "count": events.len() })),
            )
            .await;
        Ok(file)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Send a notification to one user
    pub async fn notify_user(
        &self,
        admin: &User,
        input: AdminNotifyInput,
    ) -> Result<Notification, AdminServiceError> {
        self.load(input.user_id).await?;

        let kind = input
            .kind
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "admin".to_string());
        let mut notification = NewNotification::new(input.user_id, kind, input.title);
        notification.message = input.message;
        notification.link = input.link;

        let created = self.notifications.notify(notification).await?;
        self.audit
            .record(
                Some(admin.id),
                "admin:notify_user",
                Some(json!({ "userId": input.user_id, "notificationId": created.id })),
            )
            .await;
        Ok(created)
    }

    // ========================================================================
    // Audit trail
    // ========================================================================

    pub async fn audits(
        &self,
        admin: &User,
        filter: &AuditFilter,
        params: &ListParams,
    ) -> Result<PagedResult<AuditLog>, AdminServiceError> {
        let page = self.audit.search(filter, params).await?;
        self.audit
            .record(
                Some(admin.id),
                "admin:view_audits",
                Some(json!({ "action": filter.action, "userId": filter.user_id })),
            )
            .await;
        Ok(page)
    }

    pub async fn export_audits(
        &self,
        admin: &User,
        filter: &AuditFilter,
        format: ExportFormat,
    ) -> Result<ExportFile, AdminServiceError> {
        let logs = self.audit.list_all(filter).await?;
        let file = export::export_audits(&logs, format)?;
        self.audit
            .record(
                Some(admin.id),
                "admin:export_audits",
                Some(json!({ "format": format.to_string(), "count": logs.len() })),
            )
            .await;
        Ok(file)
    }

    // ========================================================================
    // Dashboard
    // ========================================================================

    pub async fn dashboard(&self) -> Result<DashboardCounts, AdminServiceError> {
        let users = self.users.count_by_role().await?;
        let events = self.events.count_by_status().await?;
        let registrations = self.registrations.count_by_status().await?;

        Ok(DashboardCounts {
            total_users: users.iter().map(|(_, n)| n).sum(),
            users_by_role: users.iter().map(|(r, n)| (r.to_string(), *n)).collect(),
            total_events: events.iter().map(|(_, n)| n).sum(),
            events_by_status: events.iter().map(|(s, n)| (s.to_string(), *n)).collect(),
            total_registrations: registrations.iter().map(|(_, n)| n).sum(),
            registrations_by_status: registrations
                .iter()
                .map(|(s, n)| (s.to_string(), *n))
                .collect(),
        })
    }

    async fn load(&self, user_id: i64) -> Result<User, AdminServiceError> {
        self.users
            .get_by_id(user_id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or(AdminServiceError::NotFound)
    }

    async fn set_status(&self, user_id: i64, status: UserStatus) -> Result<User, AdminServiceError> {
        let mut user = self.load(user_id).await?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(self.users.update(&user).await.context("Failed to update user status")?)
    }
}

/// Build an audit search window. A bare date in `from` means the start of
/// that day and in `to` the end of that day; full timestamps are taken as
/// given.
pub fn audit_window(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), AdminServiceError> {
    let parse = |raw: &str, end_of_day: bool| -> Result<DateTime<Utc>, AdminServiceError> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            let time = if end_of_day {
                date.and_hms_milli_opt(23, 59, 59, 999)
            } else {
                date.and_hms_opt(0, 0, 0)
            };
            if let Some(naive) = time {
                return Ok(naive.and_utc());
            }
        }
        timestamp::parse(raw)
            .ok_or_else(|| AdminServiceError::ValidationError(format!("Invalid date: {}", raw)))
    };

    let from = from.filter(|s| !s.trim().is_empty()).map(|s| parse(s, false)).transpose()?;
    let to = to.filter(|s| !s.trim().is_empty()).map(|s| parse(s, true)).transpose()?;
    Ok((from, to))
}
