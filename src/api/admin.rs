//! Admin API endpoints
//!
//! Every route here sits behind `require_auth` + `require_admin`.
//!
//! - GET /api/admin/dashboard
//! - GET /api/admin/users
//! - POST /api/admin/users/{id}/lock|unlock
//! - POST /api/admin/users/{id}/role
//! - GET /api/admin/export/users|events?format=csv|json
//! - POST /api/admin/notify
//! - GET /api/admin/audits
//! - GET /api/admin/audits/export?format=csv|json

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{non_empty, PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, RequestStatsSnapshot};
use crate::models::{AuditFilter, AuditLog, Notification, User, UserFilter};
use crate::services::admin::audit_window;
use crate::services::{AdminNotifyInput, DashboardCounts, ExportFile, ExportFormat};

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl UserListQuery {
    fn into_filter(self) -> Result<UserFilter, ApiError> {
        Ok(UserFilter {
            role: non_empty(self.role)
                .map(|r| r.parse())
                .transpose()
                .map_err(|_| ApiError::validation_error("Invalid role"))?,
            status: non_empty(self.status)
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| ApiError::validation_error("Invalid status"))?,
            search: non_empty(self.search),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

impl ExportQuery {
    fn format(&self) -> Result<ExportFormat, ApiError> {
        self.format
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| ApiError::validation_error("Format must be csv or json"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub action: Option<String>,
    pub user_id: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub format: Option<String>,
}

impl AuditQuery {
    fn filter(&self) -> Result<AuditFilter, ApiError> {
        let (from, to) = audit_window(self.from.as_deref(), self.to.as_deref())?;
        Ok(AuditFilter {
            action: non_empty(self.action.clone()),
            user_id: self.user_id,
            from,
            to,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub counts: DashboardCounts,
    pub requests: RequestStatsSnapshot,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/{id}/lock", post(lock_user))
        .route("/users/{id}/unlock", post(unlock_user))
        .route("/users/{id}/role", post(change_role))
        .route("/export/users", get(export_users))
        .route("/export/events", get(export_events))
        .route("/notify", post(notify_user))
        .route("/audits", get(list_audits))
        .route("/audits/export", get(export_audits))
}

/// File download with a `Content-Disposition: attachment` header
fn download(file: ExportFile) -> Response {
    (
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", file.filename),
            ),
        ],
        file.body,
    )
        .into_response()
}

/// GET /api/admin/dashboard
async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let counts = state.admin_service.dashboard().await?;
    Ok(Json(DashboardResponse {
        counts,
        requests: state.request_stats.snapshot(),
    }))
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Query(paging): Query<PaginationQuery>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<PagedResponse<User>>, ApiError> {
    let filter = query.into_filter()?;
    let page = state
        .admin_service
        .list_users(&admin.0, &filter, &paging.params())
        .await?;
    Ok(Json(page.into()))
}

/// POST /api/admin/users/{id}/lock
async fn lock_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.admin_service.lock_user(&admin.0, id).await?))
}

/// POST /api/admin/users/{id}/unlock
async fn unlock_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.admin_service.unlock_user(&admin.0, id).await?))
}

/// POST /api/admin/users/{id}/role
async fn change_role(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ChangeRoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(
        state
            .admin_service
            .change_role(&admin.0, id, &body.role)
            .await?,
    ))
}

/// GET /api/admin/export/users
async fn export_users(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let file = state
        .admin_service
        .export_users(&admin.0, query.format()?)
        .await?;
    Ok(download(file))
}

/// GET /api/admin/export/events
async fn export_events(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let file = state
        .admin_service
        .export_events(&admin.0, query.format()?)
        .await?;
    Ok(download(file))
}

/// POST /api/admin/notify
async fn notify_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Json(body): Json<AdminNotifyInput>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let notification = state.admin_service.notify_user(&admin.0, body).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/admin/audits
async fn list_audits(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Query(paging): Query<PaginationQuery>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<PagedResponse<AuditLog>>, ApiError> {
    let filter = query.filter()?;
    let page = state
        .admin_service
        .audits(&admin.0, &filter, &paging.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/admin/audits/export
async fn export_audits(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> Result<Response, ApiError> {
    let format = ExportQuery {
        format: query.format.clone(),
    }
    .format()?;
    let file = state
        .admin_service
        .export_audits(&admin.0, &query.filter()?, format)
        .await?;
    Ok(download(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserRole, UserStatus};

    #[test]
    fn test_user_query_into_filter() {
        let query = UserListQuery {
            role: Some("organizer".to_string()),
            status: Some("locked".to_string()),
            search: Some("".to_string()),
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.role, Some(UserRole::Organizer));
        assert_eq!(filter.status, Some(UserStatus::Locked));
        assert_eq!(filter.search, None);

        let bad = UserListQuery {
            role: Some("root".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.into_filter().unwrap_err().error.message, "Invalid role");
    }

    #[test]
    fn test_export_format_defaults_to_csv() {
        assert_eq!(ExportQuery::default().format().unwrap(), ExportFormat::Csv);
        let json = ExportQuery {
            format: Some("JSON".to_string()),
        };
        assert_eq!(json.format().unwrap(), ExportFormat::Json);
        let xml = ExportQuery {
            format: Some("xml".to_string()),
        };
        assert!(xml.format().is_err());
    }

    #[test]
    fn test_download_headers() {
        let response = download(ExportFile {
            filename: "users.csv".to_string(),
            content_type: "text/csv; charset=utf-8",
            body: b"id\n".to_vec(),
        });
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=users.csv"
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    }
}
