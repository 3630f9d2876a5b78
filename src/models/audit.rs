//! Audit trail of privileged actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    /// Acting user; `None` for system actions
    pub user_id: Option<i64>,
    /// Acting user's email, joined at read time
    #[serde(default)]
    pub user_email: Option<String>,
    /// Namespaced action, e.g. `admin:lock_user`
    pub action: String,
    /// Raw JSON details
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for audit searches.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Case-insensitive substring of the action
    pub action: Option<String>,
    pub user_id: Option<i64>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
}
