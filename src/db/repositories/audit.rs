//! Audit log repository
//!
//! Append-only record of privileged actions, searchable by action, actor and
//! time window.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AuditFilter, AuditLog, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Audit log repository trait
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an entry
    async fn create(
        &self,
        user_id: Option<i64>,
        action: &str,
        details: Option<&str>,
    ) -> Result<AuditLog>;

    /// Search entries, newest first
    async fn search(
        &self,
        filter: &AuditFilter,
        params: &ListParams,
    ) -> Result<(Vec<AuditLog>, i64)>;

    /// Every entry matching a filter, newest first (exports)
    async fn list_all(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>>;
}

/// SQLx-based audit repository implementation
pub struct SqlxAuditRepository {
    pool: DynDatabasePool,
}

impl SqlxAuditRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuditRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuditRepository for SqlxAuditRepository {
    async fn create(
        &self,
        user_id: Option<i64>,
        action: &str,
        details: Option<&str>,
    ) -> Result<AuditLog> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_AUDIT)
                .bind(user_id)
                .bind(action)
                .bind(details)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to write audit log")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_AUDIT)
                .bind(user_id)
                .bind(action)
                .bind(details)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to write audit log")?
                .last_insert_id() as i64,
        };

        Ok(AuditLog {
            id,
            user_id,
            user_email: None,
            action: action.to_string(),
            details: details.map(str::to_string),
            created_at: now,
        })
    }

    async fn search(
        &self,
        filter: &AuditFilter,
        params: &ListParams,
    ) -> Result<(Vec<AuditLog>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                search_audit_sqlite(self.pool.sqlite()?, filter, Some(params)).await
            }
            DatabaseDriver::Mysql => {
                search_audit_mysql(self.pool.mysql()?, filter, Some(params)).await
            }
        }
    }

    async fn list_all(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>> {
        let (logs, _) = match self.pool.driver() {
            DatabaseDriver::Sqlite => search_audit_sqlite(self.pool.sqlite()?, filter, None).await?,
            DatabaseDriver::Mysql => search_audit_mysql(self.pool.mysql()?, filter, None).await?,
        };
        Ok(logs)
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

const INSERT_AUDIT: &str =
    "INSERT INTO audit_logs (user_id, action, details, created_at) VALUES (?, ?, ?, ?)";

// Optional filters bind twice: `(? IS NULL OR col = ?)`.
const SEARCH_AUDIT: &str = r#"
    SELECT a.id, a.user_id, u.email AS user_email, a.action, a.details, a.created_at
    FROM audit_logs a
    LEFT JOIN users u ON u.id = a.user_id
    WHERE (? IS NULL OR a.action = ?)
      AND (? IS NULL OR a.user_id = ?)
      AND (? IS NULL OR a.created_at >= ?)
      AND (? IS NULL OR a.created_at <= ?)
    ORDER BY a.created_at DESC, a.id DESC
    LIMIT ? OFFSET ?
"#;

const COUNT_AUDIT: &str = r#"
    SELECT COUNT(*) AS count
    FROM audit_logs a
    WHERE (? IS NULL OR a.action = ?)
      AND (? IS NULL OR a.user_id = ?)
      AND (? IS NULL OR a.created_at >= ?)
      AND (? IS NULL OR a.created_at <= ?)
"#;

// Exports are unpaged
const EXPORT_LIMIT: i64 = i64::MAX;

struct AuditFilterBinds {
    action: Option<String>,
    user_id: Option<i64>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl From<&AuditFilter> for AuditFilterBinds {
    fn from(filter: &AuditFilter) -> Self {
        Self {
            action: filter
                .action
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            user_id: filter.user_id,
            from: filter.from,
            to: filter.to,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn search_audit_sqlite(
    pool: &SqlitePool,
    filter: &AuditFilter,
    params: Option<&ListParams>,
) -> Result<(Vec<AuditLog>, i64)> {
    let binds = AuditFilterBinds::from(filter);
    let (limit, offset) = params.map_or((EXPORT_LIMIT, 0), |p| (p.limit(), p.offset()));

    let rows = sqlx::query(SEARCH_AUDIT)
        .bind(&binds.action)
        .bind(&binds.action)
        .bind(binds.user_id)
        .bind(binds.user_id)
        .bind(binds.from)
        .bind(binds.from)
        .bind(binds.to)
        .bind(binds.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to search audit logs")?;

    let total: i64 = sqlx::query(COUNT_AUDIT)
        .bind(&binds.action)
        .bind(&binds.action)
        .bind(binds.user_id)
        .bind(binds.user_id)
        .bind(binds.from)
        .bind(binds.from)
        .bind(binds.to)
        .bind(binds.to)
        .fetch_one(pool)
        .await
        .context("Failed to count audit logs")?
        .get("count");

    let logs = rows
        .iter()
        .map(|row| AuditLog {
            id: row.get("id"),
            user_id: row.get("user_id"),
            user_email: row.get("user_email"),
            action: row.get("action"),
            details: row.get("details"),
            created_at: row.get("created_at"),
        })
        .collect();

    Ok((logs, total))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn search_audit_mysql(
    pool: &MySqlPool,
    filter: &AuditFilter,
    params: Option<&ListParams>,
) -> Result<(Vec<AuditLog>, i64)> {
    let binds = AuditFilterBinds::from(filter);
    let (limit, offset) = params.map_or((EXPORT_LIMIT, 0), |p| (p.limit(), p.offset()));

    let rows = sqlx::query(SEARCH_AUDIT)
        .bind(&binds.action)
        .bind(&binds.action)
        .bind(binds.user_id)
        .bind(binds.user_id)
        .bind(binds.from)
        .bind(binds.from)
        .bind(binds.to)
        .bind(binds.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to search audit logs")?;

    let total: i64 = sqlx::query(COUNT_AUDIT)
        .bind(&binds.action)
        .bind(&binds.action)
        .bind(binds.user_id)
        .bind(binds.user_id)
        .bind(binds.from)
        .bind(binds.from)
        .bind(binds.to)
        .bind(binds.to)
        .fetch_one(pool)
        .await
        .context("Failed to count audit logs")?
        .get("count");

    let logs = rows
        .iter()
        .map(|row| AuditLog {
            id: row.get("id"),
            user_id: row.get("user_id"),
            user_email: row.get("user_email"),
            action: row.get("action"),
            details: row.get("details"),
            created_at: row.get("created_at"),
        })
        .collect();

    Ok((logs, total))
}
