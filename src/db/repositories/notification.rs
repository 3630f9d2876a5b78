//! Notification repository
//!
//! In-app notifications and the browser push subscriptions they fan out to.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, NewNotification, Notification, PushSubscription};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Store a notification
    async fn create(&self, notification: &NewNotification) -> Result<Notification>;

    /// Get a notification by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Notification>>;

    /// Notifications of a user, newest first
    async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<(Vec<Notification>, i64)>;

    /// Number of unread notifications of a user
    async fn count_unread(&self, user_id: i64) -> Result<i64>;

    /// Mark one notification read
    async fn mark_read(&self, id: i64) -> Result<()>;

    /// Mark every notification of a user read, returning how many changed
    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;
}

/// Push subscription repository trait
#[async_trait]
pub trait PushSubscriptionRepository: Send + Sync {
    /// Insert or refresh the keys of a (user, endpoint) subscription
    async fn upsert(
        &self,
        user_id: i64,
        endpoint: &str,
        keys_json: &str,
    ) -> Result<PushSubscription>;

    /// Remove a subscription. Returns `false` if none matched.
    async fn delete(&self, user_id: i64, endpoint: &str) -> Result<bool>;

    /// Subscriptions of a user
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<PushSubscription>>;
}

/// SQLx-based notification repository implementation
pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

/// SQLx-based push subscription repository implementation
pub struct SqlxPushSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxPushSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PushSubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

const INSERT_NOTIFICATION: &str = r#"
    INSERT INTO notifications (user_id, type, title, message, payload, link, is_read, created_at)
    VALUES (?, ?, ?, ?, ?, ?, 0, ?)
"#;

const SELECT_NOTIFICATION_BY_ID: &str = r#"
    SELECT id, user_id, type, title, message, payload, link, is_read, created_at
    FROM notifications
    WHERE id = ?
"#;

const LIST_NOTIFICATIONS: &str = r#"
    SELECT id, user_id, type, title, message, payload, link, is_read, created_at
    FROM notifications
    WHERE user_id = ? AND (? = 0 OR is_read = 0)
    ORDER BY created_at DESC, id DESC
    LIMIT ? OFFSET ?
"#;

const COUNT_NOTIFICATIONS: &str = r#"
    SELECT COUNT(*) AS count
    FROM notifications
    WHERE user_id = ? AND (? = 0 OR is_read = 0)
"#;

const COUNT_UNREAD: &str =
    "SELECT COUNT(*) AS count FROM notifications WHERE user_id = ? AND is_read = 0";

const MARK_READ: &str = "UPDATE notifications SET is_read = 1 WHERE id = ?";

const MARK_ALL_READ: &str =
    "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0";

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, user_id, endpoint, keys_json, created_at
    FROM push_subscriptions
    WHERE user_id = ? AND endpoint = ?
"#;

const LIST_SUBSCRIPTIONS: &str = r#"
    SELECT id, user_id, endpoint, keys_json, created_at
    FROM push_subscriptions
    WHERE user_id = ?
    ORDER BY id ASC
"#;

const DELETE_SUBSCRIPTION: &str =
    "DELETE FROM push_subscriptions WHERE user_id = ? AND endpoint = ?";

// Row mapping is identical for both drivers apart from the row type.
macro_rules! row_to_notification {
    ($row:expr) => {
        Notification {
            id: $row.get("id"),
            user_id: $row.get("user_id"),
            kind: $row.get("type"),
            title: $row.get("title"),
            message: $row.get("message"),
            payload: $row.get("payload"),
            link: $row.get("link"),
            is_read: $row.get("is_read"),
            created_at: $row.get("created_at"),
        }
    };
}

macro_rules! row_to_subscription {
    ($row:expr) => {
        PushSubscription {
            id: $row.get("id"),
            user_id: $row.get("user_id"),
            endpoint: $row.get("endpoint"),
            keys_json: $row.get("keys_json"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, n: &NewNotification) -> Result<Notification> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_NOTIFICATION)
                .bind(n.user_id)
                .bind(&n.kind)
                .bind(&n.title)
                .bind(&n.message)
                .bind(&n.payload)
                .bind(&n.link)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create notification")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_NOTIFICATION)
                .bind(n.user_id)
                .bind(&n.kind)
                .bind(&n.title)
                .bind(&n.message)
                .bind(&n.payload)
                .bind(&n.link)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create notification")?
                .last_insert_id() as i64,
        };

        Ok(Notification {
            id,
            user_id: n.user_id,
            kind: n.kind.clone(),
            title: n.title.clone(),
            message: n.message.clone(),
            payload: n.payload.clone(),
            link: n.link.clone(),
            is_read: false,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Notification>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(SELECT_NOTIFICATION_BY_ID)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get notification")?
                .map(|row| row_to_notification!(row))),
            DatabaseDriver::Mysql => Ok(sqlx::query(SELECT_NOTIFICATION_BY_ID)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get notification")?
                .map(|row| row_to_notification!(row))),
        }
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<(Vec<Notification>, i64)> {
        let unread_only = i32::from(unread_only);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let rows = sqlx::query(LIST_NOTIFICATIONS)
                    .bind(user_id)
                    .bind(unread_only)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list notifications")?;
                let total: i64 = sqlx::query(COUNT_NOTIFICATIONS)
                    .bind(user_id)
                    .bind(unread_only)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count notifications")?
                    .get("count");
                Ok((rows.iter().map(|row| row_to_notification!(row)).collect(), total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let rows = sqlx::query(LIST_NOTIFICATIONS)
                    .bind(user_id)
                    .bind(unread_only)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list notifications")?;
                let total: i64 = sqlx::query(COUNT_NOTIFICATIONS)
                    .bind(user_id)
                    .bind(unread_only)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count notifications")?
                    .get("count");
                Ok((rows.iter().map(|row| row_to_notification!(row)).collect(), total))
            }
        }
    }

    async fn count_unread(&self, user_id: i64) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(COUNT_UNREAD)
                .bind(user_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count unread notifications")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(COUNT_UNREAD)
                .bind(user_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count unread notifications")?
                .get("count"),
        };
        Ok(count)
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(MARK_READ)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(MARK_READ)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to mark notification read")
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(MARK_ALL_READ)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(MARK_ALL_READ)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to mark notifications read")
    }
}

#[async_trait]
impl PushSubscriptionRepository for SqlxPushSubscriptionRepository {
    async fn upsert(
        &self,
        user_id: i64,
        endpoint: &str,
        keys_json: &str,
    ) -> Result<PushSubscription> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query(
                    r#"INSERT INTO push_subscriptions (user_id, endpoint, keys_json, created_at)
                       VALUES (?, ?, ?, ?)
                       ON CONFLICT(user_id, endpoint) DO UPDATE SET keys_json = excluded.keys_json"#,
                )
                .bind(user_id)
                .bind(endpoint)
                .bind(keys_json)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to save push subscription")?;

                let row = sqlx::query(SELECT_SUBSCRIPTION)
                    .bind(user_id)
                    .bind(endpoint)
                    .fetch_one(pool)
                    .await
                    .context("Failed to load push subscription")?;
                Ok(row_to_subscription!(row))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(
                    r#"INSERT INTO push_subscriptions (user_id, endpoint, keys_json, created_at)
                       VALUES (?, ?, ?, ?)
                       ON DUPLICATE KEY UPDATE keys_json = VALUES(keys_json)"#,
                )
                .bind(user_id)
                .bind(endpoint)
                .bind(keys_json)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to save push subscription")?;

                let row = sqlx::query(SELECT_SUBSCRIPTION)
                    .bind(user_id)
                    .bind(endpoint)
                    .fetch_one(pool)
                    .await
                    .context("Failed to load push subscription")?;
                Ok(row_to_subscription!(row))
            }
        }
    }

    async fn delete(&self, user_id: i64, endpoint: &str) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(DELETE_SUBSCRIPTION)
                .bind(user_id)
                .bind(endpoint)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(DELETE_SUBSCRIPTION)
                .bind(user_id)
                .bind(endpoint)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete push subscription")?;

        Ok(affected > 0)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<PushSubscription>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(LIST_SUBSCRIPTIONS)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list push subscriptions")?
                .iter()
                .map(|row| row_to_subscription!(row))
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(LIST_SUBSCRIPTIONS)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list push subscriptions")?
                .iter()
                .map(|row| row_to_subscription!(row))
                .collect()),
        }
    }
}
