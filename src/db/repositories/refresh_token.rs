//! Refresh token repository
//!
//! Persists hashed refresh tokens. Revocation is a guarded update so that two
//! concurrent rotations of the same token cannot both succeed.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::RefreshToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Refresh token repository trait
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Store a new token digest
    async fn create(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken>;

    /// Look up a token by digest
    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Revoke a single token.
    ///
    /// Returns `false` when the token was already revoked.
    async fn revoke(&self, id: i64) -> Result<bool>;

    /// Revoke every live token of a user, returning how many were revoked
    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64>;

    /// Delete expired and revoked tokens
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based refresh token repository implementation
pub struct SqlxRefreshTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxRefreshTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RefreshTokenRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_BY_HASH: &str = r#"
    SELECT id, user_id, token_hash, revoked, created_at, expires_at
    FROM refresh_tokens
    WHERE token_hash = ?
"#;

const REVOKE: &str = "UPDATE refresh_tokens SET revoked = 1 WHERE id = ? AND revoked = 0";

const REVOKE_ALL: &str =
    "UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0";

const DELETE_EXPIRED: &str = "DELETE FROM refresh_tokens WHERE expires_at < ? OR revoked = 1";

#[async_trait]
impl RefreshTokenRepository for SqlxRefreshTokenRepository {
    async fn create(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_token_sqlite(self.pool.sqlite()?, user_id, token_hash, expires_at).await
            }
            DatabaseDriver::Mysql => {
                create_token_mysql(self.pool.mysql()?, user_id, token_hash, expires_at).await
            }
        }
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SELECT_BY_HASH)
                    .bind(token_hash)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get refresh token")?;
                Ok(row.as_ref().map(row_to_token_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(SELECT_BY_HASH)
                    .bind(token_hash)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get refresh token")?;
                Ok(row.as_ref().map(row_to_token_mysql))
            }
        }
    }

    async fn revoke(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(REVOKE)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(REVOKE)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to revoke refresh token")?;

        Ok(affected > 0)
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(REVOKE_ALL)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(REVOKE_ALL)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to revoke user refresh tokens")
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(DELETE_EXPIRED)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(DELETE_EXPIRED)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired refresh tokens")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_token_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<RefreshToken> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, revoked, created_at, expires_at)
        VALUES (?, ?, 0, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await
    .context("Failed to create refresh token")?;

    Ok(RefreshToken {
        id: result.last_insert_rowid(),
        user_id,
        token_hash: token_hash.to_string(),
        revoked: false,
        created_at: now,
        expires_at,
    })
}

fn row_to_token_sqlite(row: &sqlx::sqlite::SqliteRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        revoked: row.get("revoked"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_token_mysql(
    pool: &MySqlPool,
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<RefreshToken> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, revoked, created_at, expires_at)
        VALUES (?, ?, FALSE, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await
    .context("Failed to create refresh token")?;

    Ok(RefreshToken {
        id: result.last_insert_id() as i64,
        user_id,
        token_hash: token_hash.to_string(),
        revoked: false,
        created_at: now,
        expires_at,
    })
}

fn row_to_token_mysql(row: &sqlx::mysql::MySqlRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        revoked: row.get("revoked"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxRefreshTokenRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_id = sqlx::query(
            "INSERT INTO users (email, password_hash, full_name) VALUES ('t@example.com', 'h', 'T')",
        )
        .execute(pool.sqlite().unwrap())
        .await
        .expect("Failed to create user")
        .last_insert_rowid();

        let repo = SqlxRefreshTokenRepository::new(pool.clone());
        (pool, repo, user_id)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        let expires = Utc::now() + Duration::days(7);

        let created = repo.create(user_id, "digest-1", expires).await.unwrap();
        let found = repo.get_by_hash("digest-1").await.unwrap().expect("Token not found");

        assert_eq!(found.id, created.id);
        assert_eq!(found.user_id, user_id);
        assert!(found.is_usable());
        assert!(repo.get_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_only_once() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        let token = repo
            .create(user_id, "digest-2", Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert!(repo.revoke(token.id).await.unwrap());
        assert!(!repo.revoke(token.id).await.unwrap());

        let found = repo.get_by_hash("digest-2").await.unwrap().unwrap();
        assert!(found.revoked);
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        for i in 0..3 {
            repo.create(user_id, &format!("d{}", i), Utc::now() + Duration::days(1))
                .await
                .unwrap();
        }

        assert_eq!(repo.revoke_all_for_user(user_id).await.unwrap(), 3);
        assert_eq!(repo.revoke_all_for_user(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        repo.create(user_id, "old", Utc::now() - Duration::days(1))
            .await
            .unwrap();
        repo.create(user_id, "live", Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_hash("old").await.unwrap().is_none());
        assert!(repo.get_by_hash("live").await.unwrap().is_some());
    }
}
