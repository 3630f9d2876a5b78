//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, User, UserFilter, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by (normalized) email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable field of a user
    async fn update(&self, user: &User) -> Result<User>;

    /// Stamp the last successful login
    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// List users matching a filter, newest first
    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Every non-deleted user, oldest first (exports)
    async fn list_all(&self) -> Result<Vec<User>>;

    /// Number of non-deleted users per role
    async fn count_by_role(&self) -> Result<Vec<(UserRole, i64)>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => update_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        const RECORD_LOGIN: &str = "UPDATE users SET last_login = ? WHERE id = ?";

        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(RECORD_LOGIN)
                .bind(at)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(RECORD_LOGIN)
                .bind(at)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to record login")
    }

    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?, filter, params).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_all_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_all_users_mysql(self.pool.mysql()?).await,
        }
    }

    async fn count_by_role(&self) -> Result<Vec<(UserRole, i64)>> {
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(COUNT_BY_ROLE)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count users by role")?
                .iter()
                .map(|row| (row.get::<String, _>("role"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
            DatabaseDriver::Mysql => sqlx::query(COUNT_BY_ROLE)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count users by role")?
                .iter()
                .map(|row| (row.get::<String, _>("role"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
        };

        rows.into_iter()
            .map(|(role, count)| {
                let role = UserRole::from_str(&role)
                    .with_context(|| format!("Invalid role in database: {}", role))?;
                Ok((role, count))
            })
            .collect()
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

const USER_COLUMNS_QUERY_BY_ID: &str = r#"
    SELECT id, email, password_hash, full_name, phone, role, status, avatar_url, bio,
           is_deleted, created_at, updated_at, last_login
    FROM users
    WHERE id = ?
"#;

const USER_QUERY_BY_EMAIL: &str = r#"
    SELECT id, email, password_hash, full_name, phone, role, status, avatar_url, bio,
           is_deleted, created_at, updated_at, last_login
    FROM users
    WHERE email = ?
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users (email, password_hash, full_name, phone, role, status, avatar_url, bio,
                       is_deleted, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_USER: &str = r#"
    UPDATE users
    SET email = ?, password_hash = ?, full_name = ?, phone = ?, role = ?, status = ?,
        avatar_url = ?, bio = ?, is_deleted = ?, updated_at = ?
    WHERE id = ?
"#;

// Optional filters bind twice: `(? IS NULL OR col = ?)`.
const LIST_USERS: &str = r#"
    SELECT id, email, password_hash, full_name, phone, role, status, avatar_url, bio,
           is_deleted, created_at, updated_at, last_login
    FROM users
    WHERE is_deleted = 0
      AND (? IS NULL OR role = ?)
      AND (? IS NULL OR status = ?)
      AND (? IS NULL OR LOWER(email) LIKE ? OR LOWER(full_name) LIKE ?)
    ORDER BY created_at DESC, id DESC
    LIMIT ? OFFSET ?
"#;

const COUNT_USERS: &str = r#"
    SELECT COUNT(*) AS count
    FROM users
    WHERE is_deleted = 0
      AND (? IS NULL OR role = ?)
      AND (? IS NULL OR status = ?)
      AND (? IS NULL OR LOWER(email) LIKE ? OR LOWER(full_name) LIKE ?)
"#;

const LIST_ALL_USERS: &str = r#"
    SELECT id, email, password_hash, full_name, phone, role, status, avatar_url, bio,
           is_deleted, created_at, updated_at, last_login
    FROM users
    WHERE is_deleted = 0
    ORDER BY id ASC
"#;

const COUNT_BY_ROLE: &str =
    "SELECT role, COUNT(*) AS count FROM users WHERE is_deleted = 0 GROUP BY role";

struct UserFilterBinds {
    role: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

impl From<&UserFilter> for UserFilterBinds {
    fn from(filter: &UserFilter) -> Self {
        Self {
            role: filter.role.map(|r| r.to_string()),
            status: filter.status.map(|s| s.to_string()),
            search: filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("%{}%", s.to_lowercase())),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(user.role.to_string())
        .bind(user.status.to_string())
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(user.is_deleted)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(USER_COLUMNS_QUERY_BY_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(USER_QUERY_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(UPDATE_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(user.role.to_string())
        .bind(user.status.to_string())
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(user.is_deleted)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    get_user_by_id_sqlite(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn list_users_sqlite(
    pool: &SqlitePool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let binds = UserFilterBinds::from(filter);

    let rows = sqlx::query(LIST_USERS)
        .bind(&binds.role)
        .bind(&binds.role)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let total: i64 = sqlx::query(COUNT_USERS)
        .bind(&binds.role)
        .bind(&binds.role)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    let users = rows.iter().map(row_to_user_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((users, total))
}

async fn list_all_users_sqlite(pool: &SqlitePool) -> Result<Vec<User>> {
    sqlx::query(LIST_ALL_USERS)
        .fetch_all(pool)
        .await
        .context("Failed to list all users")?
        .iter()
        .map(row_to_user_sqlite)
        .collect()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    let status_str: String = row.get("status");
    let status = UserStatus::from_str(&status_str).unwrap_or_default();

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        phone: row.get("phone"),
        role,
        status,
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login: row.get("last_login"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(user.role.to_string())
        .bind(user.status.to_string())
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(user.is_deleted)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(USER_COLUMNS_QUERY_BY_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(USER_QUERY_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(UPDATE_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(user.role.to_string())
        .bind(user.status.to_string())
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(user.is_deleted)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    get_user_by_id_mysql(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn list_users_mysql(
    pool: &MySqlPool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let binds = UserFilterBinds::from(filter);

    let rows = sqlx::query(LIST_USERS)
        .bind(&binds.role)
        .bind(&binds.role)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let total: i64 = sqlx::query(COUNT_USERS)
        .bind(&binds.role)
        .bind(&binds.role)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    let users = rows.iter().map(row_to_user_mysql).collect::<Result<Vec<_>>>()?;
    Ok((users, total))
}

async fn list_all_users_mysql(pool: &MySqlPool) -> Result<Vec<User>> {
    sqlx::query(LIST_ALL_USERS)
        .fetch_all(pool)
        .await
        .context("Failed to list all users")?
        .iter()
        .map(row_to_user_mysql)
        .collect()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    let status_str: String = row.get("status");
    let status = UserStatus::from_str(&status_str).unwrap_or_default();

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        phone: row.get("phone"),
        role,
        status,
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login: row.get("last_login"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_user(email: &str, role: UserRole) -> User {
        User::new(
            email.to_string(),
            "$argon2id$test".to_string(),
            format!("User {}", email),
            role,
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&test_user("alice@example.com", UserRole::Volunteer))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.email, "alice@example.com");
        assert_eq!(created.role, UserRole::Volunteer);
        assert_eq!(created.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_get_user_by_id_and_email() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&test_user("bob@example.com", UserRole::Organizer))
            .await
            .unwrap();

        let by_id = repo.get_by_id(created.id).await.unwrap().expect("User not found");
        let by_email = repo
            .get_by_email("bob@example.com")
            .await
            .unwrap()
            .expect("User not found");

        assert_eq!(by_id.id, by_email.id);
        assert_eq!(by_id.password_hash, "$argon2id$test");
        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_email_constraint() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("dup@example.com", UserRole::Volunteer))
            .await
            .unwrap();

        let result = repo.create(&test_user("dup@example.com", UserRole::Admin)).await;

        assert!(result.is_err(), "Should fail due to duplicate email");
    }

    #[tokio::test]
    async fn test_update_user() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = repo
            .create(&test_user("carol@example.com", UserRole::Volunteer))
            .await
            .unwrap();

        user.full_name = "Carol Updated".to_string();
        user.role = UserRole::Organizer;
        user.status = UserStatus::Locked;
        user.bio = Some("Loves trees".to_string());

        let updated = repo.update(&user).await.expect("Failed to update user");

        assert_eq!(updated.full_name, "Carol Updated");
        assert_eq!(updated.role, UserRole::Organizer);
        assert_eq!(updated.status, UserStatus::Locked);
        assert_eq!(updated.bio.as_deref(), Some("Loves trees"));
    }

    #[tokio::test]
    async fn test_record_login() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo
            .create(&test_user("dave@example.com", UserRole::Volunteer))
            .await
            .unwrap();
        assert!(user.last_login.is_none());

        repo.record_login(user.id, Utc::now()).await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(found.last_login.is_some());
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("v1@example.com", UserRole::Volunteer)).await.unwrap();
        repo.create(&test_user("v2@example.com", UserRole::Volunteer)).await.unwrap();
        let mut locked = repo
            .create(&test_user("org@example.com", UserRole::Organizer))
            .await
            .unwrap();
        locked.status = UserStatus::Locked;
        repo.update(&locked).await.unwrap();

        let (all, total) = repo
            .list(&UserFilter::default(), &ListParams::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 3);

        let volunteers = UserFilter {
            role: Some(UserRole::Volunteer),
            ..Default::default()
        };
        let (_, total) = repo.list(&volunteers, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);

        let locked_only = UserFilter {
            status: Some(UserStatus::Locked),
            ..Default::default()
        };
        let (users, _) = repo.list(&locked_only, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "org@example.com");

        let search = UserFilter {
            search: Some("V2@".to_string()),
            ..Default::default()
        };
        let (users, _) = repo.list(&search, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&test_user(&format!("u{}@example.com", i), UserRole::Volunteer))
                .await
                .unwrap();
        }

        let (page, total) = repo
            .list(&UserFilter::default(), &ListParams::new(2, 2))
            .await
            .unwrap();

        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_list_all_and_count_by_role() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("a@example.com", UserRole::Admin)).await.unwrap();
        repo.create(&test_user("b@example.com", UserRole::Volunteer)).await.unwrap();
        repo.create(&test_user("c@example.com", UserRole::Volunteer)).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].id < all[2].id);

        let counts = repo.count_by_role().await.unwrap();
        let volunteers = counts
            .iter()
            .find(|(role, _)| *role == UserRole::Volunteer)
            .map(|(_, n)| *n);
        assert_eq!(volunteers, Some(2));
    }
}
