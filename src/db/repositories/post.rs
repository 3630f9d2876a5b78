//! Post repository
//!
//! Event discussion posts together with their comments and likes. The
//! denormalized `likes_count` and `comments_count` columns are maintained
//! here, next to the rows they count.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreatePostInput, ListParams, Post, PostComment, PostLike};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a post on an event wall
    async fn create(&self, event_id: i64, user_id: i64, input: &CreatePostInput) -> Result<Post>;

    /// Get a post by ID, including soft-deleted rows
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Non-deleted posts of an event, newest first
    async fn list_for_event(&self, event_id: i64, params: &ListParams) -> Result<(Vec<Post>, i64)>;

    /// Mark a post deleted
    async fn soft_delete(&self, id: i64) -> Result<bool>;

    /// Add a comment and bump the post's comment counter
    async fn add_comment(&self, post_id: i64, user_id: i64, content: &str) -> Result<PostComment>;

    /// Comments of a post, oldest first
    async fn list_comments(&self, post_id: i64) -> Result<Vec<PostComment>>;

    /// Like a post. Returns `false` if the user already liked it.
    async fn add_like(&self, post_id: i64, user_id: i64) -> Result<bool>;

    /// Remove a like. Returns `false` if there was none.
    async fn remove_like(&self, post_id: i64, user_id: i64) -> Result<bool>;

    /// Likes of a post, oldest first
    async fn list_likes(&self, post_id: i64) -> Result<Vec<PostLike>>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, event_id: i64, user_id: i64, input: &CreatePostInput) -> Result<Post> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_POST)
                .bind(event_id)
                .bind(user_id)
                .bind(&input.content)
                .bind(&input.image_url)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create post")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_POST)
                .bind(event_id)
                .bind(user_id)
                .bind(&input.content)
                .bind(&input.image_url)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create post")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SELECT_POST_BY_ID)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get post")?;
                Ok(row.as_ref().map(row_to_post_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(SELECT_POST_BY_ID)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get post")?;
                Ok(row.as_ref().map(row_to_post_mysql))
            }
        }
    }

    async fn list_for_event(
        &self,
        event_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<Post>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_posts_sqlite(self.pool.sqlite()?, event_id, params).await
            }
            DatabaseDriver::Mysql => list_posts_mysql(self.pool.mysql()?, event_id, params).await,
        }
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SOFT_DELETE_POST)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(SOFT_DELETE_POST)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete post")?;

        Ok(affected > 0)
    }

    async fn add_comment(&self, post_id: i64, user_id: i64, content: &str) -> Result<PostComment> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                add_comment_sqlite(self.pool.sqlite()?, post_id, user_id, content).await
            }
            DatabaseDriver::Mysql => {
                add_comment_mysql(self.pool.mysql()?, post_id, user_id, content).await
            }
        }
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<PostComment>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(LIST_COMMENTS)
                .bind(post_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(LIST_COMMENTS)
                .bind(post_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_mysql)
                .collect()),
        }
    }

    async fn add_like(&self, post_id: i64, user_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => add_like_sqlite(self.pool.sqlite()?, post_id, user_id).await,
            DatabaseDriver::Mysql => add_like_mysql(self.pool.mysql()?, post_id, user_id).await,
        }
    }

    async fn remove_like(&self, post_id: i64, user_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                remove_like_sqlite(self.pool.sqlite()?, post_id, user_id).await
            }
            DatabaseDriver::Mysql => remove_like_mysql(self.pool.mysql()?, post_id, user_id).await,
        }
    }

    async fn list_likes(&self, post_id: i64) -> Result<Vec<PostLike>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(LIST_LIKES)
                .bind(post_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list likes")?
                .iter()
                .map(|row| PostLike {
                    id: row.get("id"),
                    post_id: row.get("post_id"),
                    user_id: row.get("user_id"),
                    user_name: row.get("user_name"),
                    created_at: row.get("created_at"),
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(LIST_LIKES)
                .bind(post_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list likes")?
                .iter()
                .map(|row| PostLike {
                    id: row.get("id"),
                    post_id: row.get("post_id"),
                    user_id: row.get("user_id"),
                    user_name: row.get("user_name"),
                    created_at: row.get("created_at"),
                })
                .collect()),
        }
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

const INSERT_POST: &str = r#"
    INSERT INTO posts (event_id, user_id, content, image_url, likes_count, comments_count,
                       is_deleted, created_at, updated_at)
    VALUES (?, ?, ?, ?, 0, 0, 0, ?, ?)
"#;

const SELECT_POST_BY_ID: &str = r#"
    SELECT p.id, p.event_id, p.user_id, u.full_name AS user_name, p.content, p.image_url,
           p.likes_count, p.comments_count, p.is_deleted, p.created_at, p.updated_at
    FROM posts p
    LEFT JOIN users u ON u.id = p.user_id
    WHERE p.id = ?
"#;

const LIST_POSTS: &str = r#"
    SELECT p.id, p.event_id, p.user_id, u.full_name AS user_name, p.content, p.image_url,
           p.likes_count, p.comments_count, p.is_deleted, p.created_at, p.updated_at
    FROM posts p
    LEFT JOIN users u ON u.id = p.user_id
    WHERE p.event_id = ? AND p.is_deleted = 0
    ORDER BY p.created_at DESC, p.id DESC
    LIMIT ? OFFSET ?
"#;

const COUNT_POSTS: &str =
    "SELECT COUNT(*) AS count FROM posts WHERE event_id = ? AND is_deleted = 0";

const SOFT_DELETE_POST: &str =
    "UPDATE posts SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0";

const INSERT_COMMENT: &str = r#"
    INSERT INTO post_comments (post_id, user_id, content, is_deleted, created_at)
    VALUES (?, ?, ?, 0, ?)
"#;

const SELECT_COMMENT_BY_ID: &str = r#"
    SELECT c.id, c.post_id, c.user_id, u.full_name AS user_name, c.content, c.created_at
    FROM post_comments c
    LEFT JOIN users u ON u.id = c.user_id
    WHERE c.id = ?
"#;

const LIST_COMMENTS: &str = r#"
    SELECT c.id, c.post_id, c.user_id, u.full_name AS user_name, c.content, c.created_at
    FROM post_comments c
    LEFT JOIN users u ON u.id = c.user_id
    WHERE c.post_id = ? AND c.is_deleted = 0
    ORDER BY c.created_at ASC, c.id ASC
"#;

const BUMP_COMMENTS: &str =
    "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?";

const BUMP_LIKES: &str = "UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?";

const DROP_LIKES: &str =
    "UPDATE posts SET likes_count = likes_count - 1 WHERE id = ? AND likes_count > 0";

const DELETE_LIKE: &str = "DELETE FROM post_likes WHERE post_id = ? AND user_id = ?";

const LIST_LIKES: &str = r#"
    SELECT l.id, l.post_id, l.user_id, u.full_name AS user_name, l.created_at
    FROM post_likes l
    LEFT JOIN users u ON u.id = l.user_id
    WHERE l.post_id = ?
    ORDER BY l.created_at ASC, l.id ASC
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_posts_sqlite(
    pool: &SqlitePool,
    event_id: i64,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let rows = sqlx::query(LIST_POSTS)
        .bind(event_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let total: i64 = sqlx::query(COUNT_POSTS)
        .bind(event_id)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    Ok((rows.iter().map(row_to_post_sqlite).collect(), total))
}

async fn add_comment_sqlite(
    pool: &SqlitePool,
    post_id: i64,
    user_id: i64,
    content: &str,
) -> Result<PostComment> {
    let id = sqlx::query(INSERT_COMMENT)
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to create comment")?
        .last_insert_rowid();

    sqlx::query(BUMP_COMMENTS)
        .bind(post_id)
        .execute(pool)
        .await
        .context("Failed to update comment count")?;

    let row = sqlx::query(SELECT_COMMENT_BY_ID)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to load comment")?;
    Ok(row_to_comment_sqlite(&row))
}

async fn add_like_sqlite(pool: &SqlitePool, post_id: i64, user_id: i64) -> Result<bool> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to like post")?
    .rows_affected()
        > 0;

    if inserted {
        sqlx::query(BUMP_LIKES)
            .bind(post_id)
            .execute(pool)
            .await
            .context("Failed to update like count")?;
    }
    Ok(inserted)
}

async fn remove_like_sqlite(pool: &SqlitePool, post_id: i64, user_id: i64) -> Result<bool> {
    let removed = sqlx::query(DELETE_LIKE)
        .bind(post_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to unlike post")?
        .rows_affected()
        > 0;

    if removed {
        sqlx::query(DROP_LIKES)
            .bind(post_id)
            .execute(pool)
            .await
            .context("Failed to update like count")?;
    }
    Ok(removed)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        event_id: row.get("event_id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        content: row.get("content"),
        image_url: row.get("image_url"),
        likes_count: row.get("likes_count"),
        comments_count: row.get("comments_count"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> PostComment {
    PostComment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_posts_mysql(
    pool: &MySqlPool,
    event_id: i64,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let rows = sqlx::query(LIST_POSTS)
        .bind(event_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let total: i64 = sqlx::query(COUNT_POSTS)
        .bind(event_id)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    Ok((rows.iter().map(row_to_post_mysql).collect(), total))
}

async fn add_comment_mysql(
    pool: &MySqlPool,
    post_id: i64,
    user_id: i64,
    content: &str,
) -> Result<PostComment> {
    let id = sqlx::query(INSERT_COMMENT)
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to create comment")?
        .last_insert_id() as i64;

    sqlx::query(BUMP_COMMENTS)
        .bind(post_id)
        .execute(pool)
        .await
        .context("Failed to update comment count")?;

    let row = sqlx::query(SELECT_COMMENT_BY_ID)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to load comment")?;
    Ok(row_to_comment_mysql(&row))
}

async fn add_like_mysql(pool: &MySqlPool, post_id: i64, user_id: i64) -> Result<bool> {
    let inserted = sqlx::query(
        "INSERT IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to like post")?
    .rows_affected()
        > 0;

    if inserted {
        sqlx::query(BUMP_LIKES)
            .bind(post_id)
            .execute(pool)
            .await
            .context("Failed to update like count")?;
    }
    Ok(inserted)
}

async fn remove_like_mysql(pool: &MySqlPool, post_id: i64, user_id: i64) -> Result<bool> {
    let removed = sqlx::query(DELETE_LIKE)
        .bind(post_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to unlike post")?
        .rows_affected()
        > 0;

    if removed {
        sqlx::query(DROP_LIKES)
            .bind(post_id)
            .execute(pool)
            .await
            .context("Failed to update like count")?;
    }
    Ok(removed)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    Post {
        id: row.get("id"),
        event_id: row.get("event_id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        content: row.get("content"),
        image_url: row.get("image_url"),
        likes_count: row.get("likes_count"),
        comments_count: row.get("comments_count"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> PostComment {
    PostComment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}
