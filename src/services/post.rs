//! Event discussion service
//!
//! Each approved event has a wall of posts. Only participants may write
//! on it: admins, the event organizer, and volunteers whose registration
//! is approved or completed. Reading is open to anyone who can see the
//! event.

use crate::db::repositories::{PostRepository, RegistrationRepository};
use crate::models::{
    CreateCommentInput, CreatePostInput, Event, EventStatus, ListParams, PagedResult, Post,
    PostComment, PostLike, User,
};
use crate::services::event::{EventService, EventServiceError};
use anyhow::Context;
use std::sync::Arc;

/// Maximum post length in characters
pub const POST_MAX_LEN: usize = 5000;

/// Maximum comment length in characters
pub const COMMENT_MAX_LEN: usize = 1000;

/// Error types for discussion operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("Not allowed to post on this event")]
    NotParticipant,

    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<EventServiceError> for PostServiceError {
    fn from(err: EventServiceError) -> Self {
        match err {
            EventServiceError::NotFound => Self::NotFound("Event not found".to_string()),
            EventServiceError::Forbidden(msg) => Self::Forbidden(msg),
            EventServiceError::ValidationError(msg) | EventServiceError::InvalidTransition(msg) => {
                Self::ValidationError(msg)
            }
            EventServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Result of toggling a like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    /// Whether the like set changed
    pub changed: bool,
    pub likes_count: i32,
}

/// Discussion service
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    events: Arc<EventService>,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        events: Arc<EventService>,
    ) -> Self {
        Self {
            repo,
            registrations,
            events,
        }
    }

    /// Posts of an event, newest first
    pub async fn list(
        &self,
        event_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        self.events.get(event_id).await?;
        let (posts, total) = self.repo.list_for_event(event_id, params).await?;
        Ok(PagedResult::new(posts, total, params))
    }

    /// Write a post on an approved event's wall
    pub async fn create(
        &self,
        author: &User,
        event_id: i64,
        input: CreatePostInput,
    ) -> Result<Post, PostServiceError> {
        let event = self.events.get(event_id).await?;
        if event.status != EventStatus::Approved {
            return Err(PostServiceError::ValidationError(
                "Discussion is only open on approved events".to_string(),
            ));
        }
        self.ensure_participant(author, &event).await?;

        let content = validate_text(&input.content, "Post", POST_MAX_LEN)?;
        let input = CreatePostInput {
            content,
            image_url: input
                .image_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        };

        let post = self
            .repo
            .create(event_id, author.id, &input)
            .await
            .context("Failed to create post")?;
        tracing::debug!("User {} posted {} on event {}", author.id, post.id, event_id);
        Ok(post)
    }

    /// Single live post
    pub async fn get(&self, post_id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(post_id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| PostServiceError::NotFound("Post not found".to_string()))
    }

    /// Soft-delete a post; its author or an admin
    pub async fn delete(&self, actor: &User, post_id: i64) -> Result<(), PostServiceError> {
        let post = self.get(post_id).await?;
        if !actor.can_manage(post.user_id) {
            return Err(PostServiceError::Forbidden(
                "Not allowed to delete this post".to_string(),
            ));
        }
        self.repo.soft_delete(post_id).await?;
        Ok(())
    }

    /// Comment on a post; participants of its event only
    pub async fn comment(
        &self,
        author: &User,
        post_id: i64,
        input: CreateCommentInput,
    ) -> Result<PostComment, PostServiceError> {
        let post = self.get(post_id).await?;
        let event = self.events.get(post.event_id).await?;
        self.ensure_participant(author, &event).await?;

        let content = validate_text(&input.content, "Comment", COMMENT_MAX_LEN)?;
        Ok(self.repo.add_comment(post_id, author.id, &content).await?)
    }

    /// Comments of a post, oldest first
    pub async fn comments(&self, post_id: i64) -> Result<Vec<PostComment>, PostServiceError> {
        self.get(post_id).await?;
        Ok(self.repo.list_comments(post_id).await?)
    }

    /// Like a post. Liking twice is a no-op.
    pub async fn like(&self, user: &User, post_id: i64) -> Result<LikeOutcome, PostServiceError> {
        let post = self.get(post_id).await?;
        let event = self.events.get(post.event_id).await?;
        self.ensure_participant(user, &event).await?;

        let changed = self.repo.add_like(post_id, user.id).await?;
        let likes_count = self.get(post_id).await?.likes_count;
        Ok(LikeOutcome {
            changed,
            likes_count,
        })
    }

    /// Remove a like. Unliking a post that was never liked is a no-op.
    pub async fn unlike(&self, user: &User, post_id: i64) -> Result<LikeOutcome, PostServiceError> {
        self.get(post_id).await?;
        let changed = self.repo.remove_like(post_id, user.id).await?;
        let likes_count = self.get(post_id).await?.likes_count;
        Ok(LikeOutcome {
            changed,
            likes_count,
        })
    }

    /// Users who liked a post
    pub async fn likes(&self, post_id: i64) -> Result<Vec<PostLike>, PostServiceError> {
        self.get(post_id).await?;
        Ok(self.repo.list_likes(post_id).await?)
    }

    /// Admins, the organizer, and approved or completed volunteers
    pub async fn is_participant(&self, user: &User, event: &Event) -> Result<bool, PostServiceError> {
        if user.can_manage(event.organizer_id) {
            return Ok(true);
        }
        Ok(self
            .registrations
            .get_for_volunteer(event.id, user.id)
            .await?
            .is_some_and(|r| r.is_participant()))
    }

    async fn ensure_participant(&self, user: &User, event: &Event) -> Result<(), PostServiceError> {
        if self.is_participant(user, event).await? {
            Ok(())
        } else {
            Err(PostServiceError::NotParticipant)
        }
    }
}

fn validate_text(raw: &str, what: &str, max_len: usize) -> Result<String, PostServiceError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(PostServiceError::ValidationError(format!(
            "{} content cannot be empty",
            what
        )));
    }
    if text.chars().count() > max_len {
        return Err(PostServiceError::ValidationError(format!(
            "{} content cannot exceed {} characters",
            what, max_len
        )));
    }
    Ok(text.to_string())
}
