//! Data models
//!
//! This module contains the data structures used throughout VolunteerHub:
//! - Database entities (User, RefreshToken, Event, Registration, Post,
//!   PostComment, PostLike, Notification, PushSubscription, AuditLog)
//! - Request inputs and listing filters
//! - Pagination primitives

mod audit;
mod event;
mod notification;
mod paging;
mod post;
mod refresh_token;
mod registration;
pub mod timestamp;
mod user;

pub use audit::{AuditFilter, AuditLog};
pub use event::{Event, EventFilter, EventInput, EventStatus};
pub use notification::{NewNotification, Notification, PushSubscription};
pub use paging::{ListParams, PagedResult, MAX_PAGE_SIZE};
pub use post::{CreateCommentInput, CreatePostInput, Post, PostComment, PostLike};
pub use refresh_token::RefreshToken;
pub use registration::{AttendanceStatus, Registration, RegistrationStatus};
pub use user::{UpdateProfileInput, User, UserFilter, UserRole, UserStatus};
