//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the persistence of one aggregate.

pub mod audit;
pub mod event;
pub mod notification;
pub mod post;
pub mod refresh_token;
pub mod registration;
pub mod user;

pub use audit::{AuditRepository, SqlxAuditRepository};
pub use event::{EventRepository, EventWithOrganizer, SqlxEventRepository};
pub use notification::{
    NotificationRepository, PushSubscriptionRepository, SqlxNotificationRepository,
    SqlxPushSubscriptionRepository,
};
pub use post::{PostRepository, SqlxPostRepository};
pub use refresh_token::{RefreshTokenRepository, SqlxRefreshTokenRepository};
pub use registration::{RegistrationRepository, SqlxRegistrationRepository};
pub use user::{SqlxUserRepository, UserRepository};
