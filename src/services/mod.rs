//! Services layer - Business logic
//!
//! This module contains all business logic services for VolunteerHub.
//! Services are responsible for:
//! - Implementing business rules and role checks
//! - Coordinating between repositories, the cache and notifications
//! - Handling validation and error cases
//! - Recording privileged actions in the audit trail

pub mod admin;
pub mod audit;
pub mod auth;
pub mod event;
pub mod export;
pub mod notification;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod registration;
pub mod token;

pub use admin::{AdminNotifyInput, AdminService, AdminServiceError, DashboardCounts};
pub use audit::AuditService;
pub use auth::{AuthService, AuthServiceError, AuthTokens, LoginInput, RegisterInput};
pub use event::{generate_slug, EventAction, EventService, EventServiceError};
pub use export::{ExportFile, ExportFormat};
pub use notification::{NotificationService, NotificationServiceError};
pub use password::{hash_password, verify_password};
pub use post::{LikeOutcome, PostService, PostServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use registration::{RegistrationService, RegistrationServiceError};
pub use token::{AccessClaims, TokenError, TokenService};
