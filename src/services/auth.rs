//! Authentication service
//!
//! Registration, login with rate limiting, refresh token rotation, logout,
//! profile management and bearer token authentication.
//!
//! Refresh tokens are single use: a successful refresh revokes the
//! presented token and issues a new pair. The revoke is conditional on the
//! token still being live, so two concurrent refreshes with the same token
//! cannot both succeed.

use crate::db::repositories::{RefreshTokenRepository, UserRepository};
use crate::models::{UpdateProfileInput, User, UserRole};
use crate::services::password::{hash_password, is_acceptable_password, verify_password, MIN_PASSWORD_LENGTH};
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::token::{generate_refresh_token, hash_refresh_token, TokenService};
use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Error types for authentication operations
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Email already in use")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is locked")]
    UserLocked,

    /// Too many attempts; seconds until the caller may retry
    #[error("Too many login attempts, retry in {retry_after} seconds")]
    RateLimited { retry_after: i64 },

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// Missing, malformed or expired access token, or a deleted account
    #[error("{0}")]
    Unauthorized(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Only `volunteer` (default) or `organizer` are accepted
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Token pair plus the identity it was issued to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    tokens: Arc<TokenService>,
    limiter: Arc<LoginRateLimiter>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        tokens: Arc<TokenService>,
        limiter: Arc<LoginRateLimiter>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            tokens,
            limiter,
        }
    }

    /// Login rate limiter, shared with the periodic cleanup task
    pub fn rate_limiter(&self) -> Arc<LoginRateLimiter> {
        self.limiter.clone()
    }

    /// Create a volunteer or organizer account
    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthServiceError> {
        let email = normalize_email(&input.email);
        if !EMAIL_RE.is_match(&email) {
            return Err(AuthServiceError::ValidationError(
                "Invalid email address".to_string(),
            ));
        }
        if !is_acceptable_password(&input.password) {
            return Err(AuthServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        let full_name = input.full_name.trim();
        if full_name.is_empty() {
            return Err(AuthServiceError::ValidationError(
                "Full name is required".to_string(),
            ));
        }
        let role = match input.role.unwrap_or(UserRole::Volunteer) {
            UserRole::Admin => {
                return Err(AuthServiceError::ValidationError(
                    "Cannot register as admin".to_string(),
                ))
            }
            role => role,
        };

        if self
            .users
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(AuthServiceError::EmailInUse);
        }

        let password_hash = hash_password(&input.password)?;
        let mut user = User::new(email, password_hash, full_name.to_string(), role);
        user.phone = non_blank(input.phone);

        let created = self.users.create(&user).await.context("Failed to create user")?;
        tracing::info!("Registered user {} as {}", created.id, created.role);
        Ok(created)
    }

    /// Verify credentials and issue a token pair
    pub async fn login(
        &self,
        input: LoginInput,
        client_ip: Option<IpAddr>,
    ) -> Result<AuthTokens, AuthServiceError> {
        let email = normalize_email(&input.email);

        if let Some(ip) = client_ip {
            if let Some(retry_after) = self.limiter.ip_retry_after(ip).await {
                tracing::warn!("Login rate limit hit for {}", ip);
                return Err(AuthServiceError::RateLimited { retry_after });
            }
            self.limiter.record_ip_request(ip).await;
        }
        if let Some(retry_after) = self.limiter.email_retry_after(&email).await {
            tracing::warn!("Login rate limit hit for {}", email);
            return Err(AuthServiceError::RateLimited { retry_after });
        }

        let user = match self.users.get_by_email(&email).await? {
            Some(user) if !user.is_deleted => user,
            _ => {
                self.limiter.record_failed_attempt(&email).await;
                return Err(AuthServiceError::InvalidCredentials);
            }
        };

        if !verify_password(&input.password, &user.password_hash)? {
            self.limiter.record_failed_attempt(&email).await;
            return Err(AuthServiceError::InvalidCredentials);
        }
        if user.is_locked() {
            return Err(AuthServiceError::UserLocked);
        }

        self.limiter.clear_email_attempts(&email).await;
        self.users
            .record_login(user.id, Utc::now())
            .await
            .context("Failed to record login")?;

        tracing::info!("User {} logged in", user.id);
        self.issue_tokens(&user).await
    }

    /// Rotate a refresh token into a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthServiceError> {
        let stored = self
            .refresh_tokens
            .get_by_hash(&hash_refresh_token(refresh_token.trim()))
            .await?
            .ok_or(AuthServiceError::InvalidRefreshToken)?;

        if stored.revoked {
            return Err(AuthServiceError::InvalidRefreshToken);
        }
        if stored.is_expired() {
            return Err(AuthServiceError::RefreshTokenExpired);
        }

        let user = match self.users.get_by_id(stored.user_id).await? {
            Some(user) if user.is_active() => user,
            _ => return Err(AuthServiceError::InvalidRefreshToken),
        };

        // Lost a race with another refresh or a logout
        if !self.refresh_tokens.revoke(stored.id).await? {
            return Err(AuthServiceError::InvalidRefreshToken);
        }

        self.issue_tokens(&user).await
    }

    /// Revoke a refresh token. Unknown or already revoked tokens are fine.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthServiceError> {
        let hash = hash_refresh_token(refresh_token.trim());
        if let Some(stored) = self.refresh_tokens.get_by_hash(&hash).await? {
            self.refresh_tokens.revoke(stored.id).await?;
        }
        Ok(())
    }

    /// Resolve a bearer access token to a live account
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthServiceError> {
        let claims = self
            .tokens
            .verify_access_token(access_token)
            .map_err(|e| AuthServiceError::Unauthorized(e.to_string()))?;

        let user = self
            .users
            .get_by_id(claims.user_id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or_else(|| AuthServiceError::Unauthorized("User no longer exists".to_string()))?;

        if user.is_locked() {
            return Err(AuthServiceError::UserLocked);
        }
        Ok(user)
    }

    pub async fn me(&self, user_id: i64) -> Result<User, AuthServiceError> {
        self.users
            .get_by_id(user_id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or(AuthServiceError::NotFound)
    }

    /// Update the caller's own profile. Absent fields are left alone;
    /// blank optional fields are cleared.
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, AuthServiceError> {
        let mut user = self.me(user_id).await?;

        if let Some(full_name) = input.full_name {
            let full_name = full_name.trim();
            if full_name.is_empty() {
                return Err(AuthServiceError::ValidationError(
                    "Full name cannot be empty".to_string(),
                ));
            }
            user.full_name = full_name.to_string();
        }
        if input.phone.is_some() {
            user.phone = non_blank(input.phone);
        }
        if input.avatar_url.is_some() {
            user.avatar_url = non_blank(input.avatar_url);
        }
        if input.bio.is_some() {
            user.bio = non_blank(input.bio);
        }
        user.updated_at = Utc::now();

        Ok(self.users.update(&user).await.context("Failed to update profile")?)
    }

    /// Create the configured admin account when it does not exist yet.
    /// Returns whether an account was created.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<bool, AuthServiceError> {
        let email = normalize_email(email);
        if self.users.get_by_email(&email).await?.is_some() {
            tracing::debug!("Seed admin {} already exists", email);
            return Ok(false);
        }
        if !EMAIL_RE.is_match(&email) || !is_acceptable_password(password) {
            return Err(AuthServiceError::ValidationError(
                "Seed admin email or password is invalid".to_string(),
            ));
        }

        let user = User::new(
            email,
            hash_password(password)?,
            "Administrator".to_string(),
            UserRole::Admin,
        );
        let created = self.users.create(&user).await.context("Failed to seed admin")?;
        tracing::info!("Seeded admin account {}", created.email);
        Ok(true)
    }

    async fn issue_tokens(&self, user: &User) -> Result<AuthTokens, AuthServiceError> {
        let access_token = self.tokens.issue_access_token(user)?;
        let refresh_token = generate_refresh_token();
        self.refresh_tokens
            .create(
                user.id,
                &hash_refresh_token(&refresh_token),
                self.tokens.refresh_expiry(),
            )
            .await
            .context("Failed to store refresh token")?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
