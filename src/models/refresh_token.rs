//! Refresh token model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored refresh token.
///
/// Only the SHA-256 digest of the token is persisted; the raw value is handed
/// to the client once and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    /// Hex-encoded SHA-256 of the raw token
    pub token_hash: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Not revoked and not expired
    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}
