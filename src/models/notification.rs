//! In-app notifications and browser push subscriptions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification shown in the user's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    /// Free-form category, e.g. `registration_approved` or `admin`
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: Option<String>,
    /// Raw JSON payload for the client
    pub payload: Option<String>,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Data needed to create a notification
#[derive(Debug, Clone, Default)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: String,
    pub title: String,
    pub message: Option<String>,
    pub payload: Option<String>,
    pub link: Option<String>,
}

impl NewNotification {
    pub fn new(user_id: i64, kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: kind.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload.to_string());
        self
    }
}

/// A browser push endpoint registered by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: i64,
    pub endpoint: String,
    /// Normalized `{"p256dh": ..., "auth": ...}`
    pub keys_json: String,
    pub created_at: DateTime<Utc>,
}
