//! Event model
//!
//! Volunteer events published by organizers and moderated by admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::timestamp;

/// A volunteer event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub organizer_id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: Option<String>,
    pub location: String,
    pub address: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Capacity; `None` means unlimited
    pub max_volunteers: Option<i32>,
    /// Number of approved registrations
    pub current_volunteers: i32,
    pub status: EventStatus,
    pub image_url: Option<String>,
    pub requirements: Option<String>,
    pub benefits: Option<String>,
    pub contact_info: Option<String>,
    #[serde(default, skip_serializing)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Bumped on every write
    #[serde(default)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
}

impl Event {
    /// Capacity reached
    pub fn is_full(&self) -> bool {
        matches!(self.max_volunteers, Some(max) if self.current_volunteers >= max)
    }

    pub fn has_started(&self) -> bool {
        self.start_date <= Utc::now()
    }

    pub fn has_ended(&self) -> bool {
        self.end_date <= Utc::now()
    }

    /// Volunteers may still sign up
    pub fn accepts_registrations(&self) -> bool {
        self.status == EventStatus::Approved && !self.is_deleted && !self.has_ended()
    }
}

/// Moderation and lifecycle state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Waiting for admin approval
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl EventStatus {
    /// Final states that can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Cancelled | EventStatus::Completed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Rejected => "rejected",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl FromStr for EventStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "approved" => Ok(EventStatus::Approved),
            "rejected" => Ok(EventStatus::Rejected),
            "cancelled" | "canceled" => Ok(EventStatus::Cancelled),
            "completed" => Ok(EventStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid event status: {}", s)),
        }
    }
}

/// Body of create and update requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub location: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub start_date: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub max_volunteers: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub benefits: Option<String>,
    #[serde(default)]
    pub contact_info: Option<String>,
}

/// Filters for event listings.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub category: Option<String>,
    pub status: Option<EventStatus>,
    /// Case-insensitive match on name, description or location
    pub search: Option<String>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
    pub organizer_id: Option<i64>,
}
