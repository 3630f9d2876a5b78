//! Registration model
//!
//! A volunteer's sign-up for an event and its review outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A volunteer's registration for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub volunteer_id: i64,
    pub status: RegistrationStatus,
    /// Volunteer's note at sign-up
    pub note: Option<String>,
    /// Organizer's note on approval or rejection
    pub organizer_note: Option<String>,
    pub attendance_status: Option<AttendanceStatus>,
    pub completion_note: Option<String>,
    pub registered_at: DateTime<Utc>,
    /// Time the organizer decided on the registration. Despite the name it
    /// is also set on rejection, so a rejected registration carries the
    /// rejection time here, not an approval.
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_email: Option<String>,
}

impl Registration {
    /// Holds a seat in the event (counts toward `current_volunteers`)
    pub fn occupies_seat(&self) -> bool {
        self.status == RegistrationStatus::Approved
    }

    /// Grants access to the event discussion
    pub fn is_participant(&self) -> bool {
        matches!(
            self.status,
            RegistrationStatus::Approved | RegistrationStatus::Completed
        )
    }
}

/// Review state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl FromStr for RegistrationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "rejected" => Ok(RegistrationStatus::Rejected),
            "cancelled" | "canceled" => Ok(RegistrationStatus::Cancelled),
            "completed" => Ok(RegistrationStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid registration status: {}", s)),
        }
    }
}

/// Attendance recorded when a registration is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl From<bool> for AttendanceStatus {
    fn from(present: bool) -> Self {
        if present {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => f.write_str("present"),
            AttendanceStatus::Absent => f.write_str("absent"),
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            _ => Err(anyhow::anyhow!("Invalid attendance status: {}", s)),
        }
    }
}
