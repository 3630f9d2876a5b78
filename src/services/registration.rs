//! Registration service
//!
//! Volunteers sign up for approved events; the event's organizer (or an
//! admin) reviews each sign-up.
//!
//! ```text
//! pending --approve--> approved --complete--> completed
//!    |                    |
//!    +--reject--> rejected <--+
//!    |                    |
//!    +--cancel--> cancelled <-+   (volunteer, before the event starts)
//! cancelled --register--> pending
//! ```
//!
//! `current_volunteers` counts seats held by approved registrations.
//! Seats are taken with a guarded increment before the status write and
//! given back when an approved registration leaves that state, so the
//! count can never exceed `max_volunteers`. Completed registrations keep
//! their seat.

use crate::db::repositories::RegistrationRepository;
use crate::models::{
    AttendanceStatus, Event, NewNotification, Registration, RegistrationStatus, User, UserRole,
};
use crate::services::audit::AuditService;
use crate::services::event::{EventService, EventServiceError};
use crate::services::notification::NotificationService;
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Error types for registration operations
#[derive(Debug, thiserror::Error)]
pub enum RegistrationServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// The event or registration is not in a state that allows this
    #[error("{0}")]
    InvalidState(String),

    #[error("Already registered")]
    AlreadyRegistered,

    #[error("Event is full")]
    EventFull,

    /// Another request changed the registration first
    #[error("Registration was modified concurrently, please retry")]
    Conflict,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<EventServiceError> for RegistrationServiceError {
    fn from(err: EventServiceError) -> Self {
        match err {
            EventServiceError::NotFound => Self::NotFound("Event not found".to_string()),
            EventServiceError::Forbidden(msg) => Self::Forbidden(msg),
            EventServiceError::ValidationError(msg) | EventServiceError::InvalidTransition(msg) => {
                Self::InvalidState(msg)
            }
            EventServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Registration service
pub struct RegistrationService {
    repo: Arc<dyn RegistrationRepository>,
    events: Arc<EventService>,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditService>,
}

impl RegistrationService {
    pub fn new(
        repo: Arc<dyn RegistrationRepository>,
        events: Arc<EventService>,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            repo,
            events,
            notifications,
            audit,
        }
    }

    /// Sign up for an event. A cancelled registration is reactivated.
    pub async fn register(
        &self,
        volunteer: &User,
        event_id: i64,
        note: Option<String>,
    ) -> Result<Registration, RegistrationServiceError> {
        if volunteer.role != UserRole::Volunteer {
            return Err(RegistrationServiceError::Forbidden(
                "Only volunteers can register for events".to_string(),
            ));
        }

        let event = self.events.get_fresh(event_id).await?;
        if !event.accepts_registrations() {
            return Err(RegistrationServiceError::InvalidState(
                "Event is not open for registration".to_string(),
            ));
        }

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        match self.repo.get_for_volunteer(event_id, volunteer.id).await? {
            Some(existing) if existing.status == RegistrationStatus::Cancelled => {
                let now = Utc::now();
                let mut reactivated = existing;
                reactivated.status = RegistrationStatus::Pending;
                reactivated.note = note;
                reactivated.organizer_note = None;
                reactivated.attendance_status = None;
                reactivated.completion_note = None;
                reactivated.registered_at = now;
                reactivated.approved_at = None;
                reactivated.completed_at = None;
                reactivated.cancelled_at = None;

                self.repo
                    .transition(&reactivated, RegistrationStatus::Cancelled)
                    .await?
                    .ok_or(RegistrationServiceError::AlreadyRegistered)
            }
            Some(_) => Err(RegistrationServiceError::AlreadyRegistered),
            None => {
                let created = self
                    .repo
                    .create(event_id, volunteer.id, note.as_deref())
                    .await
                    .context("Failed to create registration")?;
                tracing::info!(
                    "Volunteer {} registered for event {}",
                    volunteer.id,
                    event_id
                );
                Ok(created)
            }
        }
    }

    /// Withdraw a registration; only its volunteer, only before the event
    /// starts.
    pub async fn cancel(
        &self,
        user: &User,
        event_id: i64,
        registration_id: i64,
    ) -> Result<Registration, RegistrationServiceError> {
        let registration = self.load(event_id, registration_id).await?;
        if registration.volunteer_id != user.id {
            return Err(RegistrationServiceError::Forbidden(
                "Not allowed to cancel this registration".to_string(),
            ));
        }

        let event = self.events.get_fresh(event_id).await?;
        if event.has_started() {
            return Err(RegistrationServiceError::InvalidState(
                "Cannot cancel after event start".to_string(),
            ));
        }

        let previous = registration.status;
        if !matches!(previous, RegistrationStatus::Pending | RegistrationStatus::Approved) {
            return Err(RegistrationServiceError::InvalidState(format!(
                "Registration is already {}",
                previous
            )));
        }

        let mut cancelled = registration;
        cancelled.status = RegistrationStatus::Cancelled;
        cancelled.cancelled_at = Some(Utc::now());
        let saved = self
            .repo
            .transition(&cancelled, previous)
            .await?
            .ok_or(RegistrationServiceError::Conflict)?;

        if previous == RegistrationStatus::Approved {
            self.events.release_seat(event_id).await?;
        }
        Ok(saved)
    }

    /// Caller's registrations, newest first
    pub async fn list_mine(&self, user: &User) -> Result<Vec<Registration>, RegistrationServiceError> {
        Ok(self.repo.list_for_volunteer(user.id).await?)
    }

    /// Caller's registration for one event
    pub async fn my_registration(
        &self,
        user: &User,
        event_id: i64,
    ) -> Result<Registration, RegistrationServiceError> {
        self.repo
            .get_for_volunteer(event_id, user.id)
            .await?
            .ok_or_else(|| RegistrationServiceError::NotFound("Registration not found".to_string()))
    }

    /// Registrations of an event; organizer or admin only
    pub async fn list_for_event(
        &self,
        actor: &User,
        event_id: i64,
    ) -> Result<Vec<Registration>, RegistrationServiceError> {
        self.managed_event(actor, event_id).await?;
        Ok(self.repo.list_for_event(event_id).await?)
    }

    /// Accept a pending registration, taking a seat
    pub async fn approve(
        &self,
        actor: &User,
        event_id: i64,
        registration_id: i64,
    ) -> Result<Registration, RegistrationServiceError> {
        let event = self.managed_event(actor, event_id).await?;
        let registration = self.load(event_id, registration_id).await?;
        if registration.status != RegistrationStatus::Pending {
            return Err(RegistrationServiceError::InvalidState(format!(
                "Cannot approve a registration that is {}",
                registration.status
            )));
        }

        if !self.events.reserve_seat(event_id).await? {
            return Err(RegistrationServiceError::EventFull);
        }

        let mut approved = registration;
        approved.status = RegistrationStatus::Approved;
        approved.approved_at = Some(Utc::now());
        let saved = match self.repo.transition(&approved, RegistrationStatus::Pending).await {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                self.events.release_seat(event_id).await?;
                return Err(RegistrationServiceError::Conflict);
            }
            Err(e) => {
                self.events.release_seat(event_id).await?;
                return Err(e.into());
            }
        };

        self.notifications
            .notify_quietly(
                NewNotification::new(saved.volunteer_id, "registration_approved", "Registration approved")
                    .message(format!(
                        "Your registration for \"{}\" has been approved.",
                        event.name
                    ))
                    .link(format!("/events/{}", event.id))
                    .payload(json!({ "eventId": event.id, "registrationId": saved.id })),
            )
            .await;
        self.audit
            .record(
                Some(actor.id),
                "registration:approve",
                Some(json!({
                    "eventId": event.id,
                    "registrationId": saved.id,
                    "volunteerId": saved.volunteer_id,
                })),
            )
            .await;

        Ok(saved)
    }

    /// Turn down a pending or approved registration. Rejecting an approved
    /// registration frees its seat.
    pub async fn reject(
        &self,
        actor: &User,
        event_id: i64,
        registration_id: i64,
        reason: Option<String>,
    ) -> Result<Registration, RegistrationServiceError> {
        let event = self.managed_event(actor, event_id).await?;
        let registration = self.load(event_id, registration_id).await?;
        let previous = registration.status;
        if !matches!(previous, RegistrationStatus::Pending | RegistrationStatus::Approved) {
            return Err(RegistrationServiceError::InvalidState(format!(
                "Cannot reject a registration that is {}",
                previous
            )));
        }

        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let mut rejected = registration;
        rejected.status = RegistrationStatus::Rejected;
        rejected.organizer_note = reason.clone();
        rejected.approved_at = Some(Utc::now());
        let saved = self
            .repo
            .transition(&rejected, previous)
            .await?
            .ok_or(RegistrationServiceError::Conflict)?;

        if previous == RegistrationStatus::Approved {
            self.events.release_seat(event_id).await?;
        }

        let mut message = format!("Your registration for \"{}\" was not accepted.", event.name);
        if let Some(reason) = &reason {
            message.push_str(&format!(" Reason: {}", reason));
        }
        self.notifications
            .notify_quietly(
                NewNotification::new(saved.volunteer_id, "registration_rejected", "Registration rejected")
                    .message(message)
                    .link(format!("/events/{}", event.id))
                    .payload(json!({ "eventId": event.id, "registrationId": saved.id })),
            )
            .await;
        self.audit
            .record(
                Some(actor.id),
                "registration:reject",
                Some(json!({
                    "eventId": event.id,
                    "registrationId": saved.id,
                    "volunteerId": saved.volunteer_id,
                    "reason": reason,
                })),
            )
            .await;

        Ok(saved)
    }

    /// Record attendance for an approved registration
    pub async fn complete(
        &self,
        actor: &User,
        event_id: i64,
        registration_id: i64,
        present: bool,
        note: Option<String>,
    ) -> Result<Registration, RegistrationServiceError> {
        self.managed_event(actor, event_id).await?;
        let registration = self.load(event_id, registration_id).await?;
        if registration.status != RegistrationStatus::Approved {
            return Err(RegistrationServiceError::InvalidState(
                "Only approved registrations can be completed".to_string(),
            ));
        }

        let mut completed = registration;
        completed.status = RegistrationStatus::Completed;
        completed.attendance_status = Some(AttendanceStatus::from(present));
        completed.completion_note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        completed.completed_at = Some(Utc::now());
        let saved = self
            .repo
            .transition(&completed, RegistrationStatus::Approved)
            .await?
            .ok_or(RegistrationServiceError::Conflict)?;

        self.audit
            .record(
                Some(actor.id),
                "registration:complete",
                Some(json!({
                    "eventId": event_id,
                    "registrationId": saved.id,
                    "present": present,
                })),
            )
            .await;
        Ok(saved)
    }

    /// Whether the user may take part in the event discussion
    pub async fn is_participant(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<bool, RegistrationServiceError> {
        Ok(self
            .repo
            .get_for_volunteer(event_id, user_id)
            .await?
            .is_some_and(|r| r.is_participant()))
    }

    async fn load(
        &self,
        event_id: i64,
        registration_id: i64,
    ) -> Result<Registration, RegistrationServiceError> {
        self.repo
            .get_by_id(registration_id)
            .await?
            .filter(|r| r.event_id == event_id)
            .ok_or_else(|| RegistrationServiceError::NotFound("Registration not found".to_string()))
    }

    async fn managed_event(&self, actor: &User, event_id: i64) -> Result<Event, RegistrationServiceError> {
        let event = self.events.get_fresh(event_id).await?;
        if !actor.can_manage(event.organizer_id) {
            return Err(RegistrationServiceError::Forbidden(
                "Not allowed to manage registrations of this event".to_string(),
            ));
        }
        Ok(event)
    }
}
