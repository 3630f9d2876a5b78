//! Event service
//!
//! Implements event management:
//! - Creation and editing by organizers, with validation
//! - Moderation (approve, reject) by admins
//! - Lifecycle changes (cancel, complete) with organizer notifications
//! - Public listing and cached detail lookups

use crate::cache::{event_key, CacheLayer, SharedCache};
use crate::db::repositories::EventRepository;
use crate::models::{
    Event, EventFilter, EventInput, EventStatus, ListParams, NewNotification, PagedResult, User,
    UserRole,
};
use crate::services::audit::AuditService;
use crate::services::notification::NotificationService;
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Name length bounds, in characters
const NAME_MIN_LEN: usize = 5;
const NAME_MAX_LEN: usize = 255;
const DESCRIPTION_MIN_LEN: usize = 20;

/// Error types for event service operations
#[derive(Debug, thiserror::Error)]
pub enum EventServiceError {
    #[error("Event not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    ValidationError(String),

    /// The event's current status does not allow the requested change
    #[error("{0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Lifecycle actions on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Approve,
    Reject,
    Cancel,
    Complete,
}

impl EventAction {
    /// Status the event ends up in
    pub fn target(&self) -> EventStatus {
        match self {
            EventAction::Approve => EventStatus::Approved,
            EventAction::Reject => EventStatus::Rejected,
            EventAction::Cancel => EventStatus::Cancelled,
            EventAction::Complete => EventStatus::Completed,
        }
    }

    /// Whether the action may be applied to an event in `from`
    pub fn allowed_from(&self, from: EventStatus) -> bool {
        match self {
            EventAction::Approve => matches!(from, EventStatus::Pending | EventStatus::Rejected),
            EventAction::Reject => matches!(from, EventStatus::Pending | EventStatus::Approved),
            EventAction::Cancel => matches!(from, EventStatus::Pending | EventStatus::Approved),
            EventAction::Complete => from == EventStatus::Approved,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            EventAction::Approve => "approve",
            EventAction::Reject => "reject",
            EventAction::Cancel => "cancel",
            EventAction::Complete => "complete",
        }
    }
}

/// Event service
pub struct EventService {
    repo: Arc<dyn EventRepository>,
    cache: SharedCache,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditService>,
}

impl EventService {
    pub fn new(
        repo: Arc<dyn EventRepository>,
        cache: SharedCache,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            repo,
            cache,
            notifications,
            audit,
        }
    }

    /// Create a pending event owned by `organizer`
    pub async fn create(&self, organizer: &User, input: EventInput) -> Result<Event, EventServiceError> {
        if !organizer.can_organize() {
            return Err(EventServiceError::Forbidden(
                "Only organizers can create events".to_string(),
            ));
        }
        validate_input(&input)?;

        let now = Utc::now();
        let event = Event {
            id: 0,
            organizer_id: organizer.id,
            name: input.name.trim().to_string(),
            slug: generate_slug(&input.name),
            description: input.description.trim().to_string(),
            category: non_blank(input.category),
            location: input.location.trim().to_string(),
            address: non_blank(input.address),
            start_date: input.start_date,
            end_date: input.end_date,
            max_volunteers: input.max_volunteers,
            current_volunteers: 0,
            status: EventStatus::Pending,
            image_url: non_blank(input.image_url),
            requirements: non_blank(input.requirements),
            benefits: non_blank(input.benefits),
            contact_info: non_blank(input.contact_info),
            is_deleted: false,
            deleted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
            approved_at: None,
            approved_by: None,
        };

        let created = self.repo.create(&event).await.context("Failed to create event")?;
        tracing::info!("Event {} created by user {}", created.id, organizer.id);
        Ok(created)
    }

    /// Live event by id, served from cache when possible
    pub async fn get(&self, id: i64) -> Result<Event, EventServiceError> {
        let key = event_key(id);
        if let Ok(Some(event)) = self.cache.get::<Event>(&key).await {
            return Ok(event);
        }

        let event = self
            .repo
            .get_by_id(id)
            .await?
            .filter(|e| !e.is_deleted)
            .ok_or(EventServiceError::NotFound)?;

        if let Err(e) = self.cache.set(&key, &event, self.cache.default_ttl()).await {
            tracing::debug!("Failed to cache event {}: {:#}", id, e);
        }
        Ok(event)
    }

    /// Live event read straight from the database, bypassing the cache.
    /// Used before state changes that depend on seat counts.
    pub async fn get_fresh(&self, id: i64) -> Result<Event, EventServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .filter(|e| !e.is_deleted)
            .ok_or(EventServiceError::NotFound)
    }

    /// Listing visible to `viewer`.
    ///
    /// Anonymous users and volunteers only see approved events. Admins may
    /// filter by any status. Organizers may filter by status, but other
    /// statuses than approved are limited to their own events.
    pub async fn list(
        &self,
        mut filter: EventFilter,
        params: &ListParams,
        viewer: Option<&User>,
    ) -> Result<PagedResult<Event>, EventServiceError> {
        match viewer.map(|u| u.role) {
            Some(UserRole::Admin) => {}
            Some(UserRole::Organizer) => match filter.status {
                None => filter.status = Some(EventStatus::Approved),
                Some(EventStatus::Approved) => {}
                Some(_) => filter.organizer_id = viewer.map(|u| u.id),
            },
            _ => filter.status = Some(EventStatus::Approved),
        }

        let (events, total) = self.repo.list(&filter, params).await?;
        Ok(PagedResult::new(events, total, params))
    }

    /// Edit an event; owner or admin only
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: EventInput,
    ) -> Result<Event, EventServiceError> {
        let mut event = self.get_fresh(id).await?;
        if !actor.can_manage(event.organizer_id) {
            return Err(EventServiceError::Forbidden(
                "Not allowed to update this event".to_string(),
            ));
        }
        validate_input(&input)?;
        if let Some(max) = input.max_volunteers {
            if max < event.current_volunteers {
                return Err(EventServiceError::ValidationError(format!(
                    "maxVolunteers cannot be lower than the {} approved volunteers",
                    event.current_volunteers
                )));
            }
        }

        event.name = input.name.trim().to_string();
        event.slug = generate_slug(&input.name);
        event.description = input.description.trim().to_string();
        event.category = non_blank(input.category);
        event.location = input.location.trim().to_string();
        event.address = non_blank(input.address);
        event.start_date = input.start_date;
        event.end_date = input.end_date;
        event.max_volunteers = input.max_volunteers;
        event.image_url = non_blank(input.image_url);
        event.requirements = non_blank(input.requirements);
        event.benefits = non_blank(input.benefits);
        event.contact_info = non_blank(input.contact_info);

        let updated = self.repo.update(&event).await.context("Failed to update event")?;
        self.invalidate(id).await;
        Ok(updated)
    }

    /// Soft delete; owner or admin only
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), EventServiceError> {
        let event = self.get_fresh(id).await?;
        if !actor.can_manage(event.organizer_id) {
            return Err(EventServiceError::Forbidden(
                "Not allowed to delete this event".to_string(),
            ));
        }

        if !self.repo.soft_delete(id).await? {
            return Err(EventServiceError::NotFound);
        }
        self.invalidate(id).await;
        self.audit
            .record(Some(actor.id), "event:delete", Some(json!({ "eventId": id })))
            .await;
        Ok(())
    }

    /// Apply a lifecycle action.
    ///
    /// Approve, reject and complete are admin only; cancel is also allowed
    /// for the organizer. The organizer is notified and the change audited.
    pub async fn transition(
        &self,
        actor: &User,
        id: i64,
        action: EventAction,
    ) -> Result<Event, EventServiceError> {
        let mut event = self.get_fresh(id).await?;

        let permitted = match action {
            EventAction::Cancel => actor.can_manage(event.organizer_id),
            _ => actor.is_admin(),
        };
        if !permitted {
            return Err(EventServiceError::Forbidden(format!(
                "Not allowed to {} this event",
                action.verb()
            )));
        }
        if !action.allowed_from(event.status) {
            return Err(EventServiceError::InvalidTransition(format!(
                "Cannot {} an event that is {}",
                action.verb(),
                event.status
            )));
        }

        let target = action.target();
        event.status = target;
        if action == EventAction::Approve {
            event.approved_at = Some(Utc::now());
            event.approved_by = Some(actor.id);
        }

        let updated = self.repo.update(&event).await.context("Failed to update event status")?;
        self.invalidate(id).await;
        tracing::info!("Event {} is now {} (by user {})", id, target, actor.id);

        if updated.organizer_id != actor.id {
            self.notifications
                .notify_quietly(
                    NewNotification::new(
                        updated.organizer_id,
                        format!("event_{}", target),
                        format!("Event {}", target),
                    )
                    .message(format!("Your event \"{}\" is now {}.", updated.name, target))
                    .link(format!("/events/{}", updated.id))
                    .payload(json!({ "eventId": updated.id, "status": target })),
                )
                .await;
        }
        self.audit
            .record(
                Some(actor.id),
                &format!("event:{}", action.verb()),
                Some(json!({ "eventId": id, "status": target })),
            )
            .await;

        Ok(updated)
    }

    /// Take a seat for an approved registration. `false` when full.
    pub async fn reserve_seat(&self, id: i64) -> Result<bool, EventServiceError> {
        let reserved = self.repo.reserve_seat(id).await?;
        if reserved {
            self.invalidate(id).await;
        }
        Ok(reserved)
    }

    /// Give a seat back; the count never drops below zero
    pub async fn release_seat(&self, id: i64) -> Result<(), EventServiceError> {
        self.repo.release_seat(id).await?;
        self.invalidate(id).await;
        Ok(())
    }

    /// Drop the cached copy of an event after it changed
    pub async fn invalidate(&self, id: i64) {
        if let Err(e) = self.cache.delete(&event_key(id)).await {
            tracing::debug!("Failed to invalidate event {}: {:#}", id, e);
        }
    }
}

fn validate_input(input: &EventInput) -> Result<(), EventServiceError> {
    let name_len = input.name.trim().chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
        return Err(EventServiceError::ValidationError(format!(
            "Name must be between {} and {} characters",
            NAME_MIN_LEN, NAME_MAX_LEN
        )));
    }
    if input.description.trim().chars().count() < DESCRIPTION_MIN_LEN {
        return Err(EventServiceError::ValidationError(format!(
            "Description must be at least {} characters",
            DESCRIPTION_MIN_LEN
        )));
    }
    if input.location.trim().is_empty() {
        return Err(EventServiceError::ValidationError(
            "Location is required".to_string(),
        ));
    }
    if input.start_date >= input.end_date {
        return Err(EventServiceError::ValidationError(
            "startDate must be before endDate".to_string(),
        ));
    }
    if matches!(input.max_volunteers, Some(max) if max < 1) {
        return Err(EventServiceError::ValidationError(
            "maxVolunteers must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Generate a URL-friendly slug from an event name.
///
/// ASCII letters and digits are lowercased, other letters (accented names)
/// are kept, everything else becomes a single hyphen.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut prev_hyphen = true;

    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            slug.push('-');
            prev_hyphen = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
