//! Event repository
//!
//! Database operations for volunteer events.
//!
//! This module provides:
//! - `EventRepository` trait defining the interface for event data access
//! - `SqlxEventRepository` implementing the trait for SQLite and MySQL
//!
//! Seat accounting goes through [`EventRepository::reserve_seat`] and
//! [`EventRepository::release_seat`], which adjust `current_volunteers` in a
//! single guarded statement so capacity holds under concurrent approvals.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Event, EventFilter, EventStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// An event joined with its organizer, used by exports
#[derive(Debug, Clone)]
pub struct EventWithOrganizer {
    pub event: Event,
    pub organizer_email: Option<String>,
    pub organizer_name: Option<String>,
}

/// Event repository trait
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Create a new event
    async fn create(&self, event: &Event) -> Result<Event>;

    /// Get event by ID, including soft-deleted rows
    async fn get_by_id(&self, id: i64) -> Result<Option<Event>>;

    /// Persist every mutable field and bump the row version
    async fn update(&self, event: &Event) -> Result<Event>;

    /// Mark an event deleted
    async fn soft_delete(&self, id: i64) -> Result<bool>;

    /// List non-deleted events matching a filter, latest start date first
    async fn list(&self, filter: &EventFilter, params: &ListParams) -> Result<(Vec<Event>, i64)>;

    /// Every non-deleted event with organizer details (exports)
    async fn list_with_organizer(&self) -> Result<Vec<EventWithOrganizer>>;

    /// Take one seat if capacity allows. Returns `false` when the event is full.
    async fn reserve_seat(&self, id: i64) -> Result<bool>;

    /// Give one seat back, never dropping below zero
    async fn release_seat(&self, id: i64) -> Result<()>;

    /// Number of non-deleted events per status
    async fn count_by_status(&self) -> Result<Vec<(EventStatus, i64)>>;
}

/// SQLx-based event repository implementation
pub struct SqlxEventRepository {
    pool: DynDatabasePool,
}

impl SqlxEventRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EventRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn create(&self, event: &Event) -> Result<Event> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_event_sqlite(self.pool.sqlite()?, event).await,
            DatabaseDriver::Mysql => create_event_mysql(self.pool.mysql()?, event).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Event>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_event_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_event_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn update(&self, event: &Event) -> Result<Event> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_event_sqlite(self.pool.sqlite()?, event).await,
            DatabaseDriver::Mysql => update_event_mysql(self.pool.mysql()?, event).await,
        }
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SOFT_DELETE_EVENT)
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(SOFT_DELETE_EVENT)
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete event")?;

        Ok(affected > 0)
    }

    async fn list(&self, filter: &EventFilter, params: &ListParams) -> Result<(Vec<Event>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_events_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_events_mysql(self.pool.mysql()?, filter, params).await,
        }
    }

    async fn list_with_organizer(&self) -> Result<Vec<EventWithOrganizer>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(LIST_WITH_ORGANIZER)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list events for export")?;
                rows.iter()
                    .map(|row| {
                        Ok(EventWithOrganizer {
                            event: row_to_event_sqlite(row)?,
                            organizer_email: row.get("organizer_email"),
                            organizer_name: row.get("organizer_name"),
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(LIST_WITH_ORGANIZER)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list events for export")?;
                rows.iter()
                    .map(|row| {
                        Ok(EventWithOrganizer {
                            event: row_to_event_mysql(row)?,
                            organizer_email: row.get("organizer_email"),
                            organizer_name: row.get("organizer_name"),
                        })
                    })
                    .collect()
            }
        }
    }

    async fn reserve_seat(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(RESERVE_SEAT)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(RESERVE_SEAT)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to reserve seat")?;

        Ok(affected > 0)
    }

    async fn release_seat(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(RELEASE_SEAT)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(RELEASE_SEAT)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to release seat")
    }

    async fn count_by_status(&self) -> Result<Vec<(EventStatus, i64)>> {
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(COUNT_BY_STATUS)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count events")?
                .iter()
                .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
            DatabaseDriver::Mysql => sqlx::query(COUNT_BY_STATUS)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count events")?
                .iter()
                .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
        };

        rows.into_iter()
            .map(|(status, count)| {
                let status = EventStatus::from_str(&status)
                    .with_context(|| format!("Invalid event status in database: {}", status))?;
                Ok((status, count))
            })
            .collect()
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

macro_rules! select_events {
    ($tail:literal) => {
        concat!(
            r#"
            SELECT e.id, e.organizer_id, e.name, e.slug, e.description, e.category,
                   e.location, e.address, e.start_date, e.end_date, e.max_volunteers,
                   e.current_volunteers, e.status, e.image_url, e.requirements, e.benefits,
                   e.contact_info, e.is_deleted, e.deleted_at, e.version, e.created_at,
                   e.updated_at, e.approved_at, e.approved_by
            "#,
            $tail
        )
    };
}

const SELECT_EVENT_BY_ID: &str = select_events!("FROM events e WHERE e.id = ?");

// Optional filters bind twice: `(? IS NULL OR col = ?)`.
const LIST_EVENTS: &str = select_events!(
    r#"
    FROM events e
    WHERE e.is_deleted = 0
      AND (? IS NULL OR e.status = ?)
      AND (? IS NULL OR e.category = ?)
      AND (? IS NULL OR e.organizer_id = ?)
      AND (? IS NULL OR e.start_date >= ?)
      AND (? IS NULL OR e.start_date <= ?)
      AND (? IS NULL OR LOWER(e.name) LIKE ? OR LOWER(e.description) LIKE ?
           OR LOWER(e.location) LIKE ?)
    ORDER BY e.start_date DESC, e.id DESC
    LIMIT ? OFFSET ?
    "#
);

const COUNT_EVENTS: &str = r#"
    SELECT COUNT(*) AS count
    FROM events e
    WHERE e.is_deleted = 0
      AND (? IS NULL OR e.status = ?)
      AND (? IS NULL OR e.category = ?)
      AND (? IS NULL OR e.organizer_id = ?)
      AND (? IS NULL OR e.start_date >= ?)
      AND (? IS NULL OR e.start_date <= ?)
      AND (? IS NULL OR LOWER(e.name) LIKE ? OR LOWER(e.description) LIKE ?
           OR LOWER(e.location) LIKE ?)
"#;

const LIST_WITH_ORGANIZER: &str = select_events!(
    r#"
    , u.email AS organizer_email, u.full_name AS organizer_name
    FROM events e
    LEFT JOIN users u ON u.id = e.organizer_id
    WHERE e.is_deleted = 0
    ORDER BY e.id ASC
    "#
);

const INSERT_EVENT: &str = r#"
    INSERT INTO events (organizer_id, name, slug, description, category, location, address,
                        start_date, end_date, max_volunteers, current_volunteers, status,
                        image_url, requirements, benefits, contact_info, is_deleted, version,
                        created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
"#;

const UPDATE_EVENT: &str = r#"
    UPDATE events
    SET name = ?, slug = ?, description = ?, category = ?, location = ?, address = ?,
        start_date = ?, end_date = ?, max_volunteers = ?, status = ?, image_url = ?,
        requirements = ?, benefits = ?, contact_info = ?, approved_at = ?, approved_by = ?,
        version = version + 1, updated_at = ?
    WHERE id = ?
"#;

const SOFT_DELETE_EVENT: &str =
    "UPDATE events SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE id = ? AND is_deleted = 0";

const RESERVE_SEAT: &str = r#"
    UPDATE events
    SET current_volunteers = current_volunteers + 1, updated_at = ?
    WHERE id = ? AND (max_volunteers IS NULL OR current_volunteers < max_volunteers)
"#;

const RELEASE_SEAT: &str = r#"
    UPDATE events
    SET current_volunteers = current_volunteers - 1, updated_at = ?
    WHERE id = ? AND current_volunteers > 0
"#;

const COUNT_BY_STATUS: &str =
    "SELECT status, COUNT(*) AS count FROM events WHERE is_deleted = 0 GROUP BY status";

struct EventFilterBinds {
    status: Option<String>,
    category: Option<String>,
    organizer_id: Option<i64>,
    start_from: Option<DateTime<Utc>>,
    start_to: Option<DateTime<Utc>>,
    search: Option<String>,
}

impl From<&EventFilter> for EventFilterBinds {
    fn from(filter: &EventFilter) -> Self {
        Self {
            status: filter.status.map(|s| s.to_string()),
            category: filter
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            organizer_id: filter.organizer_id,
            start_from: filter.start_from,
            start_to: filter.start_to,
            search: filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("%{}%", s.to_lowercase())),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_event_sqlite(pool: &SqlitePool, event: &Event) -> Result<Event> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_EVENT)
        .bind(event.organizer_id)
        .bind(&event.name)
        .bind(&event.slug)
        .bind(&event.description)
        .bind(&event.category)
        .bind(&event.location)
        .bind(&event.address)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.max_volunteers)
        .bind(event.current_volunteers)
        .bind(event.status.to_string())
        .bind(&event.image_url)
        .bind(&event.requirements)
        .bind(&event.benefits)
        .bind(&event.contact_info)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create event")?;

    get_event_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Event not found after insert"))
}

async fn get_event_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Event>> {
    let row = sqlx::query(SELECT_EVENT_BY_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get event by ID")?;

    row.as_ref().map(row_to_event_sqlite).transpose()
}

async fn update_event_sqlite(pool: &SqlitePool, event: &Event) -> Result<Event> {
    sqlx::query(UPDATE_EVENT)
        .bind(&event.name)
        .bind(&event.slug)
        .bind(&event.description)
        .bind(&event.category)
        .bind(&event.location)
        .bind(&event.address)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.max_volunteers)
        .bind(event.status.to_string())
        .bind(&event.image_url)
        .bind(&event.requirements)
        .bind(&event.benefits)
        .bind(&event.contact_info)
        .bind(event.approved_at)
        .bind(event.approved_by)
        .bind(Utc::now())
        .bind(event.id)
        .execute(pool)
        .await
        .context("Failed to update event")?;

    get_event_by_id_sqlite(pool, event.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Event not found after update"))
}

async fn list_events_sqlite(
    pool: &SqlitePool,
    filter: &EventFilter,
    params: &ListParams,
) -> Result<(Vec<Event>, i64)> {
    let binds = EventFilterBinds::from(filter);

    let rows = sqlx::query(LIST_EVENTS)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(binds.organizer_id)
        .bind(binds.organizer_id)
        .bind(binds.start_from)
        .bind(binds.start_from)
        .bind(binds.start_to)
        .bind(binds.start_to)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list events")?;

    let total: i64 = sqlx::query(COUNT_EVENTS)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(binds.organizer_id)
        .bind(binds.organizer_id)
        .bind(binds.start_from)
        .bind(binds.start_from)
        .bind(binds.start_to)
        .bind(binds.start_to)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .fetch_one(pool)
        .await
        .context("Failed to count events")?
        .get("count");

    let events = rows.iter().map(row_to_event_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((events, total))
}

fn row_to_event_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
    let status_str: String = row.get("status");
    let status = EventStatus::from_str(&status_str)
        .with_context(|| format!("Invalid event status in database: {}", status_str))?;

    Ok(Event {
        id: row.get("id"),
        organizer_id: row.get("organizer_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        category: row.get("category"),
        location: row.get("location"),
        address: row.get("address"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        max_volunteers: row.get("max_volunteers"),
        current_volunteers: row.get("current_volunteers"),
        status,
        image_url: row.get("image_url"),
        requirements: row.get("requirements"),
        benefits: row.get("benefits"),
        contact_info: row.get("contact_info"),
        is_deleted: row.get("is_deleted"),
        deleted_at: row.get("deleted_at"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        approved_at: row.get("approved_at"),
        approved_by: row.get("approved_by"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_event_mysql(pool: &MySqlPool, event: &Event) -> Result<Event> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_EVENT)
        .bind(event.organizer_id)
        .bind(&event.name)
        .bind(&event.slug)
        .bind(&event.description)
        .bind(&event.category)
        .bind(&event.location)
        .bind(&event.address)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.max_volunteers)
        .bind(event.current_volunteers)
        .bind(event.status.to_string())
        .bind(&event.image_url)
        .bind(&event.requirements)
        .bind(&event.benefits)
        .bind(&event.contact_info)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create event")?;

    get_event_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Event not found after insert"))
}

async fn get_event_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Event>> {
    let row = sqlx::query(SELECT_EVENT_BY_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get event by ID")?;

    row.as_ref().map(row_to_event_mysql).transpose()
}

async fn update_event_mysql(pool: &MySqlPool, event: &Event) -> Result<Event> {
    sqlx::query(UPDATE_EVENT)
        .bind(&event.name)
        .bind(&event.slug)
        .bind(&event.description)
        .bind(&event.category)
        .bind(&event.location)
        .bind(&event.address)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.max_volunteers)
        .bind(event.status.to_string())
        .bind(&event.image_url)
        .bind(&event.requirements)
        .bind(&event.benefits)
        .bind(&event.contact_info)
        .bind(event.approved_at)
        .bind(event.approved_by)
        .bind(Utc::now())
        .bind(event.id)
        .execute(pool)
        .await
        .context("Failed to update event")?;

    get_event_by_id_mysql(pool, event.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Event not found after update"))
}

async fn list_events_mysql(
    pool: &MySqlPool,
    filter: &EventFilter,
    params: &ListParams,
) -> Result<(Vec<Event>, i64)> {
    let binds = EventFilterBinds::from(filter);

    let rows = sqlx::query(LIST_EVENTS)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(binds.organizer_id)
        .bind(binds.organizer_id)
        .bind(binds.start_from)
        .bind(binds.start_from)
        .bind(binds.start_to)
        .bind(binds.start_to)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list events")?;

    let total: i64 = sqlx::query(COUNT_EVENTS)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(binds.organizer_id)
        .bind(binds.organizer_id)
        .bind(binds.start_from)
        .bind(binds.start_from)
        .bind(binds.start_to)
        .bind(binds.start_to)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .bind(&binds.search)
        .fetch_one(pool)
        .await
        .context("Failed to count events")?
        .get("count");

    let events = rows.iter().map(row_to_event_mysql).collect::<Result<Vec<_>>>()?;
    Ok((events, total))
}

fn row_to_event_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Event> {
    let status_str: String = row.get("status");
    let status = EventStatus::from_str(&status_str)
        .with_context(|| format!("Invalid event status in database: {}", status_str))?;

    Ok(Event {
        id: row.get("id"),
        organizer_id: row.get("organizer_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        category: row.get("category"),
        location: row.get("location"),
        address: row.get("address"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        max_volunteers: row.get("max_volunteers"),
        current_volunteers: row.get("current_volunteers"),
        status,
        image_url: row.get("image_url"),
        requirements: row.get("requirements"),
        benefits: row.get("benefits"),
        contact_info: row.get("contact_info"),
        is_deleted: row.get("is_deleted"),
        deleted_at: row.get("deleted_at"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        approved_at: row.get("approved_at"),
        approved_by: row.get("approved_by"),
    })
}
