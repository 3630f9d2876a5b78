//! Registration repository
//!
//! Database operations for volunteer registrations.
//!
//! Status changes go through [`RegistrationRepository::transition`], which only
//! writes when the row is still in the expected state.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AttendanceStatus, Registration, RegistrationStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Registration repository trait
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Create a pending registration
    async fn create(
        &self,
        event_id: i64,
        volunteer_id: i64,
        note: Option<&str>,
    ) -> Result<Registration>;

    /// Get registration by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Registration>>;

    /// Get the registration of a volunteer for an event
    async fn get_for_volunteer(
        &self,
        event_id: i64,
        volunteer_id: i64,
    ) -> Result<Option<Registration>>;

    /// Write the registration if its stored status is still `expected`.
    ///
    /// Returns `None` when another writer changed the status first.
    async fn transition(
        &self,
        registration: &Registration,
        expected: RegistrationStatus,
    ) -> Result<Option<Registration>>;

    /// Registrations of an event with volunteer name and email, oldest first
    async fn list_for_event(&self, event_id: i64) -> Result<Vec<Registration>>;

    /// Registrations of a volunteer with event names, newest first
    async fn list_for_volunteer(&self, volunteer_id: i64) -> Result<Vec<Registration>>;

    /// Number of registrations per status
    async fn count_by_status(&self) -> Result<Vec<(RegistrationStatus, i64)>>;
}

/// SQLx-based registration repository implementation
pub struct SqlxRegistrationRepository {
    pool: DynDatabasePool,
}

impl SqlxRegistrationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RegistrationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RegistrationRepository for SqlxRegistrationRepository {
    async fn create(
        &self,
        event_id: i64,
        volunteer_id: i64,
        note: Option<&str>,
    ) -> Result<Registration> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_REGISTRATION)
                .bind(event_id)
                .bind(volunteer_id)
                .bind(note)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create registration")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_REGISTRATION)
                .bind(event_id)
                .bind(volunteer_id)
                .bind(note)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create registration")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Registration not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Registration>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_registration_sqlite(self.pool.sqlite()?, SELECT_BY_ID, &[id]).await
            }
            DatabaseDriver::Mysql => {
                get_registration_mysql(self.pool.mysql()?, SELECT_BY_ID, &[id]).await
            }
        }
    }

    async fn get_for_volunteer(
        &self,
        event_id: i64,
        volunteer_id: i64,
    ) -> Result<Option<Registration>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_registration_sqlite(
                    self.pool.sqlite()?,
                    SELECT_BY_EVENT_AND_VOLUNTEER,
                    &[event_id, volunteer_id],
                )
                .await
            }
            DatabaseDriver::Mysql => {
                get_registration_mysql(
                    self.pool.mysql()?,
                    SELECT_BY_EVENT_AND_VOLUNTEER,
                    &[event_id, volunteer_id],
                )
                .await
            }
        }
    }

    async fn transition(
        &self,
        registration: &Registration,
        expected: RegistrationStatus,
    ) -> Result<Option<Registration>> {
        let attendance = registration.attendance_status.map(|a| a.to_string());
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(TRANSITION)
                .bind(registration.status.to_string())
                .bind(&registration.note)
                .bind(&registration.organizer_note)
                .bind(&attendance)
                .bind(&registration.completion_note)
                .bind(registration.registered_at)
                .bind(registration.approved_at)
                .bind(registration.completed_at)
                .bind(registration.cancelled_at)
                .bind(Utc::now())
                .bind(registration.id)
                .bind(expected.to_string())
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(TRANSITION)
                .bind(registration.status.to_string())
                .bind(&registration.note)
                .bind(&registration.organizer_note)
                .bind(&attendance)
                .bind(&registration.completion_note)
                .bind(registration.registered_at)
                .bind(registration.approved_at)
                .bind(registration.completed_at)
                .bind(registration.cancelled_at)
                .bind(Utc::now())
                .bind(registration.id)
                .bind(expected.to_string())
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update registration")?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(registration.id).await
    }

    async fn list_for_event(&self, event_id: i64) -> Result<Vec<Registration>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(LIST_FOR_EVENT)
                .bind(event_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list event registrations")?
                .iter()
                .map(row_to_registration_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(LIST_FOR_EVENT)
                .bind(event_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list event registrations")?
                .iter()
                .map(row_to_registration_mysql)
                .collect(),
        }
    }

    async fn list_for_volunteer(&self, volunteer_id: i64) -> Result<Vec<Registration>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(LIST_FOR_VOLUNTEER)
                .bind(volunteer_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list volunteer registrations")?
                .iter()
                .map(row_to_registration_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(LIST_FOR_VOLUNTEER)
                .bind(volunteer_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list volunteer registrations")?
                .iter()
                .map(row_to_registration_mysql)
                .collect(),
        }
    }

    async fn count_by_status(&self) -> Result<Vec<(RegistrationStatus, i64)>> {
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(COUNT_BY_STATUS)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count registrations")?
                .iter()
                .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
            DatabaseDriver::Mysql => sqlx::query(COUNT_BY_STATUS)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count registrations")?
                .iter()
                .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
        };

        rows.into_iter()
            .map(|(status, count)| Ok((RegistrationStatus::from_str(&status)?, count)))
            .collect()
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

macro_rules! select_registrations {
    ($tail:literal) => {
        concat!(
            r#"
            SELECT r.id, r.event_id, r.volunteer_id, r.status, r.note, r.organizer_note,
                   r.attendance_status, r.completion_note, r.registered_at, r.approved_at,
                   r.completed_at, r.cancelled_at, r.updated_at,
                   e.name AS event_name, u.full_name AS volunteer_name, u.email AS volunteer_email
            FROM registrations r
            LEFT JOIN events e ON e.id = r.event_id
            LEFT JOIN users u ON u.id = r.volunteer_id
            "#,
            $tail
        )
    };
}

const SELECT_BY_ID: &str = select_registrations!("WHERE r.id = ?");

const SELECT_BY_EVENT_AND_VOLUNTEER: &str =
    select_registrations!("WHERE r.event_id = ? AND r.volunteer_id = ?");

const LIST_FOR_EVENT: &str =
    select_registrations!("WHERE r.event_id = ? ORDER BY r.registered_at ASC, r.id ASC");

const LIST_FOR_VOLUNTEER: &str =
    select_registrations!("WHERE r.volunteer_id = ? ORDER BY r.registered_at DESC, r.id DESC");

const INSERT_REGISTRATION: &str = r#"
    INSERT INTO registrations (event_id, volunteer_id, status, note, registered_at, updated_at)
    VALUES (?, ?, 'pending', ?, ?, ?)
"#;

const TRANSITION: &str = r#"
    UPDATE registrations
    SET status = ?, note = ?, organizer_note = ?, attendance_status = ?, completion_note = ?,
        registered_at = ?, approved_at = ?, completed_at = ?, cancelled_at = ?, updated_at = ?
    WHERE id = ? AND status = ?
"#;

const COUNT_BY_STATUS: &str =
    "SELECT status, COUNT(*) AS count FROM registrations GROUP BY status";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_registration_sqlite(
    pool: &SqlitePool,
    sql: &'static str,
    ids: &[i64],
) -> Result<Option<Registration>> {
    let mut query = sqlx::query(sql);
    for id in ids {
        query = query.bind(*id);
    }

    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get registration")?;

    row.as_ref().map(row_to_registration_sqlite).transpose()
}

fn row_to_registration_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Registration> {
    let status_str: String = row.get("status");
    let status = RegistrationStatus::from_str(&status_str)
        .with_context(|| format!("Invalid registration status in database: {}", status_str))?;
    let attendance: Option<String> = row.get("attendance_status");

    Ok(Registration {
        id: row.get("id"),
        event_id: row.get("event_id"),
        volunteer_id: row.get("volunteer_id"),
        status,
        note: row.get("note"),
        organizer_note: row.get("organizer_note"),
        attendance_status: attendance.and_then(|a| AttendanceStatus::from_str(&a).ok()),
        completion_note: row.get("completion_note"),
        registered_at: row.get("registered_at"),
        approved_at: row.get("approved_at"),
        completed_at: row.get("completed_at"),
        cancelled_at: row.get("cancelled_at"),
        updated_at: row.get("updated_at"),
        event_name: row.get("event_name"),
        volunteer_name: row.get("volunteer_name"),
        volunteer_email: row.get("volunteer_email"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_registration_mysql(
    pool: &MySqlPool,
    sql: &'static str,
    ids: &[i64],
) -> Result<Option<Registration>> {
    let mut query = sqlx::query(sql);
    for id in ids {
        query = query.bind(*id);
    }

    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get registration")?;

    row.as_ref().map(row_to_registration_mysql).transpose()
}

fn row_to_registration_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Registration> {
    let status_str: String = row.get("status");
    let status = RegistrationStatus::from_str(&status_str)
        .with_context(|| format!("Invalid registration status in database: {}", status_str))?;
    let attendance: Option<String> = row.get("attendance_status");

    Ok(Registration {
        id: row.get("id"),
        event_id: row.get("event_id"),
        volunteer_id: row.get("volunteer_id"),
        status,
        note: row.get("note"),
        organizer_note: row.get("organizer_note"),
        attendance_status: attendance.and_then(|a| AttendanceStatus::from_str(&a).ok()),
        completion_note: row.get("completion_note"),
        registered_at: row.get("registered_at"),
        approved_at: row.get("approved_at"),
        completed_at: row.get("completed_at"),
        cancelled_at: row.get("cancelled_at"),
        updated_at: row.get("updated_at"),
        event_name: row.get("event_name"),
        volunteer_name: row.get("volunteer_name"),
        volunteer_email: row.get("volunteer_email"),
    })
}
