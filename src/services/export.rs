//! CSV and JSON exports for the admin console

use crate::db::repositories::EventWithOrganizer;
use crate::models::{AuditLog, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const USER_HEADERS: &[&str] = &[
    "id", "email", "full_name", "phone", "role", "status", "created_at", "last_login",
];

pub const EVENT_HEADERS: &[&str] = &[
    "id",
    "name",
    "category",
    "location",
    "start_date",
    "end_date",
    "status",
    "organizer_email",
    "organizer_name",
    "created_at",
    "approved_at",
];

pub const AUDIT_HEADERS: &[&str] = &["id", "userId", "userEmail", "action", "details", "createdAt"];

/// Output format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(anyhow::anyhow!("Unsupported export format: {}", s)),
        }
    }
}

/// A rendered export ready to be sent as a download
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ExportFile {
    fn new(name: &str, format: ExportFormat, body: String) -> Self {
        Self {
            filename: format!("{}.{}", name, format.extension()),
            content_type: format.content_type(),
            body: body.into_bytes(),
        }
    }
}

// ============================================================================
// Renderers
// ============================================================================

pub fn export_users(users: &[User], format: ExportFormat) -> anyhow::Result<ExportFile> {
    let body = match format {
        ExportFormat::Csv => render_csv(
            USER_HEADERS,
            users.iter().map(|u| {
                vec![
                    u.id.to_string(),
                    u.email.clone(),
                    u.full_name.clone(),
                    u.phone.clone().unwrap_or_default(),
                    u.role.to_string(),
                    u.status.to_string(),
                    format_date(Some(u.created_at)),
                    format_date(u.last_login),
                ]
            }),
        ),
        ExportFormat::Json => pretty_json(users)?,
    };
    Ok(ExportFile::new("users", format, body))
}

pub fn export_events(events: &[EventWithOrganizer], format: ExportFormat) -> anyhow::Result<ExportFile> {
    let body = match format {
        ExportFormat::Csv => render_csv(
            EVENT_HEADERS,
            events.iter().map(|row| {
                let e = &row.event;
                vec![
                    e.id.to_string(),
                    e.name.clone(),
                    e.category.clone().unwrap_or_default(),
                    e.location.clone(),
                    format_date(Some(e.start_date)),
                    format_date(Some(e.end_date)),
                    e.status.to_string(),
                    row.organizer_email.clone().unwrap_or_default(),
                    row.organizer_name.clone().unwrap_or_default(),
                    format_date(Some(e.created_at)),
                    format_date(e.approved_at),
                ]
            }),
        ),
        ExportFormat::Json => {
            let rows: Vec<serde_json::Value> = events
                .iter()
                .map(|row| {
                    let mut value = json!(row.event);
                    value["organizerEmail"] = json!(row.organizer_email);
                    value["organizerName"] = json!(row.organizer_name);
                    value
                })
                .collect();
            pretty_json(&rows)?
        }
    };
    Ok(ExportFile::new("events", format, body))
}

pub fn export_audits(logs: &[AuditLog], format: ExportFormat) -> anyhow::Result<ExportFile> {
    let body = match format {
        ExportFormat::Csv => render_csv(
            AUDIT_HEADERS,
            logs.iter().map(|log| {
                vec![
                    log.id.to_string(),
                    log.user_id.map(|id| id.to_string()).unwrap_or_default(),
                    log.user_email.clone().unwrap_or_default(),
                    log.action.clone(),
                    log.details.clone().unwrap_or_default(),
                    format_date(Some(log.created_at)),
                ]
            }),
        ),
        ExportFormat::Json => pretty_json(logs)?,
    };
    Ok(ExportFile::new("audit_logs", format, body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Quote a field when it contains a separator, a quote or a line break
pub fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_csv<I>(headers: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut out = headers.join(",");
    out.push('\n');
    for row in rows {
        let line: Vec<String> = row.iter().map(|f| escape_csv(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn format_date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn pretty_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventStatus, UserRole};
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, h, 5, 7).unwrap()
    }

    fn user() -> User {
        let mut user = User::new(
            "ann@example.com".to_string(),
            "secret-hash".to_string(),
            "Ann, \"the\" Volunteer".to_string(),
            UserRole::Volunteer,
        );
        user.id = 4;
        user.created_at = at(8);
        user
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_csv("cr\rhere"), "\"cr\rhere\"");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn test_users_csv() {
        let file = export_users(&[user()], ExportFormat::Csv).unwrap();
        let text = String::from_utf8(file.body).unwrap();
        let mut lines = text.lines();

        assert_eq!(file.filename, "users.csv");
        assert_eq!(
            lines.next(),
            Some("id,email,full_name,phone,role,status,created_at,last_login")
        );
        assert_eq!(
            lines.next(),
            Some("4,ann@example.com,\"Ann, \"\"the\"\" Volunteer\",,volunteer,active,2025-03-09 08:05:07,")
        );
        assert!(!text.contains("secret-hash"));
    }

    #[test]
    fn test_users_json_is_pretty() {
        let file = export_users(&[user()], ExportFormat::Json).unwrap();
        let text = String::from_utf8(file.body).unwrap();

        assert_eq!(file.filename, "users.json");
        assert_eq!(file.content_type, "application/json");
        assert!(text.contains("\n  {"));
        assert!(!text.contains("passwordHash"));
    }

    #[test]
    fn test_events_csv() {
        let event = Event {
            id: 9,
            organizer_id: 2,
            name: "Beach day".to_string(),
            slug: "beach-day".to_string(),
            description: "Clean the beach".to_string(),
            category: Some("environment".to_string()),
            location: "South beach".to_string(),
            address: None,
            start_date: at(9),
            end_date: at(12),
            max_volunteers: None,
            current_volunteers: 0,
            status: EventStatus::Approved,
            image_url: None,
            requirements: None,
            benefits: None,
            contact_info: None,
            is_deleted: false,
            deleted_at: None,
            version: 1,
            created_at: at(1),
            updated_at: at(1),
            approved_at: Some(at(2)),
            approved_by: Some(1),
        };
        let rows = [EventWithOrganizer {
            event,
            organizer_email: Some("org@example.com".to_string()),
            organizer_name: Some("Org".to_string()),
        }];

        let csv = String::from_utf8(export_events(&rows, ExportFormat::Csv).unwrap().body).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], EVENT_HEADERS.join(","));
        assert_eq!(
            lines[1],
            "9,Beach day,environment,South beach,2025-03-09 09:05:07,2025-03-09 12:05:07,approved,org@example.com,Org,2025-03-09 01:05:07,2025-03-09 02:05:07"
        );

        let json: serde_json::Value =
            serde_json::from_slice(&export_events(&rows, ExportFormat::Json).unwrap().body).unwrap();
        assert_eq!(json[0]["organizerEmail"], "org@example.com");
        assert_eq!(json[0]["name"], "Beach day");
    }

    #[test]
    fn test_audits_csv() {
        let log = AuditLog {
            id: 1,
            user_id: Some(3),
            user_email: Some("admin@example.com".to_string()),
            action: "admin:lock_user".to_string(),
            details: Some(r#"{"userId":7,"reason":"spam"}"#.to_string()),
            created_at: at(10),
        };

        let file = export_audits(&[log], ExportFormat::Csv).unwrap();
        let csv = String::from_utf8(file.body).unwrap();
        assert_eq!(file.filename, "audit_logs.csv");
        assert!(csv.starts_with("id,userId,userEmail,action,details,createdAt\n"));
        assert!(csv.contains(
            "1,3,admin@example.com,admin:lock_user,\"{\"\"userId\"\":7,\"\"reason\"\":\"\"spam\"\"}\",2025-03-09 10:05:07"
        ));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
