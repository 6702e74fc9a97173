// Row encoding between the `todos` table and `Todo`

use crate::models::{Todo, TodoStatus};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use eyre::{Context, Result, eyre};
use rusqlite::Row;

/// Column list shared by every SELECT so `TodoRow::from_row` can rely on names
pub(crate) const TODO_COLUMNS: &str = "id, title, description, tags, status, priority, created_at, updated_at";

/// Raw column values of one `todos` row, before decoding
#[derive(Debug, Clone)]
pub(crate) struct TodoRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub status: String,
    pub priority: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TodoRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            tags: row.get("tags")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn into_todo(self) -> Result<Todo> {
        let id = self.id;
        let status: TodoStatus = self
            .status
            .parse()
            .wrap_err_with(|| format!("Invalid status stored for todo {}", id))?;
        let priority = u8::try_from(self.priority)
            .map_err(|_| eyre!("Invalid priority {} stored for todo {}", self.priority, id))?;
        let tags = decode_tags(self.tags.as_deref()).wrap_err_with(|| format!("Invalid tags stored for todo {}", id))?;
        let created_at =
            parse_timestamp(&self.created_at).wrap_err_with(|| format!("Invalid created_at stored for todo {}", id))?;
        let updated_at =
            parse_timestamp(&self.updated_at).wrap_err_with(|| format!("Invalid updated_at stored for todo {}", id))?;

        Ok(Todo {
            id,
            title: self.title,
            description: self.description,
            tags,
            status,
            priority,
            created_at,
            updated_at,
        })
    }
}

/// RFC 3339, UTC, microseconds: lexicographic order matches time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
///
/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| eyre!("Unparseable timestamp {:?}: {}", s, e))
}

pub fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to encode tags")
}

/// Decode a JSON tag array; NULL or blank means no tags
pub fn decode_tags(raw: Option<&str>) -> Result<Vec<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json).wrap_err_with(|| format!("Tags are not a JSON string array: {}", json)),
    }
}
