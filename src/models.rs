// Data models for TodoStore

use chrono::{DateTime, SubsecRound, Utc};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest urgency
pub const PRIORITY_MIN: u8 = 1;
/// Lowest urgency
pub const PRIORITY_MAX: u8 = 5;
pub const PRIORITY_DEFAULT: u8 = 3;

/// A persisted todo record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub status: TodoStatus,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoStatus {
    #[value(name = "TODO")]
    Todo,
    #[value(name = "IN_PROGRESS")]
    InProgress,
    #[value(name = "DONE")]
    Done,
}

impl TodoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TodoStatus::Todo => "TODO",
            TodoStatus::InProgress => "IN_PROGRESS",
            TodoStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TodoStatus {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TODO" => Ok(TodoStatus::Todo),
            "IN_PROGRESS" => Ok(TodoStatus::InProgress),
            "DONE" => Ok(TodoStatus::Done),
            other => Err(eyre!("Unknown status: {}", other)),
        }
    }
}

/// Input for creating a todo
///
/// The store assigns id, status and timestamps; only caller-owned fields live here.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub priority: u8,
}

impl NewTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            tags: Vec::new(),
            priority: PRIORITY_DEFAULT,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_priority(self.priority)
    }
}

/// Partial update: `None` leaves a field unchanged.
///
/// `description: Some(None)` clears the description and `tags: Some(vec![])`
/// clears the tag list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<TodoStatus>,
    pub priority: Option<u8>,
}

impl TodoUpdate {
    /// Merge present fields over `current`, leaving `updated_at` untouched
    pub fn apply(self, current: &Todo) -> Todo {
        Todo {
            id: current.id.clone(),
            title: self.title.unwrap_or_else(|| current.title.clone()),
            description: self.description.unwrap_or_else(|| current.description.clone()),
            tags: self.tags.unwrap_or_else(|| current.tags.clone()),
            status: self.status.unwrap_or(current.status),
            priority: self.priority.unwrap_or(current.priority),
            created_at: current.created_at,
            updated_at: current.updated_at,
        }
    }
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(eyre!("Todo title cannot be empty or whitespace-only"));
    }
    Ok(())
}

pub fn validate_priority(priority: u8) -> Result<()> {
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        return Err(eyre!(
            "Priority out of range: {} (must be {}-{})",
            priority,
            PRIORITY_MIN,
            PRIORITY_MAX
        ));
    }
    Ok(())
}

/// Current time at the resolution timestamps are persisted with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp for a mutation of a record last touched at `previous`
///
/// Always strictly later than `previous`, even if the clock has not moved.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}
