// Query filtering for todo reads

use crate::models::TodoStatus;
use rusqlite::types::Value;

/// Which rows a read selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoFilter {
    All,
    Status(TodoStatus),
    /// Substring of the title; `%` and `_` match literally
    TitleContains(String),
    Priority(u8),
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// created_at descending
    #[default]
    Newest,
    /// priority ascending, then created_at descending
    Priority,
}

impl TodoFilter {
    /// WHERE clause (empty for `All`) and its bound value
    pub(crate) fn to_sql(&self) -> (&'static str, Option<Value>) {
        match self {
            TodoFilter::All => ("", None),
            TodoFilter::Status(status) => (" WHERE status = ?1", Some(Value::Text(status.as_str().to_string()))),
            TodoFilter::TitleContains(substr) => (
                " WHERE title LIKE ?1 ESCAPE '\\'",
                Some(Value::Text(format!("%{}%", escape_like(substr)))),
            ),
            TodoFilter::Priority(priority) => (" WHERE priority = ?1", Some(Value::Integer(i64::from(*priority)))),
        }
    }
}

impl SortOrder {
    /// rowid breaks created_at ties so insertion order stays deterministic
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            SortOrder::Newest => " ORDER BY created_at DESC, rowid DESC",
            SortOrder::Priority => " ORDER BY priority ASC, created_at DESC, rowid DESC",
        }
    }
}

/// Escape LIKE wildcards so the input matches literally under `ESCAPE '\'`
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl std::fmt::Display for TodoFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TodoFilter::All => write!(f, "all"),
            TodoFilter::Status(status) => write!(f, "status = {}", status),
            TodoFilter::TitleContains(substr) => write!(f, "title contains {:?}", substr),
            TodoFilter::Priority(priority) => write!(f, "priority = {}", priority),
        }
    }
}
