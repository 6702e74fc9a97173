// Todo store backed by SQLite

use crate::filter::{SortOrder, TodoFilter};
use crate::models::{NewTodo, Todo, TodoStatus, TodoUpdate, next_timestamp, now, validate_priority, validate_title};
use crate::record::{TODO_COLUMNS, TodoRow, decode_tags, encode_tags, format_timestamp, parse_timestamp};
use crate::transfer::{self, ImportRecord, ImportSummary, TransferFormat};
use eyre::{Context, Result, eyre};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ids bound per `IN (...)` statement, well under SQLite's parameter limit
const BULK_CHUNK_SIZE: usize = 500;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS todos (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    tags TEXT,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 3,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Persistent todo collection in a single SQLite file
///
/// Holds only the database path. Every operation opens its own connection and
/// drops it before returning, so no operation depends on state left open by
/// another.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (or create) the store at the given database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Path of the SQLite database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .wrap_err_with(|| format!("Failed to open SQLite database {}", self.db_path.display()))
    }

    /// Create the schema if it does not exist yet
    pub fn init(&self) -> Result<()> {
        debug!(path = ?self.db_path, "Ensuring database schema");
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA).context("Failed to create schema")?;
        Ok(())
    }

    /// Delete the database file and start over with an empty schema
    pub fn reset(&self) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let mut name = self.db_path.clone().into_os_string();
            name.push(suffix);
            let path = PathBuf::from(name);
            if path.exists() {
                fs::remove_file(&path).wrap_err_with(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        info!(path = ?self.db_path, "Store reset");
        self.init()
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Insert a new todo and return it as persisted
    pub fn insert(&self, new: NewTodo) -> Result<Todo> {
        new.validate()?;

        let id = uuid::Uuid::now_v7().to_string();
        let ts = format_timestamp(&now());
        let tags = encode_tags(&new.tags)?;

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO todos (id, title, description, tags, status, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                new.title,
                new.description,
                tags,
                TodoStatus::Todo.as_str(),
                new.priority,
                ts
            ],
        )
        .context("Failed to insert todo")?;

        debug!(id = %id, "Inserted todo");
        Self::fetch(&conn, &id)?.ok_or_else(|| eyre!("Todo {} vanished after insert", id))
    }

    /// Get a todo by id
    pub fn get_by_id(&self, id: &str) -> Result<Option<Todo>> {
        let conn = self.connect()?;
        Self::fetch(&conn, id)
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Todo>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM todos WHERE id = ?1", TODO_COLUMNS),
                [id],
                TodoRow::from_row,
            )
            .optional()?;

        row.map(TodoRow::into_todo).transpose()
    }

    /// Apply a partial update; `None` if the id does not exist
    pub fn update(&self, id: &str, update: TodoUpdate) -> Result<Option<Todo>> {
        let conn = self.connect()?;
        let Some(current) = Self::fetch(&conn, id)? else {
            debug!(id, "update: todo not found");
            return Ok(None);
        };

        let mut merged = update.apply(&current);
        validate_title(&merged.title)?;
        validate_priority(merged.priority)?;
        merged.updated_at = next_timestamp(current.updated_at);

        conn.execute(
            "UPDATE todos SET title = ?1, description = ?2, tags = ?3, status = ?4, priority = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                merged.title,
                merged.description,
                encode_tags(&merged.tags)?,
                merged.status.as_str(),
                merged.priority,
                format_timestamp(&merged.updated_at),
                id
            ],
        )
        .context("Failed to update todo")?;

        Self::fetch(&conn, id)
    }

    /// Delete a todo; returns whether a row was removed
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM todos WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// List todos matching a filter in the given order
    pub fn list(&self, filter: &TodoFilter, order: SortOrder) -> Result<Vec<Todo>> {
        let (clause, value) = filter.to_sql();
        let sql = format!("SELECT {} FROM todos{}{}", TODO_COLUMNS, clause, order.to_sql());
        debug!(%filter, ?order, "list");

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(value), TodoRow::from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.into_todo()?);
        }
        Ok(results)
    }

    /// All todos, newest first
    pub fn get_all(&self) -> Result<Vec<Todo>> {
        self.list(&TodoFilter::All, SortOrder::Newest)
    }

    pub fn get_by_status(&self, status: TodoStatus) -> Result<Vec<Todo>> {
        self.list(&TodoFilter::Status(status), SortOrder::Newest)
    }

    /// Title substring search; `%` and `_` are not wildcards
    pub fn search_by_title(&self, substr: &str) -> Result<Vec<Todo>> {
        self.list(&TodoFilter::TitleContains(substr.to_string()), SortOrder::Newest)
    }

    /// Todos whose tag list contains exactly `tag`
    pub fn search_by_tag(&self, tag: &str) -> Result<Vec<Todo>> {
        Ok(self.get_all()?.into_iter().filter(|todo| todo.has_tag(tag)).collect())
    }

    pub fn get_by_priority(&self, priority: u8) -> Result<Vec<Todo>> {
        self.list(&TodoFilter::Priority(priority), SortOrder::Newest)
    }

    /// All todos, most urgent first, newest first within a priority
    pub fn get_all_sorted_by_priority(&self) -> Result<Vec<Todo>> {
        self.list(&TodoFilter::All, SortOrder::Priority)
    }

    // ========================================================================
    // Tag maintenance
    // ========================================================================

    /// Every distinct tag in use, sorted
    pub fn list_tags(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT tags FROM todos")?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;

        let mut tags = BTreeSet::new();
        for row in rows {
            tags.extend(decode_tags(row?.as_deref())?);
        }
        Ok(tags.into_iter().collect())
    }

    /// Replace every occurrence of `old` with `new`; returns todos touched
    pub fn rename_tag(&self, old: &str, new: &str) -> Result<usize> {
        let count = self.rewrite_tags(|tags| {
            if !tags.iter().any(|t| t == old) {
                return None;
            }
            Some(
                tags.iter()
                    .map(|t| if t == old { new.to_string() } else { t.clone() })
                    .collect(),
            )
        })?;
        info!(old, new, count, "Renamed tag");
        Ok(count)
    }

    /// Remove every occurrence of `tag`; returns todos touched
    pub fn delete_tag_from_all(&self, tag: &str) -> Result<usize> {
        let count = self.rewrite_tags(|tags| {
            if !tags.iter().any(|t| t == tag) {
                return None;
            }
            Some(tags.iter().filter(|t| *t != tag).cloned().collect())
        })?;
        info!(tag, count, "Deleted tag");
        Ok(count)
    }

    /// Scan every row and write back the tag lists `rewrite` changes
    ///
    /// `rewrite` returns `None` for rows it leaves alone. Each changed row is
    /// written with one UPDATE, inside a single transaction.
    fn rewrite_tags<F>(&self, rewrite: F) -> Result<usize>
    where
        F: Fn(&[String]) -> Option<Vec<String>>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let rows: Vec<(String, Option<String>, String)> = {
            let mut stmt = tx.prepare("SELECT id, tags, updated_at FROM todos")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut count = 0;
        for (id, raw_tags, updated_at) in rows {
            let tags = decode_tags(raw_tags.as_deref()).wrap_err_with(|| format!("Invalid tags stored for todo {}", id))?;
            let Some(rewritten) = rewrite(&tags) else {
                continue;
            };

            let previous = parse_timestamp(&updated_at)?;
            tx.execute(
                "UPDATE todos SET tags = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    encode_tags(&rewritten)?,
                    format_timestamp(&next_timestamp(previous)),
                    id
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Set status on every listed todo; returns rows changed
    pub fn bulk_update_status(&self, ids: &[String], status: TodoStatus) -> Result<usize> {
        self.bulk_update(ids, "status", Value::Text(status.as_str().to_string()))
    }

    /// Set priority on every listed todo; returns rows changed
    pub fn bulk_update_priority(&self, ids: &[String], priority: u8) -> Result<usize> {
        validate_priority(priority)?;
        self.bulk_update(ids, "priority", Value::Integer(i64::from(priority)))
    }

    /// Delete every listed todo; returns rows removed
    pub fn bulk_delete(&self, ids: &[String]) -> Result<usize> {
        let unique = unique_ids(ids);
        if unique.is_empty() {
            return Ok(0);
        }

        let conn = self.connect()?;
        let mut count = 0;
        for chunk in unique.chunks(BULK_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM todos WHERE id IN ({})", placeholders);
            count += conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }

        debug!(requested = ids.len(), unique = unique.len(), count, "bulk delete");
        Ok(count)
    }

    /// Set `column` on each listed todo, stamping a per-row `next_timestamp`
    ///
    /// `column` is always a fixed name from this module, never caller input.
    fn bulk_update(&self, ids: &[String], column: &'static str, value: Value) -> Result<usize> {
        let unique = unique_ids(ids);
        if unique.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut count = 0;
        {
            let mut select = tx.prepare("SELECT updated_at FROM todos WHERE id = ?1")?;
            let mut update = tx.prepare(&format!(
                "UPDATE todos SET {} = ?1, updated_at = ?2 WHERE id = ?3",
                column
            ))?;

            for id in &unique {
                let Some(previous) = select
                    .query_row([id], |row| row.get::<_, String>(0))
                    .optional()?
                else {
                    continue;
                };
                let ts = next_timestamp(parse_timestamp(&previous)?);
                count += update.execute(params![value, format_timestamp(&ts), id])?;
            }
        }
        tx.commit()?;

        debug!(column, requested = ids.len(), unique = unique.len(), count, "bulk update");
        Ok(count)
    }

    // ========================================================================
    // Import / export
    // ========================================================================

    /// Write the whole collection to `path` as JSON
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        transfer::write_json(path.as_ref(), &self.get_all()?)
    }

    /// Write the whole collection to `path` as CSV
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        transfer::write_csv(path.as_ref(), &self.get_all()?)
    }

    pub fn import_json<P: AsRef<Path>>(&self, path: P) -> Result<ImportSummary> {
        let records = transfer::read_json(path.as_ref())?;
        self.import_records(records)
    }

    pub fn import_csv<P: AsRef<Path>>(&self, path: P) -> Result<ImportSummary> {
        let records = transfer::read_csv(path.as_ref())?;
        self.import_records(records)
    }

    pub fn export<P: AsRef<Path>>(&self, format: TransferFormat, path: P) -> Result<()> {
        match format {
            TransferFormat::Json => self.export_json(path),
            TransferFormat::Csv => self.export_csv(path),
        }
    }

    pub fn import<P: AsRef<Path>>(&self, format: TransferFormat, path: P) -> Result<ImportSummary> {
        let records = read_records(format, path.as_ref())?;
        self.import_records(records)
    }

    /// Replace the whole store with the contents of an import file
    ///
    /// The file is read and validated before the database is reset, so a
    /// missing or malformed file leaves existing todos untouched.
    pub fn import_new<P: AsRef<Path>>(&self, format: TransferFormat, path: P) -> Result<ImportSummary> {
        let records = read_records(format, path.as_ref())?;
        self.reset()?;
        self.import_records(records)
    }

    /// Insert validated records, skipping ids already present
    ///
    /// An id seen earlier in the same batch is also skipped.
    fn import_records(&self, records: Vec<ImportRecord>) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut seen = HashSet::new();

        for record in records {
            if let Some(id) = &record.id {
                if !seen.insert(id.clone()) || self.get_by_id(id)?.is_some() {
                    warn!(id = %id, title = %record.todo.title, "Skipping import of existing todo");
                    summary.skipped += 1;
                    continue;
                }
            }
            self.insert(record.todo)?;
            summary.imported += 1;
        }

        info!(imported = summary.imported, skipped = summary.skipped, "Import complete");
        Ok(summary)
    }
}

fn read_records(format: TransferFormat, path: &Path) -> Result<Vec<ImportRecord>> {
    match format {
        TransferFormat::Json => transfer::read_json(path),
        TransferFormat::Csv => transfer::read_csv(path),
    }
}

/// Ids in first-seen order with duplicates removed
fn unique_ids(ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter().map(String::as_str).filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("todos.db")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_open_creates_database() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/todos.db");

        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_init_is_idempotent() {
        let (_temp, store) = open_temp();
        store.insert(NewTodo::new("keep me")).unwrap();

        store.init().unwrap();
        store.init().unwrap();

        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_clears_data() {
        let (_temp, store) = open_temp();
        store.insert(NewTodo::new("gone")).unwrap();

        store.reset().unwrap();

        assert!(store.path().exists());
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_insert_defaults() {
        let (_temp, store) = open_temp();

        let todo = store.insert(NewTodo::new("Defaults")).unwrap();
        assert_eq!(todo.status, TodoStatus::Todo);
        assert_eq!(todo.priority, 3);
        assert!(todo.tags.is_empty());
        assert!(todo.description.is_none());
        assert_eq!(todo.created_at, todo.updated_at);
    }

    #[test]
    fn test_insert_rejects_invalid_input() {
        let (_temp, store) = open_temp();

        assert!(store.insert(NewTodo::new("")).is_err());
        assert!(store.insert(NewTodo::new("x").priority(0)).is_err());
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_schema_priority_default() {
        let (_temp, store) = open_temp();
        let conn = store.connect().unwrap();
        conn.execute(
            "INSERT INTO todos (id, title, status, created_at, updated_at)
             VALUES ('raw', 'Raw row', 'TODO', '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        let todo = store.get_by_id("raw").unwrap().unwrap();
        assert_eq!(todo.priority, 3);
        assert!(todo.tags.is_empty());
    }

    #[test]
    fn test_update_rejects_invalid_merge() {
        let (_temp, store) = open_temp();
        let todo = store.insert(NewTodo::new("valid")).unwrap();

        let update = TodoUpdate {
            priority: Some(7),
            ..Default::default()
        };
        assert!(store.update(&todo.id, update).is_err());
        assert_eq!(store.get_by_id(&todo.id).unwrap().unwrap().priority, 3);
    }

    #[test]
    fn test_bulk_chunking() {
        let (_temp, store) = open_temp();
        let mut ids: Vec<String> = (0..BULK_CHUNK_SIZE + 10).map(|i| format!("missing-{}", i)).collect();
        let todo = store.insert(NewTodo::new("real")).unwrap();
        ids.push(todo.id.clone());

        assert_eq!(store.bulk_delete(&ids).unwrap(), 1);
        assert!(store.get_by_id(&todo.id).unwrap().is_none());
    }

    fn set_updated_at(store: &Store, id: &str, ts: &str) {
        let conn = store.connect().unwrap();
        conn.execute("UPDATE todos SET updated_at = ?1 WHERE id = ?2", [ts, id])
            .unwrap();
    }

    #[test]
    fn test_bulk_updates_refresh_stale_timestamp() {
        let (_temp, store) = open_temp();
        let todo = store.insert(NewTodo::new("stale")).unwrap();
        let ids = vec![todo.id.clone()];

        set_updated_at(&store, &todo.id, "2001-01-01T00:00:00.000000Z");
        assert_eq!(store.bulk_update_status(&ids, TodoStatus::Done).unwrap(), 1);
        let after_status = store.get_by_id(&todo.id).unwrap().unwrap();
        assert!(after_status.updated_at > parse_timestamp("2001-01-01T00:00:00.000000Z").unwrap());
        assert_eq!(after_status.status, TodoStatus::Done);

        set_updated_at(&store, &todo.id, "2001-01-01T00:00:00.000000Z");
        assert_eq!(store.bulk_update_priority(&ids, 1).unwrap(), 1);
        let after_priority = store.get_by_id(&todo.id).unwrap().unwrap();
        assert!(after_priority.updated_at > parse_timestamp("2001-01-01T00:00:00.000000Z").unwrap());
        assert_eq!(after_priority.priority, 1);
    }

    #[test]
    fn test_bulk_updates_never_move_timestamp_backwards() {
        let (_temp, store) = open_temp();
        let todo = store.insert(NewTodo::new("ahead")).unwrap();
        let ids = vec![todo.id.clone()];
        let future = now() + chrono::Duration::hours(1);
        set_updated_at(&store, &todo.id, &format_timestamp(&future));

        store.bulk_update_status(&ids, TodoStatus::InProgress).unwrap();
        let first = store.get_by_id(&todo.id).unwrap().unwrap().updated_at;
        assert!(first > future);

        store.bulk_update_priority(&ids, 5).unwrap();
        let second = store.get_by_id(&todo.id).unwrap().unwrap().updated_at;
        assert!(second > first);
    }

    #[test]
    fn test_import_new_keeps_data_when_file_is_bad() {
        let (temp, store) = open_temp();
        let kept = store.insert(NewTodo::new("keep me")).unwrap();

        let bad = temp.path().join("bad.json");
        fs::write(&bad, r#"[{"description": "no title"}]"#).unwrap();
        assert!(store.import_new(TransferFormat::Json, &bad).is_err());

        let missing = temp.path().join("missing.csv");
        assert!(store.import_new(TransferFormat::Csv, &missing).is_err());

        let remaining = store.get_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);
    }

    #[test]
    fn test_import_new_replaces_contents() {
        let (temp, store) = open_temp();
        store.insert(NewTodo::new("old")).unwrap();

        let file = temp.path().join("fresh.json");
        fs::write(&file, r#"[{"title": "new one"}, {"title": "new two", "priority": 1}]"#).unwrap();
        let summary = store.import_new(TransferFormat::Json, &file).unwrap();

        assert_eq!(summary.imported, 2);
        let titles: Vec<String> = store.get_all().unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["new two", "new one"]);
    }

    #[test]
    fn test_bulk_update_priority_validates() {
        let (_temp, store) = open_temp();
        let todo = store.insert(NewTodo::new("p")).unwrap();
        assert!(store.bulk_update_priority(&[todo.id], 6).is_err());
    }
}
