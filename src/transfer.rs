// JSON and CSV file formats for bulk import/export

use crate::models::{NewTodo, PRIORITY_DEFAULT, Todo};
use crate::record::{decode_tags, encode_tags, format_timestamp};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub const CSV_HEADER: [&str; 8] = [
    "id",
    "title",
    "description",
    "tags",
    "status",
    "priority",
    "created_at",
    "updated_at",
];

/// File format for import/export
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransferFormat {
    Json,
    Csv,
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records inserted as new todos
    pub imported: usize,
    /// Records skipped because their id already exists
    pub skipped: usize,
}

/// One validated record read from an import file
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    /// Id carried by the file, used only for duplicate detection
    pub id: Option<String>,
    pub todo: NewTodo,
}

#[derive(Debug, Deserialize)]
struct JsonImport {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    /// Integer, integral float, or numeric string
    #[serde(default)]
    priority: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CsvImport {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

fn integral_priority(n: f64) -> Option<u8> {
    (n.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&n)).then_some(n as u8)
}

/// Priority from text; blank means the default
fn parse_priority_text(raw: &str) -> Result<u8> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(PRIORITY_DEFAULT);
    }
    raw.parse::<u8>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(integral_priority))
        .ok_or_else(|| eyre!("Invalid priority {:?}", raw))
}

/// Priority from a JSON value; absent or null means the default
fn json_priority(value: Option<&serde_json::Value>) -> Result<u8> {
    use serde_json::Value;

    match value {
        None | Some(Value::Null) => Ok(PRIORITY_DEFAULT),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .or_else(|| n.as_f64().and_then(integral_priority))
            .ok_or_else(|| eyre!("Invalid priority {}", n)),
        Some(Value::String(s)) => parse_priority_text(s),
        Some(other) => Err(eyre!("Invalid priority {}", other)),
    }
}

fn build_record(
    id: Option<String>,
    title: String,
    description: Option<String>,
    tags: Vec<String>,
    priority: u8,
) -> Result<ImportRecord> {
    let todo = NewTodo {
        title,
        description,
        tags,
        priority,
    };
    todo.validate()?;
    Ok(ImportRecord {
        id: id.filter(|id| !id.trim().is_empty()),
        todo,
    })
}

/// Write todos as a pretty-printed JSON array, replacing any existing file
pub fn write_json(path: &Path, todos: &[Todo]) -> Result<()> {
    let file = File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, todos).context("Failed to serialize todos")?;
    writeln!(writer)?;
    writer.flush()?;
    debug!(path = ?path, count = todos.len(), "Wrote JSON export");
    Ok(())
}

/// Read and validate every record of a JSON import file
///
/// Fails on the first malformed record; nothing is returned in that case.
pub fn read_json(path: &Path) -> Result<Vec<ImportRecord>> {
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let items: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(file))
        .wrap_err_with(|| format!("{} is not a JSON array", path.display()))?;

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let parsed: JsonImport =
                serde_json::from_value(item).wrap_err_with(|| format!("Malformed todo at record {}", i + 1))?;
            let priority =
                json_priority(parsed.priority.as_ref()).wrap_err_with(|| format!("Invalid todo at record {}", i + 1))?;
            build_record(
                parsed.id,
                parsed.title,
                parsed.description,
                parsed.tags.unwrap_or_default(),
                priority,
            )
            .wrap_err_with(|| format!("Invalid todo at record {}", i + 1))
        })
        .collect()
}

/// Write todos as CSV with a header row; tags are a JSON array string
pub fn write_csv(path: &Path, todos: &[Todo]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(CSV_HEADER)?;

    for todo in todos {
        wtr.write_record([
            todo.id.clone(),
            todo.title.clone(),
            todo.description.clone().unwrap_or_default(),
            encode_tags(&todo.tags)?,
            todo.status.to_string(),
            todo.priority.to_string(),
            format_timestamp(&todo.created_at),
            format_timestamp(&todo.updated_at),
        ])?;
    }

    wtr.flush()?;
    debug!(path = ?path, count = todos.len(), "Wrote CSV export");
    Ok(())
}

/// Read and validate every row of a CSV import file
///
/// Fails on the first malformed row; nothing is returned in that case.
pub fn read_csv(path: &Path) -> Result<Vec<ImportRecord>> {
    let mut rdr = csv::Reader::from_path(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let mut records = Vec::new();

    for result in rdr.records() {
        let row = result.context("Failed to read CSV row")?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        let parsed: CsvImport = row
            .deserialize(Some(&headers))
            .wrap_err_with(|| format!("Malformed todo on line {}", line))?;
        let tags = decode_tags(parsed.tags.as_deref()).wrap_err_with(|| format!("Invalid tags on line {}", line))?;
        let priority = parse_priority_text(parsed.priority.as_deref().unwrap_or_default())
            .wrap_err_with(|| format!("Invalid priority on line {}", line))?;
        let description = parsed.description.filter(|d| !d.is_empty());

        records.push(
            build_record(parsed.id, parsed.title, description, tags, priority)
                .wrap_err_with(|| format!("Invalid todo on line {}", line))?,
        );
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TodoStatus, now};
    use std::fs;
    use tempfile::TempDir;

    fn todo(title: &str, tags: &[&str]) -> Todo {
        let ts = now();
        Todo {
            id: format!("id-{}", title),
            title: title.to_string(),
            description: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            status: TodoStatus::Done,
            priority: 2,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_write_json_shape() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");

        write_json(&path, &[todo("Buy milk", &["home"])]).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let obj = &value.as_array().unwrap()[0];
        assert_eq!(obj["id"], "id-Buy milk");
        assert_eq!(obj["tags"], serde_json::json!(["home"]));
        assert_eq!(obj["status"], "DONE");
        assert_eq!(obj["priority"], 2);
        assert!(obj["description"].is_null());
        assert!(obj["created_at"].is_string());
        assert!(obj["updated_at"].is_string());
    }

    #[test]
    fn test_read_json_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");
        fs::write(&path, r#"[{"title": "Only title", "status": "DONE", "created_at": "whatever"}]"#).unwrap();

        let records = read_json(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, None);
        assert_eq!(records[0].todo, NewTodo::new("Only title"));
    }

    #[test]
    fn test_read_json_missing_title() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");
        fs::write(&path, r#"[{"title": "fine"}, {"description": "no title"}]"#).unwrap();

        let err = read_json(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("record 2"));
    }

    #[test]
    fn test_read_json_priority_out_of_range() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");
        fs::write(&path, r#"[{"title": "x", "priority": 9}]"#).unwrap();

        assert!(read_json(&path).is_err());
    }

    #[test]
    fn test_read_json_priority_forms() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");
        fs::write(
            &path,
            r#"[
                {"title": "int", "priority": 1},
                {"title": "float", "priority": 2.0},
                {"title": "text", "priority": "4"},
                {"title": "padded", "priority": " 5 "},
                {"title": "null", "priority": null}
            ]"#,
        )
        .unwrap();

        let priorities: Vec<u8> = read_json(&path).unwrap().into_iter().map(|r| r.todo.priority).collect();
        assert_eq!(priorities, vec![1, 2, 4, 5, PRIORITY_DEFAULT]);
    }

    #[test]
    fn test_read_json_rejects_non_integral_priority() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");

        for bad in [r#""high""#, "2.5", "-1", "true", "[1]"] {
            fs::write(&path, format!(r#"[{{"title": "x", "priority": {}}}]"#, bad)).unwrap();
            let err = read_json(&path).unwrap_err();
            assert!(format!("{:#}", err).contains("record 1"), "accepted priority {}", bad);
        }
    }

    #[test]
    fn test_read_csv_priority_forms() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.csv");
        fs::write(&path, "title,priority
a,1
b,2.0
c, 4
d,
").unwrap();

        let priorities: Vec<u8> = read_csv(&path).unwrap().into_iter().map(|r| r.todo.priority).collect();
        assert_eq!(priorities, vec![1, 2, 4, PRIORITY_DEFAULT]);
    }

    #[test]
    fn test_write_csv_header_and_tags() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");

        write_csv(&path, &[todo("Walk, dog", &["a", "b"])]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,title,description,tags,status,priority,created_at,updated_at"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"Walk, dog\""));
        assert!(row.contains(r#""[""a"",""b""]""#));
    }

    #[test]
    fn test_read_csv_empty_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.csv");
        fs::write(
            &path,
            "id,title,description,tags,status,priority,created_at,updated_at\n,Plain,,,TODO,,,\n",
        )
        .unwrap();

        let records = read_csv(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, None);
        assert_eq!(records[0].todo, NewTodo::new("Plain"));
    }

    #[test]
    fn test_read_csv_bad_tags() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.csv");
        fs::write(&path, "id,title,tags,priority\nx,Good,[],1\ny,Bad,not-json,1\n").unwrap();

        let err = read_csv(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));
    }
}
