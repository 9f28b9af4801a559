use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Map, Value};

use crate::chunking::{chunk_text, Boundary};
use crate::classifier::FileType;
use crate::error::ExtractionError;
use crate::extractor::{ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind};

/// Reads SQLite databases found inside a backup. The file is opened
/// read-only so extraction never touches the snapshot.
pub struct SqliteExtractor;

impl SqliteExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteExtractor {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct TableDump {
    pub name: String,
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Vec<Value>>,
    pub truncated: bool,
    /// Rows the source declares, when known beyond the capped sample.
    pub estimated_rows: Option<usize>,
}

impl TableDump {
    pub(crate) fn to_record(&self) -> Value {
        let column_names: Vec<&str> = self.columns.iter().map(|(n, _)| n.as_str()).collect();
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (name, value) in column_names.iter().zip(row) {
                    object.insert(name.to_string(), value.clone());
                }
                Value::Object(object)
            })
            .collect();

        let mut record = json!({
            "table": self.name,
            "columns": self
                .columns
                .iter()
                .map(|(name, ty)| json!({ "name": name, "type": ty }))
                .collect::<Vec<_>>(),
            "row_count": self.rows.len(),
            "rows": rows,
            "truncated": self.truncated,
        });
        if let (Some(estimated), Some(object)) = (self.estimated_rows, record.as_object_mut()) {
            object.insert("estimated_rows".to_string(), Value::from(estimated));
        }
        record
    }

    /// Header line followed by one `|`-joined line per row.
    pub(crate) fn write_text(&self, out: &mut String) {
        let names: Vec<&str> = self.columns.iter().map(|(n, _)| n.as_str()).collect();
        out.push_str(&format!("Table: {} ({})\n", self.name, names.join(", ")));
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
    }
}

/// Builds the outcome shared by every database extractor.
pub(crate) fn tables_outcome(
    tables: &[TableDump],
    options: &ExtractOptions,
) -> ExtractionOutcome {
    let mut text = String::new();
    for table in tables {
        table.write_text(&mut text);
    }
    let truncated = tables.iter().any(|t| t.truncated);
    let table_names: Vec<Value> = tables.iter().map(|t| Value::from(t.name.as_str())).collect();

    ExtractionOutcome {
        chunks: chunk_text(&text, options.chunk_size, Boundary::Row),
        raw_content: Some(text),
        records: tables.iter().map(TableDump::to_record).collect(),
        truncated,
        ..Default::default()
    }
    .with_meta("table_count", tables.len())
    .with_meta("tables", Value::Array(table_names))
}

impl ContentExtractor for SqliteExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Sqlite
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::SqliteDb
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let _span = tracing::info_span!("extractor.sqlite").entered();

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let table_names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt.query_map([], |row| row.get(0))?;
            names.collect::<Result<_, _>>()?
        };

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            tables.push(dump_table(&conn, name, options.max_rows_per_table)?);
        }

        Ok(tables_outcome(&tables, options).with_meta("dialect", "sqlite"))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn dump_table(
    conn: &Connection,
    name: String,
    max_rows: usize,
) -> Result<TableDump, ExtractionError> {
    let quoted = quote_identifier(&name);

    let columns: Vec<(String, String)> = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quoted))?;
        let columns = stmt.query_map([], |row| Ok((row.get(1)?, row.get(2)?)))?;
        columns.collect::<Result<_, _>>()?
    };

    // One extra row tells us whether the cap cut anything off.
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT ?1", quoted))?;
    let column_count = stmt.column_count();
    let mut rows_iter = stmt.query([(max_rows as i64) + 1])?;

    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows_iter.next()? {
        if rows.len() == max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(sql_value(row.get_ref(i)?));
        }
        rows.push(values);
    }

    Ok(TableDump {
        name,
        columns,
        rows,
        truncated,
        estimated_rows: None,
    })
}

fn sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_db(rows: usize) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL);
             CREATE TABLE \"odd name\" (v BLOB);
             INSERT INTO \"odd name\" VALUES (x'0102');",
        )
        .unwrap();
        for i in 0..rows {
            conn.execute(
                "INSERT INTO users (name, score) VALUES (?1, ?2)",
                rusqlite::params![format!("user{}", i), i as f64 / 2.0],
            )
            .unwrap();
        }
        (dir, path)
    }

    fn options(max_rows: usize) -> ExtractOptions {
        ExtractOptions {
            chunk_size: 1000,
            max_rows_per_table: max_rows,
        }
    }

    #[test]
    fn test_extracts_tables_and_columns() {
        let (_dir, path) = sample_db(3);
        let outcome = SqliteExtractor::new().extract(&path, &options(100)).unwrap();

        assert_eq!(outcome.records.len(), 2);
        let users = outcome
            .records
            .iter()
            .find(|r| r["table"] == "users")
            .unwrap();
        assert_eq!(users["columns"][1]["name"], "name");
        assert_eq!(users["columns"][2]["type"], "REAL");
        assert_eq!(users["row_count"], 3);
        assert_eq!(users["rows"][0]["name"], "user0");
        assert_eq!(users["truncated"], false);
        assert!(!outcome.truncated);

        let odd = outcome
            .records
            .iter()
            .find(|r| r["table"] == "odd name")
            .unwrap();
        assert_eq!(odd["rows"][0]["v"], "<blob 2 bytes>");
    }

    #[test]
    fn test_row_cap_sets_truncated() {
        let (_dir, path) = sample_db(10);
        let outcome = SqliteExtractor::new().extract(&path, &options(4)).unwrap();

        let users = outcome
            .records
            .iter()
            .find(|r| r["table"] == "users")
            .unwrap();
        assert_eq!(users["row_count"], 4);
        assert_eq!(users["truncated"], true);
        assert!(outcome.truncated);
    }

    #[test]
    fn test_exact_cap_is_not_truncated() {
        let (_dir, path) = sample_db(4);
        let outcome = SqliteExtractor::new().extract(&path, &options(4)).unwrap();
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_garbage_file_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.sqlite");
        std::fs::write(&path, b"this is not a database, just some bytes padding padding").unwrap();

        let result = SqliteExtractor::new().extract(&path, &options(10));
        assert!(matches!(result, Err(ExtractionError::Sqlite(_))));
    }
}
