use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Map, Value};

use crate::chunking::{chunk_text, Boundary};
use crate::classifier::{normalize_extension, FileType};
use crate::error::ExtractionError;
use crate::extractor::{ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind};

/// CSV files and Excel workbooks. The first row of each sheet is the header;
/// every following row becomes a record keyed by header name.
pub struct SpreadsheetExtractor;

impl SpreadsheetExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpreadsheetExtractor {
    fn default() -> Self {
        Self::new()
    }
}

struct Sheet {
    name: String,
    rows: Vec<Vec<Value>>,
}

impl ContentExtractor for SpreadsheetExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Spreadsheet
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::Spreadsheet
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
            .unwrap_or_default();

        let sheets = match extension.as_str() {
            "csv" => vec![read_csv(path)?],
            "xlsx" | "xls" => read_workbook(path)?,
            other => {
                return Err(ExtractionError::UnsupportedFormat(format!(
                    "unknown spreadsheet format '.{}'",
                    other
                )))
            }
        };

        let mut text = String::new();
        let mut records = Vec::new();
        let mut sheet_names = Vec::new();

        for sheet in &sheets {
            sheet_names.push(Value::String(sheet.name.clone()));
            if sheets.len() > 1 {
                text.push_str(&format!("Sheet: {}\n", sheet.name));
            }

            let mut rows = sheet.rows.iter();
            let Some(header_row) = rows.next() else {
                continue;
            };
            let headers: Vec<String> = header_row
                .iter()
                .enumerate()
                .map(|(i, cell)| match cell_text(cell) {
                    name if name.is_empty() => format!("column_{}", i + 1),
                    name => name,
                })
                .collect();
            text.push_str(&headers.join(" | "));
            text.push('\n');

            for row in rows {
                if row.iter().all(Value::is_null) {
                    continue;
                }
                let mut record = Map::new();
                if sheets.len() > 1 {
                    record.insert("sheet".to_string(), Value::String(sheet.name.clone()));
                }
                for (i, cell) in row.iter().enumerate() {
                    let key = headers
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("column_{}", i + 1));
                    record.insert(key, cell.clone());
                }
                records.push(Value::Object(record));

                let line: Vec<String> = row.iter().map(cell_text).collect();
                text.push_str(&line.join(" | "));
                text.push('\n');
            }
        }

        let chunks = chunk_text(&text, options.chunk_size, Boundary::Row);
        let outcome = ExtractionOutcome {
            raw_content: Some(text),
            chunks,
            ..Default::default()
        }
        .with_meta("format", extension)
        .with_meta("sheets", Value::Array(sheet_names))
        .with_meta("row_count", records.len());

        Ok(ExtractionOutcome { records, ..outcome })
    }
}

fn read_csv(path: &Path) -> Result<Sheet, ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut rows = Vec::new();
    for result in reader.byte_records() {
        let record = result.map_err(|e| csv_error(path, e))?;
        rows.push(
            record
                .iter()
                .map(|field| Value::String(String::from_utf8_lossy(field).into_owned()))
                .collect(),
        );
    }

    Ok(Sheet {
        name: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        rows,
    })
}

fn csv_error(path: &Path, e: csv::Error) -> ExtractionError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => ExtractionError::read(path, io),
            other => ExtractionError::corrupt("CSV", format!("{:?}", other)),
        }
    } else {
        ExtractionError::corrupt("CSV", e)
    }
}

fn read_workbook(path: &Path) -> Result<Vec<Sheet>, ExtractionError> {
    let _span = tracing::info_span!("extractor.workbook").entered();

    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExtractionError::corrupt("spreadsheet", e))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::debug!("Skipping sheet '{}' in {}: {}", name, path.display(), e);
                continue;
            }
        };
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect();
        sheets.push(Sheet { name, rows });
    }
    Ok(sheets)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn options() -> ExtractOptions {
        ExtractOptions {
            chunk_size: 1000,
            max_rows_per_table: 10,
        }
    }

    #[test]
    fn test_csv_records_keyed_by_header() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "id,name\n1,alice\n2,bob\n").unwrap();

        let outcome = SpreadsheetExtractor::new()
            .extract(file.path(), &options())
            .unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0]["id"], "1");
        assert_eq!(outcome.records[1]["name"], "bob");
        assert_eq!(outcome.metadata["row_count"], 2);
        assert_eq!(
            outcome.raw_content.as_deref(),
            Some("id | name\n1 | alice\n2 | bob\n")
        );
    }

    #[test]
    fn test_csv_ragged_rows_get_positional_keys() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "a\n1,2\n").unwrap();

        let outcome = SpreadsheetExtractor::new()
            .extract(file.path(), &options())
            .unwrap();
        assert_eq!(outcome.records[0]["a"], "1");
        assert_eq!(outcome.records[0]["column_2"], "2");
    }

    #[test]
    fn test_empty_csv_has_no_records() {
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        let outcome = SpreadsheetExtractor::new()
            .extract(file.path(), &options())
            .unwrap();
        assert!(outcome.records.is_empty());
        assert!(outcome.chunks.is_empty());
    }

    #[test]
    fn test_corrupt_workbook_fails() {
        let mut file = NamedTempFile::with_suffix(".xlsx").unwrap();
        write!(file, "not a workbook").unwrap();

        let result = SpreadsheetExtractor::new().extract(file.path(), &options());
        assert!(matches!(result, Err(ExtractionError::Corrupt { .. })));
    }
}
