use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{json, Value};

use crate::chunking::{chunk_text, Boundary};
use crate::classifier::{normalize_extension, FileType};
use crate::error::ExtractionError;
use crate::extractor::document::resolve_reference;
use crate::extractor::{
    read_text_lossy, ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind,
};

/// Configuration files flattened into `{key, value, type}` records.
///
/// Nested JSON and YAML keys are joined with `.` and array indices with
/// `[n]`. XML element paths exclude the root element and attributes are
/// keyed `path@name`. INI entries carry their section.
pub struct ConfigExtractor;

impl ConfigExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConfigExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for ConfigExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Config
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::Config
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
        let text = read_text_lossy(path)?;

        let (format, records) = match extension.as_str() {
            "json" => {
                let value: Value =
                    serde_json::from_str(&text).map_err(|e| ExtractionError::corrupt("JSON", e))?;
                ("json", flatten_value(&value))
            }
            "yaml" | "yml" => {
                let value: Value =
                    serde_yaml::from_str(&text).map_err(|e| ExtractionError::corrupt("YAML", e))?;
                ("yaml", flatten_value(&value))
            }
            "xml" => (
                "xml",
                parse_xml(&text).map_err(|e| ExtractionError::corrupt("XML", e))?,
            ),
            "ini" | "cfg" | "conf" => ("ini", parse_ini(&text)),
            _ => ("key_value", parse_key_value(&text)),
        };

        let chunks = chunk_text(&text, options.chunk_size, Boundary::Line);
        let outcome = ExtractionOutcome {
            raw_content: Some(text),
            chunks,
            ..Default::default()
        }
        .with_meta("format", format)
        .with_meta("entry_count", records.len());

        Ok(ExtractionOutcome { records, ..outcome })
    }
}

fn flatten_value(value: &Value) -> Vec<Value> {
    let mut records = Vec::new();
    flatten_into(value, String::new(), &mut records);
    records
}

fn flatten_into(value: &Value, prefix: String, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, path, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{}[{}]", prefix, i), out);
            }
        }
        leaf => out.push(json!({
            "key": prefix,
            "value": scalar_text(leaf),
            "type": json_type(leaf),
        })),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_xml(xml: &str) -> Result<Vec<Value>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);

    let mut records = Vec::new();
    // Element names below the root.
    let mut path: Vec<String> = Vec::new();
    let mut depth = 0usize;
    // Character data of the current element, references already resolved.
    let mut text = String::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Text(e) => {
                text.push_str(&e.decode()?);
                continue;
            }
            Event::GeneralRef(r) => {
                text.push_str(&resolve_reference(r)?);
                continue;
            }
            Event::CData(e) => {
                text.push_str(&e.decode()?);
                continue;
            }
            _ => flush_text(&mut text, &path, &mut records),
        }

        match event {
            Event::Start(ref e) => {
                if depth > 0 {
                    path.push(element_name(e));
                }
                depth += 1;
                push_attributes(e, &path, &mut records);
            }
            Event::Empty(ref e) => {
                let mut child_path = path.clone();
                if depth > 0 {
                    child_path.push(element_name(e));
                }
                push_attributes(e, &child_path, &mut records);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth > 0 {
                    path.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(records)
}

fn flush_text(text: &mut String, path: &[String], out: &mut Vec<Value>) {
    let value = text.trim();
    if !value.is_empty() && !path.is_empty() {
        out.push(json!({
            "key": path.join("."),
            "value": value,
            "type": "text",
        }));
    }
    text.clear();
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn push_attributes(e: &BytesStart<'_>, path: &[String], out: &mut Vec<Value>) {
    let key = path.join(".");
    for attr in e.attributes().flatten() {
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if name == "xmlns" || name.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value().unwrap_or_default();
        out.push(json!({
            "key": format!("{}@{}", key, name),
            "value": value,
            "type": "attribute",
        }));
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

fn parse_ini(text: &str) -> Vec<Value> {
    let mut records = Vec::new();
    let mut section: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = Some(name.trim().to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        records.push(json!({
            "section": section,
            "key": key.trim(),
            "value": value.trim(),
            "type": "ini_setting",
        }));
    }
    records
}

fn parse_key_value(text: &str) -> Vec<Value> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }
        let pair = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .or_else(|| line.split_once(char::is_whitespace));
        if let Some((key, value)) = pair {
            records.push(json!({
                "key": key.trim(),
                "value": value.trim(),
                "type": "key_value",
                "line_number": index + 1,
            }));
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn extract(suffix: &str, content: &str) -> Result<ExtractionOutcome, ExtractionError> {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        write!(file, "{}", content).unwrap();
        ConfigExtractor::new().extract(
            file.path(),
            &ExtractOptions {
                chunk_size: 1000,
                max_rows_per_table: 10,
            },
        )
    }

    fn find<'a>(records: &'a [Value], key: &str) -> &'a Value {
        records
            .iter()
            .find(|r| r["key"] == key)
            .unwrap_or_else(|| panic!("missing key {}", key))
    }

    #[test]
    fn test_json_is_flattened() {
        let outcome = extract(
            ".json",
            r#"{"db": {"host": "localhost", "port": 5432}, "tags": ["a", "b"], "debug": false}"#,
        )
        .unwrap();
        let records = &outcome.records;
        assert_eq!(find(records, "db.host")["value"], "localhost");
        assert_eq!(find(records, "db.port")["type"], "number");
        assert_eq!(find(records, "tags[1]")["value"], "b");
        assert_eq!(find(records, "debug")["value"], "false");
        assert_eq!(outcome.metadata["format"], "json");
    }

    #[test]
    fn test_yaml_is_flattened() {
        let outcome = extract(".yaml", "server:\n  bind: 0.0.0.0\n  workers: 4\n").unwrap();
        assert_eq!(find(&outcome.records, "server.bind")["value"], "0.0.0.0");
        assert_eq!(find(&outcome.records, "server.workers")["value"], "4");
    }

    #[test]
    fn test_invalid_json_fails() {
        let result = extract(".json", "{ not json");
        assert!(matches!(
            result,
            Err(ExtractionError::Corrupt { format: "JSON", .. })
        ));
    }

    #[test]
    fn test_xml_paths_and_attributes() {
        let xml = r#"<configuration><appSettings><add key="Mode" value="prod"/></appSettings><timeout unit="s">30</timeout></configuration>"#;
        let outcome = extract(".xml", xml).unwrap();
        let records = &outcome.records;
        assert_eq!(find(records, "timeout")["value"], "30");
        assert_eq!(find(records, "timeout@unit")["value"], "s");
        assert_eq!(find(records, "appSettings.add@key")["value"], "Mode");
        assert_eq!(find(records, "appSettings.add@value")["type"], "attribute");
    }

    #[test]
    fn test_xml_text_keeps_references() {
        let xml = r#"<settings><owner>AT&amp;T &lt;ops&gt;</owner><note>&#169; Acme</note><query><![CDATA[a < b]]></query></settings>"#;
        let outcome = extract(".xml", xml).unwrap();
        let records = &outcome.records;
        assert_eq!(find(records, "owner")["value"], "AT&T <ops>");
        assert_eq!(find(records, "note")["value"], "\u{a9} Acme");
        assert_eq!(find(records, "query")["value"], "a < b");
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_ini_sections() {
        let outcome = extract(
            ".ini",
            "; comment\n[database]\nhost = db01\nport=1433\n\n[paths]\nroot: /srv\n",
        )
        .unwrap();
        let records = &outcome.records;
        assert_eq!(records.len(), 3);
        assert_eq!(find(records, "host")["section"], "database");
        assert_eq!(find(records, "root")["section"], "paths");
        assert_eq!(find(records, "root")["value"], "/srv");
    }

    #[test]
    fn test_key_value_fallback() {
        let outcome = extract(".config", "# header\nMaxClients 150\nTimeout=60\n").unwrap();
        let records = &outcome.records;
        assert_eq!(find(records, "MaxClients")["value"], "150");
        assert_eq!(find(records, "Timeout")["line_number"], 3);
        assert_eq!(outcome.metadata["format"], "key_value");
    }
}
