use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::chunking::{chunk_text, Boundary};
use crate::classifier::FileType;
use crate::error::ExtractionError;
use crate::extractor::{
    read_text_lossy, ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind,
};

/// Known line formats, tried in order. The first match wins.
static LOG_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "apache_access",
            r#"^(?P<ip>\S+) \S+ \S+ \[(?P<timestamp>[^\]]+)\] "(?P<method>\S+) (?P<url>\S+) (?P<protocol>\S+)" (?P<status>\d+) (?P<size>\S+)"#,
        ),
        (
            "apache_error",
            r"^\[(?P<timestamp>[^\]]+)\] \[(?P<level>\w+)\] (?P<message>.*)",
        ),
        (
            "iis",
            r#"^(?P<date>\d{4}-\d{2}-\d{2}) (?P<time>\d{2}:\d{2}:\d{2}) (?P<s_ip>\S+) (?P<method>[A-Z]+) (?P<uri_stem>\S+) (?P<uri_query>\S+) (?P<port>\d+) (?P<username>\S+) (?P<c_ip>\S+) (?P<user_agent>\S+) (?P<referer>\S+) (?P<status>\d+) (?P<substatus>\d+) (?P<sc_status>\d+) (?P<time_taken>\d+)"#,
        ),
        (
            "windows_event",
            r"^(?P<timestamp>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (?P<level>\w+) (?P<source>\S+) (?P<event_id>\d+) (?P<message>.*)",
        ),
        (
            "syslog",
            r"^(?P<timestamp>\w{3} +\d{1,2} \d{2}:\d{2}:\d{2}) (?P<hostname>\S+) (?P<process>[^:\s]+): (?P<message>.*)",
        ),
        (
            "generic",
            r"^(?P<timestamp>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}\S*)\s+(?P<level>\w+)\s+(?P<message>.*)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

/// Line-oriented log parser. Lines matching a known format become structured
/// records; anything else is kept as a message with format `unknown`.
pub struct LogExtractor;

impl LogExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for LogExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Log
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::Log
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let text = read_text_lossy(path)?;

        let mut records = Vec::new();
        let mut formats: BTreeMap<&'static str, u64> = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (format, mut record) = parse_line(line);
            *formats.entry(format).or_default() += 1;
            record.insert("line_number".to_string(), Value::from(index + 1));
            record.insert("raw_line".to_string(), Value::String(line.to_string()));
            records.push(Value::Object(record));
        }

        let dominant = formats
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(name, _)| *name)
            .unwrap_or("unknown");
        let format_counts: Map<String, Value> = formats
            .iter()
            .map(|(name, count)| (name.to_string(), Value::from(*count)))
            .collect();

        let chunks = chunk_text(&text, options.chunk_size, Boundary::Line);
        let outcome = ExtractionOutcome {
            raw_content: Some(text),
            chunks,
            ..Default::default()
        }
        .with_meta("entry_count", records.len())
        .with_meta("detected_format", dominant)
        .with_meta("format_counts", Value::Object(format_counts));

        Ok(ExtractionOutcome { records, ..outcome })
    }
}

/// Parses one non-empty line into its named fields plus `detected_format`.
pub fn parse_line(line: &str) -> (&'static str, Map<String, Value>) {
    for (name, regex) in LOG_PATTERNS.iter() {
        if let Some(captures) = regex.captures(line) {
            let mut record = Map::new();
            for group in regex.capture_names().flatten() {
                if let Some(m) = captures.name(group) {
                    record.insert(group.to_string(), Value::String(m.as_str().to_string()));
                }
            }
            record.insert("detected_format".to_string(), Value::from(*name));
            return (name, record);
        }
    }

    let mut record = Map::new();
    record.insert("message".to_string(), Value::String(line.to_string()));
    record.insert("detected_format".to_string(), Value::from("unknown"));
    ("unknown", record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_apache_access() {
        let line = r#"192.168.1.10 - - [10/Oct/2024:13:55:36 +0000] "GET /index.html HTTP/1.1" 200 2326"#;
        let (format, record) = parse_line(line);
        assert_eq!(format, "apache_access");
        assert_eq!(record["ip"], "192.168.1.10");
        assert_eq!(record["status"], "200");
        assert_eq!(record["url"], "/index.html");
    }

    #[test]
    fn test_parse_apache_error() {
        let (format, record) =
            parse_line("[Thu Oct 10 13:55:36 2024] [error] client denied by server configuration");
        assert_eq!(format, "apache_error");
        assert_eq!(record["level"], "error");
    }

    #[test]
    fn test_parse_syslog() {
        let (format, record) =
            parse_line("Oct 10 13:55:36 backup01 sshd[1234]: Accepted publickey for root");
        assert_eq!(format, "syslog");
        assert_eq!(record["hostname"], "backup01");
        assert_eq!(record["process"], "sshd[1234]");
    }

    #[test]
    fn test_parse_windows_event() {
        let (format, record) =
            parse_line("2024-10-10 13:55:36 Warning Service 7036 The service entered the stopped state");
        assert_eq!(format, "windows_event");
        assert_eq!(record["event_id"], "7036");
    }

    #[test]
    fn test_parse_generic() {
        let (format, record) = parse_line("2024-10-10T13:55:36Z INFO started worker pool");
        assert_eq!(format, "generic");
        assert_eq!(record["level"], "INFO");
        assert_eq!(record["message"], "started worker pool");
    }

    #[test]
    fn test_unknown_lines_are_kept() {
        let (format, record) = parse_line("just some text");
        assert_eq!(format, "unknown");
        assert_eq!(record["message"], "just some text");
    }

    #[test]
    fn test_extract_numbers_lines_and_skips_blanks() {
        let mut file = NamedTempFile::with_suffix(".log").unwrap();
        write!(
            file,
            "2024-10-10 13:55:36 INFO one\n\n2024-10-10 13:55:37 ERROR two\nfree text\n"
        )
        .unwrap();

        let outcome = LogExtractor::new()
            .extract(
                file.path(),
                &ExtractOptions {
                    chunk_size: 1000,
                    max_rows_per_table: 10,
                },
            )
            .unwrap();

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[1]["line_number"], 3);
        assert_eq!(outcome.records[2]["detected_format"], "unknown");
        assert_eq!(outcome.metadata["entry_count"], 3);
        assert_eq!(outcome.metadata["format_counts"]["unknown"], 1);
    }
}
