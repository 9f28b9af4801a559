//! Content extractors and the per-job extractor registry.

pub mod config_file;
pub mod document;
pub mod enterprise;
pub mod log_file;
pub mod multi_level;
pub mod presentation;
pub mod spreadsheet;
pub mod sql_dump;
pub mod sqlite;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunking::TextChunk;
use crate::classifier::FileType;
use crate::error::ExtractionError;
use crate::job::JobConfig;

pub use multi_level::{FileAttributes, FileExtraction, MultiLevelExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Document,
    Spreadsheet,
    Presentation,
    Log,
    Config,
    Sqlite,
    SqlDump,
    EnterpriseDb,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Document => "document",
            ExtractorKind::Spreadsheet => "spreadsheet",
            ExtractorKind::Presentation => "presentation",
            ExtractorKind::Log => "log",
            ExtractorKind::Config => "config",
            ExtractorKind::Sqlite => "sqlite",
            ExtractorKind::SqlDump => "sql_dump",
            ExtractorKind::EnterpriseDb => "enterprise_db",
        }
    }

    pub fn family(&self) -> ExtractorFamily {
        match self {
            ExtractorKind::Sqlite | ExtractorKind::SqlDump | ExtractorKind::EnterpriseDb => {
                ExtractorFamily::Database
            }
            _ => ExtractorFamily::Content,
        }
    }
}

/// Extraction levels select families, not individual extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorFamily {
    Content,
    Database,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub chunk_size: usize,
    pub max_rows_per_table: usize,
}

impl ExtractOptions {
    pub fn from_config(config: &JobConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_rows_per_table: config.max_db_rows_per_table as usize,
        }
    }
}

/// What an extractor produced for one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<TextChunk>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Set when a row cap cut the output short.
    pub truncated: bool,
}

impl ExtractionOutcome {
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub trait ContentExtractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;
    fn can_handle(&self, file_type: FileType) -> bool;
    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError>;
}

/// Ordered list of the extractors a job enabled. Enable flags decide
/// membership once, when the registry is built for the job.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    pub fn for_job(config: &JobConfig) -> Self {
        let mut extractors: Vec<Box<dyn ContentExtractor>> = Vec::new();

        if config.enable_document_parsing {
            extractors.push(Box::new(document::DocumentExtractor::new()));
        }
        if config.enable_spreadsheet_parsing {
            extractors.push(Box::new(spreadsheet::SpreadsheetExtractor::new()));
        }
        if config.enable_presentation_parsing {
            extractors.push(Box::new(presentation::PresentationExtractor::new()));
        }
        if config.enable_log_parsing {
            extractors.push(Box::new(log_file::LogExtractor::new()));
        }
        if config.enable_config_parsing {
            extractors.push(Box::new(config_file::ConfigExtractor::new()));
        }
        if config.enable_sqlite_extraction {
            extractors.push(Box::new(sqlite::SqliteExtractor::new()));
        }
        if config.enable_sql_dump_parsing {
            extractors.push(Box::new(sql_dump::SqlDumpExtractor::new()));
        }
        if config.enable_enterprise_db_extraction {
            extractors.push(Box::new(enterprise::EnterpriseDbExtractor::new()));
        }

        Self { extractors }
    }

    /// A registry over caller-supplied extractors, in priority order.
    pub fn from_extractors(extractors: Vec<Box<dyn ContentExtractor>>) -> Self {
        Self { extractors }
    }

    /// First enabled extractor of `family` that handles `file_type`.
    pub fn select(
        &self,
        file_type: FileType,
        family: ExtractorFamily,
    ) -> Option<&dyn ContentExtractor> {
        self.extractors
            .iter()
            .map(|e| e.as_ref())
            .find(|e| e.kind().family() == family && e.can_handle(file_type))
    }

    pub fn kinds(&self) -> Vec<ExtractorKind> {
        self.extractors.iter().map(|e| e.kind()).collect()
    }
}

/// Reads a file as text, replacing invalid UTF-8 sequences.
pub(crate) fn read_text_lossy(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractionError::read(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_respects_enable_flags() {
        let mut config = JobConfig::default();
        config.enable_log_parsing = false;
        config.enable_enterprise_db_extraction = true;

        let registry = ExtractorRegistry::for_job(&config);
        let kinds = registry.kinds();
        assert!(!kinds.contains(&ExtractorKind::Log));
        assert!(kinds.contains(&ExtractorKind::EnterpriseDb));
        assert!(registry
            .select(FileType::Log, ExtractorFamily::Content)
            .is_none());
    }

    #[test]
    fn test_select_by_family() {
        let registry = ExtractorRegistry::for_job(&JobConfig::default());

        let doc = registry.select(FileType::Document, ExtractorFamily::Content);
        assert_eq!(doc.map(|e| e.kind()), Some(ExtractorKind::Document));

        assert!(registry
            .select(FileType::Document, ExtractorFamily::Database)
            .is_none());
        let db = registry.select(FileType::SqliteDb, ExtractorFamily::Database);
        assert_eq!(db.map(|e| e.kind()), Some(ExtractorKind::Sqlite));
    }

    #[test]
    fn test_enterprise_disabled_by_default() {
        let registry = ExtractorRegistry::for_job(&JobConfig::default());
        assert!(registry
            .select(FileType::SqlserverDb, ExtractorFamily::Database)
            .is_none());
    }

    #[test]
    fn test_read_text_lossy_replaces_invalid_utf8() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"ok \xff\xfe end").unwrap();
        let text = read_text_lossy(file.path()).unwrap();
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" end"));
    }
}
