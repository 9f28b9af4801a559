//! Job configuration: the immutable description of one extraction run.

use serde::{Deserialize, Serialize};

use crate::classifier::ExtensionSet;
use crate::error::ValidationError;

pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_MAX_WORKERS: u32 = 4;
pub const DEFAULT_MAX_DB_ROWS: u32 = 1000;

pub const MAX_DEPTH_LIMIT: u32 = 50;
pub const MAX_WORKERS_LIMIT: u32 = 16;
pub const MIN_CHUNK_SIZE: usize = 100;
pub const MAX_CHUNK_SIZE: usize = 100_000;

/// Which extractor families run for each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionLevel {
    #[default]
    MetadataOnly,
    ContentParsing,
    DatabaseExtraction,
    FullPipeline,
}

impl ExtractionLevel {
    pub const ALL: [ExtractionLevel; 4] = [
        ExtractionLevel::MetadataOnly,
        ExtractionLevel::ContentParsing,
        ExtractionLevel::DatabaseExtraction,
        ExtractionLevel::FullPipeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionLevel::MetadataOnly => "metadata_only",
            ExtractionLevel::ContentParsing => "content_parsing",
            ExtractionLevel::DatabaseExtraction => "database_extraction",
            ExtractionLevel::FullPipeline => "full_pipeline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == s)
    }

    pub fn runs_content(&self) -> bool {
        matches!(
            self,
            ExtractionLevel::ContentParsing | ExtractionLevel::FullPipeline
        )
    }

    pub fn runs_database(&self) -> bool {
        matches!(
            self,
            ExtractionLevel::DatabaseExtraction | ExtractionLevel::FullPipeline
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExtractionLevel::MetadataOnly => "Metadata Only",
            ExtractionLevel::ContentParsing => "Content Parsing",
            ExtractionLevel::DatabaseExtraction => "Database Extraction",
            ExtractionLevel::FullPipeline => "Full Pipeline",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExtractionLevel::MetadataOnly => {
                "Extract file system metadata only (paths, sizes, timestamps)"
            }
            ExtractionLevel::ContentParsing => {
                "Extract and parse file content for text analysis"
            }
            ExtractionLevel::DatabaseExtraction => "Extract structured data from database files",
            ExtractionLevel::FullPipeline => "Complete extraction pipeline with all levels",
        }
    }
}

/// Eligibility predicate over file types and extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTypeFilter {
    #[default]
    AllFiles,
    DocumentsOnly,
    DatabasesOnly,
    LogsOnly,
    ConfigOnly,
    Custom,
}

impl FileTypeFilter {
    pub const ALL: [FileTypeFilter; 6] = [
        FileTypeFilter::AllFiles,
        FileTypeFilter::DocumentsOnly,
        FileTypeFilter::DatabasesOnly,
        FileTypeFilter::LogsOnly,
        FileTypeFilter::ConfigOnly,
        FileTypeFilter::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileTypeFilter::AllFiles => "all_files",
            FileTypeFilter::DocumentsOnly => "documents_only",
            FileTypeFilter::DatabasesOnly => "databases_only",
            FileTypeFilter::LogsOnly => "logs_only",
            FileTypeFilter::ConfigOnly => "config_only",
            FileTypeFilter::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|filter| filter.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileTypeFilter::AllFiles => "All Files",
            FileTypeFilter::DocumentsOnly => "Documents Only",
            FileTypeFilter::DatabasesOnly => "Databases Only",
            FileTypeFilter::LogsOnly => "Logs Only",
            FileTypeFilter::ConfigOnly => "Config Only",
            FileTypeFilter::Custom => "Custom",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FileTypeFilter::AllFiles => "Process all file types",
            FileTypeFilter::DocumentsOnly => {
                "Process only document files (PDF, DOCX, TXT, spreadsheets, presentations)"
            }
            FileTypeFilter::DatabasesOnly => {
                "Process only database files (SQLite, SQL dumps, SQL Server, Oracle)"
            }
            FileTypeFilter::LogsOnly => "Process only log files",
            FileTypeFilter::ConfigOnly => "Process only configuration files",
            FileTypeFilter::Custom => "Process files matching custom file extensions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            "parquet" => Some(OutputFormat::Parquet),
            _ => None,
        }
    }
}

/// Every configurable knob of a job. Templates store exactly this; a job
/// adds its name, backup reference and description on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub extraction_level: ExtractionLevel,
    pub file_type_filter: FileTypeFilter,
    pub custom_file_types: Vec<String>,
    pub directory_path: String,
    pub max_depth: u32,
    pub max_file_size: u64,
    pub chunk_size: usize,
    pub include_attributes: bool,
    pub parallel_processing: bool,
    pub max_workers: u32,
    pub enable_document_parsing: bool,
    pub enable_spreadsheet_parsing: bool,
    pub enable_presentation_parsing: bool,
    pub enable_log_parsing: bool,
    pub enable_config_parsing: bool,
    pub enable_sqlite_extraction: bool,
    pub enable_sql_dump_parsing: bool,
    pub enable_enterprise_db_extraction: bool,
    pub max_db_rows_per_table: u32,
    pub output_format: OutputFormat,
    pub include_raw_content: bool,
    pub include_chunks: bool,
    pub include_embeddings: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            extraction_level: ExtractionLevel::MetadataOnly,
            file_type_filter: FileTypeFilter::AllFiles,
            custom_file_types: Vec::new(),
            directory_path: "/".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_attributes: false,
            parallel_processing: true,
            max_workers: DEFAULT_MAX_WORKERS,
            enable_document_parsing: true,
            enable_spreadsheet_parsing: true,
            enable_presentation_parsing: true,
            enable_log_parsing: true,
            enable_config_parsing: true,
            enable_sqlite_extraction: true,
            enable_sql_dump_parsing: true,
            enable_enterprise_db_extraction: false,
            max_db_rows_per_table: DEFAULT_MAX_DB_ROWS,
            output_format: OutputFormat::Json,
            include_raw_content: true,
            include_chunks: true,
            include_embeddings: false,
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("max_depth", self.max_depth as i64, 1, MAX_DEPTH_LIMIT as i64)?;
        check_range(
            "max_workers",
            self.max_workers as i64,
            1,
            MAX_WORKERS_LIMIT as i64,
        )?;
        check_range(
            "chunk_size",
            self.chunk_size as i64,
            MIN_CHUNK_SIZE as i64,
            MAX_CHUNK_SIZE as i64,
        )?;
        if self.max_file_size == 0 {
            return Err(ValidationError::Invalid {
                field: "max_file_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_db_rows_per_table == 0 {
            return Err(ValidationError::Invalid {
                field: "max_db_rows_per_table",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.file_type_filter == FileTypeFilter::Custom && self.custom_extensions().is_empty()
        {
            return Err(ValidationError::Invalid {
                field: "custom_file_types",
                reason: "custom filter requires at least one extension".to_string(),
            });
        }
        if self.output_format == OutputFormat::Parquet {
            return Err(ValidationError::Invalid {
                field: "output_format",
                reason: "parquet output is not supported by this build; use json or csv"
                    .to_string(),
            });
        }
        if self.directory_path.split(['/', '\\']).any(|part| part == "..") {
            return Err(ValidationError::Invalid {
                field: "directory_path",
                reason: "must not escape the mount point".to_string(),
            });
        }
        Ok(())
    }

    /// Worker pool size for a run: `max_workers` clamped to 1..=16, or 1 when
    /// parallel processing is off.
    pub fn effective_workers(&self) -> usize {
        if !self.parallel_processing {
            return 1;
        }
        self.max_workers.clamp(1, MAX_WORKERS_LIMIT) as usize
    }

    pub fn custom_extensions(&self) -> ExtensionSet {
        ExtensionSet::new(&self.custom_file_types)
    }
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// A job as submitted by a client or produced from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub backup_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub config: JobConfig,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, backup_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            backup_id: backup_id.into(),
            created_by: None,
            config: JobConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.backup_id.trim().is_empty() {
            return Err(ValidationError::MissingField("backup_id"));
        }
        self.config.validate()
    }
}
