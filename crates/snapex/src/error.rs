use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapexError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Job '{id}' cannot {action} while {status}")]
    InvalidState {
        id: String,
        action: &'static str,
        status: String,
    },

    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapexError {
    pub fn job_not_found(id: &str) -> Self {
        SnapexError::NotFound {
            kind: "Job",
            id: id.to_string(),
        }
    }

    pub fn template_not_found(id: &str) -> Self {
        SnapexError::NotFound {
            kind: "Template",
            id: id.to_string(),
        }
    }
}

/// Rejected job or template input. Raised synchronously; the job never
/// reaches `pending`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field '{field}' out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Malformed request body: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone)]
pub enum MountError {
    #[error("Mount provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("No mount source for backup '{0}'")]
    BackupNotFound(String),

    #[error("Mount session '{session_id}' for backup '{backup_id}' is not active yet")]
    NotReady {
        session_id: String,
        backup_id: String,
    },

    #[error("Mount point does not exist: {0}")]
    MissingMountPoint(PathBuf),

    #[error("Unknown mount session '{0}'")]
    UnknownSession(String),

    #[error("Unmount of session '{session_id}' failed: {reason}")]
    UnmountFailed { session_id: String, reason: String },
}

/// Per-file extraction failure. Counted against the file, never the job.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Corrupt {format} file: {reason}")]
    Corrupt { format: &'static str, reason: String },

    #[error("SQLite extraction failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Extractor panicked: {0}")]
    Panicked(String),
}

impl ExtractionError {
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        ExtractionError::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn corrupt(format: &'static str, reason: impl std::fmt::Display) -> Self {
        ExtractionError::Corrupt {
            format,
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Traversal root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, SnapexError>;
