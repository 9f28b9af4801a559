//! Maps file names to semantic file types and evaluates file-type filters.
//!
//! Classification is a pure function of the extension. The only content
//! access is [`refine_with_signature`], which sniffs the SQLite header to
//! decide whether an ambiguous `.db` file really is a SQLite database.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extractor::ExtractorKind;
use crate::job::FileTypeFilter;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Document,
    Spreadsheet,
    Presentation,
    Log,
    Config,
    SqliteDb,
    SqlDump,
    SqlserverDb,
    OracleDb,
    Image,
    Audio,
    Video,
    Executable,
    Archive,
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Document => "document",
            FileType::Spreadsheet => "spreadsheet",
            FileType::Presentation => "presentation",
            FileType::Log => "log",
            FileType::Config => "config",
            FileType::SqliteDb => "sqlite_db",
            FileType::SqlDump => "sql_dump",
            FileType::SqlserverDb => "sqlserver_db",
            FileType::OracleDb => "oracle_db",
            FileType::Image => "image",
            FileType::Audio => "audio",
            FileType::Video => "video",
            FileType::Executable => "executable",
            FileType::Archive => "archive",
            FileType::Other => "other",
        }
    }

    /// The extractor family that understands this type, if any.
    pub fn extractor_hint(&self) -> Option<ExtractorKind> {
        match self {
            FileType::Document => Some(ExtractorKind::Document),
            FileType::Spreadsheet => Some(ExtractorKind::Spreadsheet),
            FileType::Presentation => Some(ExtractorKind::Presentation),
            FileType::Log => Some(ExtractorKind::Log),
            FileType::Config => Some(ExtractorKind::Config),
            FileType::SqliteDb => Some(ExtractorKind::Sqlite),
            FileType::SqlDump => Some(ExtractorKind::SqlDump),
            FileType::SqlserverDb | FileType::OracleDb => Some(ExtractorKind::EnterpriseDb),
            _ => None,
        }
    }

    pub fn is_extractable(&self) -> bool {
        self.extractor_hint().is_some()
    }

    pub fn is_database(&self) -> bool {
        matches!(
            self,
            FileType::SqliteDb | FileType::SqlDump | FileType::SqlserverDb | FileType::OracleDb
        )
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extensions per category, as advertised to clients.
pub const SUPPORTED_FILE_TYPES: &[(&str, &[&str])] = &[
    ("documents", &["pdf", "doc", "docx", "txt", "rtf"]),
    ("spreadsheets", &["xls", "xlsx", "csv"]),
    ("presentations", &["ppt", "pptx"]),
    (
        "databases",
        &[
            "mdf", "ldf", "ndf", "dbf", "ora", "sqlite", "db", "sqlite3", "sql", "dump",
        ],
    ),
    ("logs", &["log"]),
    (
        "config",
        &["ini", "cfg", "conf", "config", "xml", "json", "yaml", "yml"],
    ),
    ("images", &["jpg", "jpeg", "png", "gif", "bmp", "tiff"]),
    ("audio", &["mp3", "wav", "flac", "aac"]),
    ("video", &["mp4", "avi", "mkv", "mov", "wmv"]),
    ("executables", &["exe", "dll", "sys"]),
    ("archives", &["zip", "rar", "7z", "tar", "gz"]),
];

/// Result of classifying one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub file_type: FileType,
    /// Lowercased extension without the leading dot; empty when absent.
    pub extension: String,
    pub extractor: Option<ExtractorKind>,
}

/// Classifies a path purely from its extension.
pub fn classify(path: &Path) -> Classification {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .unwrap_or_default();
    let file_type = classify_extension(&extension);
    Classification {
        file_type,
        extractor: file_type.extractor_hint(),
        extension,
    }
}

pub fn classify_extension(extension: &str) -> FileType {
    match normalize_extension(extension).as_str() {
        "pdf" | "doc" | "docx" | "txt" | "rtf" => FileType::Document,
        "xls" | "xlsx" | "csv" => FileType::Spreadsheet,
        "ppt" | "pptx" => FileType::Presentation,
        "mdf" | "ldf" | "ndf" => FileType::SqlserverDb,
        "dbf" | "ora" => FileType::OracleDb,
        "sqlite" | "db" | "sqlite3" => FileType::SqliteDb,
        "sql" | "dump" => FileType::SqlDump,
        "log" => FileType::Log,
        "ini" | "cfg" | "conf" | "config" | "xml" | "json" | "yaml" | "yml" => FileType::Config,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" => FileType::Image,
        "mp3" | "wav" | "flac" | "aac" => FileType::Audio,
        "mp4" | "avi" | "mkv" | "mov" | "wmv" => FileType::Video,
        "exe" | "dll" | "sys" => FileType::Executable,
        "zip" | "rar" | "7z" | "tar" | "gz" => FileType::Archive,
        _ => FileType::Other,
    }
}

/// Downgrades a generic `.db` file to `other` when it lacks the SQLite header.
/// Explicit `.sqlite`/`.sqlite3` files keep their type so a corrupt database
/// surfaces as an extraction failure instead of vanishing from the run.
pub fn refine_with_signature(path: &Path, classification: Classification) -> Classification {
    if classification.file_type != FileType::SqliteDb || classification.extension != "db" {
        return classification;
    }
    match has_sqlite_header(path) {
        Ok(true) => classification,
        Ok(false) | Err(_) => Classification {
            file_type: FileType::Other,
            extractor: None,
            extension: classification.extension,
        },
    }
}

pub fn has_sqlite_header(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 16];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Lowercases and strips any leading dots: `".LOG"` -> `"log"`.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Normalized set of extensions for the `custom` filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(&normalize_extension(extension))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pure set-membership test of a classified file against a filter.
///
/// `custom` matches on the extension alone, so a listed extension is accepted
/// even when its type is `other`.
pub fn eligible(
    classification: &Classification,
    filter: FileTypeFilter,
    custom: &ExtensionSet,
) -> bool {
    match filter {
        FileTypeFilter::AllFiles => true,
        FileTypeFilter::Custom => custom.contains(&classification.extension),
        FileTypeFilter::DocumentsOnly => matches!(
            classification.file_type,
            FileType::Document | FileType::Spreadsheet | FileType::Presentation
        ),
        FileTypeFilter::DatabasesOnly => classification.file_type.is_database(),
        FileTypeFilter::LogsOnly => classification.file_type == FileType::Log,
        FileTypeFilter::ConfigOnly => classification.file_type == FileType::Config,
    }
}
