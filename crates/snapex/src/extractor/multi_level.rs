use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::FileType;
use crate::error::ExtractionError;
use crate::extractor::{
    ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorFamily, ExtractorKind,
    ExtractorRegistry,
};
use crate::job::{ExtractionLevel, JobConfig};
use crate::worker::FileDescriptor;

/// Read-only flag and filesystem timestamps, collected when a job asks for
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    pub readonly: bool,
    pub created: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
}

impl FileAttributes {
    pub fn read(path: &std::path::Path) -> Result<Self, ExtractionError> {
        let metadata = std::fs::metadata(path).map_err(|e| ExtractionError::read(path, e))?;
        Ok(Self {
            readonly: metadata.permissions().readonly(),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            accessed: metadata.accessed().ok().map(DateTime::<Utc>::from),
        })
    }
}

/// Everything learned about one file.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub relative_path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub file_type: FileType,
    pub extension: String,
    /// Extractor that actually ran, if any.
    pub extractor: Option<ExtractorKind>,
    pub attributes: Option<FileAttributes>,
    pub outcome: Option<ExtractionOutcome>,
}

impl FileExtraction {
    fn metadata_only(descriptor: &FileDescriptor) -> Self {
        Self {
            relative_path: descriptor.relative_path.clone(),
            size: descriptor.size,
            modified: descriptor.modified,
            file_type: descriptor.classification.file_type,
            extension: descriptor.classification.extension.clone(),
            extractor: None,
            attributes: None,
            outcome: None,
        }
    }
}

/// Runs the extractors an extraction level allows for one file.
///
/// `metadata_only` never opens file content. The other levels pick the
/// first enabled extractor of the allowed family for the file type; a file
/// with no matching extractor is still recorded with its metadata.
pub struct MultiLevelExtractor {
    level: ExtractionLevel,
    registry: ExtractorRegistry,
    options: ExtractOptions,
    include_attributes: bool,
}

impl MultiLevelExtractor {
    pub fn new(
        level: ExtractionLevel,
        registry: ExtractorRegistry,
        options: ExtractOptions,
        include_attributes: bool,
    ) -> Self {
        Self {
            level,
            registry,
            options,
            include_attributes,
        }
    }

    pub fn for_job(config: &JobConfig) -> Self {
        Self::new(
            config.extraction_level,
            ExtractorRegistry::for_job(config),
            ExtractOptions::from_config(config),
            config.include_attributes,
        )
    }

    fn family_allowed(&self, family: ExtractorFamily) -> bool {
        match family {
            ExtractorFamily::Content => self.level.runs_content(),
            ExtractorFamily::Database => self.level.runs_database(),
        }
    }

    fn select(&self, file_type: FileType) -> Option<&dyn ContentExtractor> {
        let family = if file_type.is_database() {
            ExtractorFamily::Database
        } else {
            ExtractorFamily::Content
        };
        if !self.family_allowed(family) {
            return None;
        }
        self.registry.select(file_type, family)
    }

    /// The extractor `process` hands this file to at the current level.
    pub fn selected(&self, descriptor: &FileDescriptor) -> Option<ExtractorKind> {
        self.select(descriptor.classification.file_type)
            .map(|extractor| extractor.kind())
    }

    pub fn process(&self, descriptor: &FileDescriptor) -> Result<FileExtraction, ExtractionError> {
        let mut extraction = FileExtraction::metadata_only(descriptor);
        if self.include_attributes {
            extraction.attributes = Some(FileAttributes::read(&descriptor.path)?);
        }

        let Some(extractor) = self.select(descriptor.classification.file_type) else {
            return Ok(extraction);
        };

        let _span = tracing::debug_span!(
            "extract",
            path = %descriptor.relative_path,
            extractor = extractor.kind().as_str()
        )
        .entered();

        let outcome = extractor.extract(&descriptor.path, &self.options)?;
        if outcome.truncated {
            tracing::debug!("Row cap reached in {}", descriptor.relative_path);
        }
        extraction.extractor = Some(extractor.kind());
        extraction.outcome = Some(outcome);
        Ok(extraction)
    }
}
