use crate::error::ExtractionError;
use crate::extractor::{ExtractorKind, FileExtraction};
use crate::worker::FileDescriptor;

/// One file queued for extraction.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub descriptor: FileDescriptor,
}

impl WorkUnit {
    pub fn new(descriptor: FileDescriptor) -> Self {
        Self { descriptor }
    }
}

/// What a worker reports back for a unit.
#[derive(Debug)]
pub enum UnitResult {
    Completed(Box<FileExtraction>),
    Failed {
        descriptor: FileDescriptor,
        /// Extractor chosen for the file; `None` when its level and type
        /// select none.
        extractor: Option<ExtractorKind>,
        error: ExtractionError,
    },
    /// Dequeued after cancellation was requested; never started.
    Skipped(FileDescriptor),
}

impl UnitResult {
    pub fn relative_path(&self) -> &str {
        match self {
            UnitResult::Completed(extraction) => &extraction.relative_path,
            UnitResult::Failed { descriptor, .. } | UnitResult::Skipped(descriptor) => {
                &descriptor.relative_path
            }
        }
    }
}
