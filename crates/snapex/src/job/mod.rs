pub mod record;
pub mod spec;

pub use record::{JobProgress, JobRecord, JobStatus, ProgressSnapshot};
pub use spec::{ExtractionLevel, FileTypeFilter, JobConfig, JobSpec, OutputFormat};
