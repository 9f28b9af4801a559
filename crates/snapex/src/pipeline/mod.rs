//! Job execution: mount resolution, traversal, pooled extraction and output.

pub mod error;
pub mod runner;
pub mod sink;
pub mod summary;

pub use error::PipelineError;
pub use runner::{ExtractorFactory, JobRunner, RunnerSettings, DEFAULT_PROGRESS_FLUSH_EVERY};
pub use sink::OutputSink;
pub use summary::{ErrorDetail, RunSummary, DEFAULT_MAX_ERROR_DETAILS};
