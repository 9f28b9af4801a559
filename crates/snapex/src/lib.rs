//! Extraction job engine for mounted backup snapshots.
//!
//! Jobs walk a mounted snapshot to a bounded depth, run the extractors their
//! extraction level allows on a bounded worker pool, and write a per-file
//! ledger while the registry tracks status and live counters.

pub mod chunking;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod job;
pub mod mount;
pub mod pipeline;
pub mod registry;
pub mod templates;
pub mod worker;

pub use classifier::{classify, eligible, FileType};
pub use config::{load_config, EngineConfig};
pub use db::Database;
pub use error::{
    ConfigError, ExtractionError, MountError, Result, SnapexError, ValidationError, WorkerError,
};
pub use extractor::{ContentExtractor, ExtractorKind, ExtractorRegistry, MultiLevelExtractor};
pub use job::{
    ExtractionLevel, FileTypeFilter, JobConfig, JobRecord, JobSpec, JobStatus, OutputFormat,
};
pub use mount::{
    DirectoryMountProvider, MountKind, MountProvider, MountReconciler, MountSession, MountState,
    ReconcileReport, ReconcileScheduler,
};
pub use pipeline::{JobRunner, PipelineError, RunnerSettings};
pub use registry::{JobQuery, JobRegistry};
pub use templates::{Template, TemplateDraft, TemplateStore};
