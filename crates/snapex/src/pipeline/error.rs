use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{MountError, WorkerError};

/// Failure of a run as a whole. Per-file extraction errors never become one.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Mount resolution failed: {0}")]
    Mount(#[from] MountError),

    #[error("{0}")]
    Worker(#[from] WorkerError),

    #[error("Failed to write output '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode output record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database write failed: {0}")]
    Database(#[from] DatabaseError),

    /// Cancellation observed before any work was dispatched. Ends the run
    /// as `cancelled`, never `failed`.
    #[error("Run cancelled")]
    Cancelled,

    #[error("Pipeline aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub(crate) fn output(path: &std::path::Path, source: std::io::Error) -> Self {
        PipelineError::Output {
            path: path.to_path_buf(),
            source,
        }
    }
}
