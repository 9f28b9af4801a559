//! Mutable runtime companion of a job: status, counters and timestamps.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::spec::JobSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// `pending -> running -> {completed, failed, cancelled}`, plus
    /// `pending -> cancelled`. Terminal states never transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live counters of a run, shared between the aggregator and readers.
///
/// `total` is set once traversal completes, before any unit is dispatched,
/// so `processed + failed <= total` holds at every observed instant.
#[derive(Debug, Default)]
pub struct JobProgress {
    total: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
}

impl ProgressSnapshot {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total as f64) * 100.0
    }
}

impl JobProgress {
    pub fn from_counts(total: u64, processed: u64, failed: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            processed: AtomicU64::new(processed),
            failed: AtomicU64::new(failed),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        // Read the outcome counters before total so a concurrent reader never
        // sees them exceed a freshly stored total.
        let processed = self.processed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        ProgressSnapshot {
            total,
            processed,
            failed,
        }
    }
}

/// Point-in-time copy of a job handed to readers. Never a live reference.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    #[serde(flatten)]
    pub spec: JobSpec,
    pub status: JobStatus,
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub progress_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_summary: Option<serde_json::Value>,
}

impl JobRecord {
    pub fn new_pending(id: String, spec: JobSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            spec,
            status: JobStatus::Pending,
            total_files: 0,
            processed_files: 0,
            failed_files: 0,
            progress_percentage: 0.0,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            output_path: None,
            results_summary: None,
        }
    }

    pub fn apply_progress(&mut self, progress: ProgressSnapshot) {
        self.total_files = progress.total;
        self.processed_files = progress.processed;
        self.failed_files = progress.failed;
        self.progress_percentage = progress.percentage();
    }

    /// Seconds since the run started; 0 when it never started.
    pub fn runtime_seconds(&self, now: DateTime<Utc>) -> f64 {
        let Some(started) = self.started_at else {
            return 0.0;
        };
        let end = self.completed_at.unwrap_or(now);
        (end - started).num_milliseconds().max(0) as f64 / 1000.0
    }
}
