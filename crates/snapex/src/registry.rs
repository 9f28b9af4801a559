//! Process-wide job registry backed by SQLite.
//!
//! Every job lives in memory next to its live progress counters and cancel
//! flag; every state change is written through to `extraction_jobs` before it
//! becomes visible. Readers always receive a [`JobRecord`] copy with the
//! current counters applied, never a reference into the registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::execution_repo::{self, ExecutionRow, ExecutionTotals};
use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::Database;
use crate::error::{Result, SnapexError};
use crate::job::{JobProgress, JobRecord, JobSpec, JobStatus};

const RESTART_MESSAGE: &str = "interrupted by process restart";

struct JobEntry {
    record: JobRecord,
    progress: Arc<JobProgress>,
    cancel: Arc<AtomicBool>,
}

impl JobEntry {
    fn new(record: JobRecord) -> Self {
        let progress = JobProgress::from_counts(
            record.total_files,
            record.processed_files,
            record.failed_files,
        );
        Self {
            record,
            progress: Arc::new(progress),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn snapshot(&self) -> JobRecord {
        let mut record = self.record.clone();
        if record.status == JobStatus::Running {
            record.apply_progress(self.progress.snapshot());
        }
        record
    }
}

/// Listing filter; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub backup_id: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl JobQuery {
    fn to_filter(&self) -> JobFilter {
        JobFilter {
            status: self.status.map(|s| s.as_str().to_string()),
            backup_id: self.backup_id.clone(),
            created_by: self.created_by.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// What a pipeline run needs from the registry once it owns a job.
#[derive(Clone)]
pub struct RunHandle {
    pub job_id: String,
    pub spec: JobSpec,
    pub progress: Arc<JobProgress>,
    pub cancel: Arc<AtomicBool>,
}

impl RunHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Terminal result handed back by the pipeline.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
    pub results_summary: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveJob {
    pub id: String,
    pub name: String,
    pub progress_percentage: f64,
    pub runtime_seconds: f64,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub total_jobs: u64,
    pub jobs_by_status: BTreeMap<String, u64>,
    pub active_jobs: usize,
    pub executions: ExecutionTotals,
}

pub struct JobRegistry {
    db: Database,
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    /// Loads every persisted job. Jobs left `running` by a previous process
    /// cannot be resumed and are marked failed.
    pub fn open(db: Database) -> Result<Self> {
        let (rows, _) = job_repo::query(&db, &JobFilter::default())?;
        let now = Utc::now();
        let mut jobs = HashMap::with_capacity(rows.len());
        let mut interrupted = 0;

        for row in rows {
            let mut record = row.into_record()?;
            if record.status == JobStatus::Running {
                record.status = JobStatus::Failed;
                record.error_message = Some(RESTART_MESSAGE.to_string());
                record.completed_at = Some(now);
                record.updated_at = now;
                job_repo::update(&db, &JobRow::from_record(&record)?)?;
                interrupted += 1;
            }
            jobs.insert(record.id.clone(), JobEntry::new(record));
        }

        if interrupted > 0 {
            log::warn!(
                "Marked {} jobs interrupted by the previous shutdown as failed",
                interrupted
            );
        }
        log::info!("Job registry loaded {} jobs", jobs.len());

        Ok(Self {
            db,
            jobs: RwLock::new(jobs),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Validates and stores a new job in `pending`.
    pub fn create(&self, spec: JobSpec) -> Result<JobRecord> {
        spec.validate()?;

        let record = JobRecord::new_pending(Uuid::new_v4().to_string(), spec, Utc::now());
        job_repo::insert(&self.db, &JobRow::from_record(&record)?)?;
        log::info!("Created job '{}' ({})", record.spec.name, record.id);

        self.write()
            .insert(record.id.clone(), JobEntry::new(record.clone()));
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<JobRecord> {
        self.read()
            .get(id)
            .map(JobEntry::snapshot)
            .ok_or_else(|| SnapexError::job_not_found(id))
    }

    /// Newest first, with the total number of matches before paging.
    pub fn list(&self, query: &JobQuery) -> Result<(Vec<JobRecord>, u64)> {
        let (rows, total) = job_repo::query(&self.db, &query.to_filter())?;
        let jobs = self.read();
        let records = rows
            .into_iter()
            .map(|row| match jobs.get(&row.id) {
                Some(entry) => Ok(entry.snapshot()),
                None => row.into_record().map_err(SnapexError::from),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((records, total))
    }

    /// Replaces the spec of a job that has not started.
    pub fn update(&self, id: &str, spec: JobSpec) -> Result<JobRecord> {
        spec.validate()?;

        let mut jobs = self.write();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| SnapexError::job_not_found(id))?;
        ensure_status(&entry.record, JobStatus::Pending, "update")?;

        let mut record = entry.record.clone();
        record.spec = spec;
        record.updated_at = Utc::now();
        job_repo::update(&self.db, &JobRow::from_record(&record)?)?;

        entry.record = record;
        Ok(entry.snapshot())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut jobs = self.write();
        let entry = jobs.get(id).ok_or_else(|| SnapexError::job_not_found(id))?;
        if entry.record.status == JobStatus::Running {
            return Err(invalid_state(&entry.record, "delete"));
        }

        job_repo::delete(&self.db, id)?;
        jobs.remove(id);
        log::info!("Deleted job {}", id);
        Ok(())
    }

    /// A pending job is cancelled on the spot; a running job has its cancel
    /// flag raised and reaches `cancelled` once its pipeline drains.
    pub fn request_cancel(&self, id: &str) -> Result<JobRecord> {
        let mut jobs = self.write();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| SnapexError::job_not_found(id))?;

        match entry.record.status {
            JobStatus::Pending => {
                let now = Utc::now();
                let mut record = entry.record.clone();
                record.status = JobStatus::Cancelled;
                record.completed_at = Some(now);
                record.updated_at = now;
                job_repo::update(&self.db, &JobRow::from_record(&record)?)?;
                entry.record = record;
                log::info!("Cancelled pending job {}", id);
            }
            JobStatus::Running => {
                entry.cancel.store(true, Ordering::SeqCst);
                log::info!("Cancellation requested for running job {}", id);
            }
            _ => return Err(invalid_state(&entry.record, "cancel")),
        }
        Ok(entry.snapshot())
    }

    /// Moves a pending job to `running` and hands its counters to the caller.
    pub fn begin_run(&self, id: &str) -> Result<RunHandle> {
        let mut jobs = self.write();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| SnapexError::job_not_found(id))?;
        ensure_status(&entry.record, JobStatus::Pending, "execute")?;

        let now = Utc::now();
        let mut record = entry.record.clone();
        record.status = JobStatus::Running;
        record.started_at = Some(now);
        record.updated_at = now;
        record.apply_progress(Default::default());
        job_repo::update(&self.db, &JobRow::from_record(&record)?)?;

        entry.record = record;
        entry.progress = Arc::new(JobProgress::default());
        entry.cancel = Arc::new(AtomicBool::new(false));

        Ok(RunHandle {
            job_id: id.to_string(),
            spec: entry.record.spec.clone(),
            progress: Arc::clone(&entry.progress),
            cancel: Arc::clone(&entry.cancel),
        })
    }

    /// Writes the live counters of a running job.
    pub fn flush_progress(&self, id: &str) -> Result<()> {
        let jobs = self.read();
        let entry = jobs.get(id).ok_or_else(|| SnapexError::job_not_found(id))?;
        flush_entry(&self.db, id, entry)
    }

    /// Stamps the terminal state of a run.
    ///
    /// The in-memory record always leaves `running`: when the terminal row
    /// cannot be written the job is held as `failed` with the write error as
    /// its message, and the error is returned.
    pub fn finish_run(&self, id: &str, outcome: RunOutcome) -> Result<JobRecord> {
        let mut jobs = self.write();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| SnapexError::job_not_found(id))?;
        if !entry.record.status.can_transition_to(outcome.status) {
            return Err(invalid_state(&entry.record, "finish"));
        }

        let now = Utc::now();
        let mut record = entry.record.clone();
        record.apply_progress(entry.progress.snapshot());
        record.status = outcome.status;
        record.error_message = outcome.error_message;
        record.output_path = outcome.output_path;
        record.results_summary = outcome.results_summary;
        record.completed_at = Some(now);
        record.updated_at = now;

        let written =
            JobRow::from_record(&record).and_then(|row| job_repo::update(&self.db, &row));
        if let Err(e) = written {
            log::error!("Failed to persist final status of job {}: {}", id, e);
            record.status = JobStatus::Failed;
            record.error_message = Some(format!("failed to persist final status: {}", e));
            entry.record = record;
            return Err(e.into());
        }

        log::info!(
            "Job {} finished as {} ({} processed, {} failed of {})",
            id,
            record.status,
            record.processed_files,
            record.failed_files,
            record.total_files
        );
        entry.record = record;
        Ok(entry.snapshot())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.read()
            .get(id)
            .is_some_and(|entry| entry.record.status == JobStatus::Running)
    }

    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        let now = Utc::now();
        let mut active: Vec<ActiveJob> = self
            .read()
            .values()
            .filter(|entry| entry.record.status == JobStatus::Running)
            .map(|entry| {
                let record = entry.snapshot();
                ActiveJob {
                    runtime_seconds: record.runtime_seconds(now),
                    id: record.id,
                    name: record.spec.name,
                    progress_percentage: record.progress_percentage,
                    started_at: record.started_at,
                }
            })
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    pub fn stats(&self) -> Result<JobStats> {
        let mut jobs_by_status = BTreeMap::new();
        let mut total_jobs = 0;
        for status in JobStatus::ALL {
            let count = job_repo::count_by_status(&self.db, status.as_str())?;
            total_jobs += count;
            jobs_by_status.insert(status.as_str().to_string(), count);
        }

        Ok(JobStats {
            total_jobs,
            jobs_by_status,
            active_jobs: self.active_jobs().len(),
            executions: execution_repo::totals(&self.db)?,
        })
    }

    pub fn executions(&self, job_id: &str) -> Result<Vec<ExecutionRow>> {
        self.get(job_id)?;
        Ok(execution_repo::list_for_job(&self.db, job_id)?)
    }

    pub fn execution(&self, job_id: &str, execution_id: &str) -> Result<ExecutionRow> {
        self.get(job_id)?;
        execution_repo::find(&self.db, job_id, execution_id)?.ok_or_else(|| {
            SnapexError::NotFound {
                kind: "Execution",
                id: execution_id.to_string(),
            }
        })
    }

    /// Flushes the counters of every running job. Called on shutdown.
    pub fn persist_all(&self) -> Result<usize> {
        let jobs = self.read();
        let mut flushed = 0;
        for (id, entry) in jobs.iter() {
            if entry.record.status == JobStatus::Running {
                flush_entry(&self.db, id, entry)?;
                flushed += 1;
            }
        }
        if flushed > 0 {
            log::info!("Persisted progress of {} running jobs", flushed);
        }
        Ok(flushed)
    }
}

fn flush_entry(db: &Database, id: &str, entry: &JobEntry) -> Result<()> {
    let progress = entry.progress.snapshot();
    job_repo::update_progress(
        db,
        id,
        progress.total,
        progress.processed,
        progress.failed,
        progress.percentage(),
        &Utc::now().to_rfc3339(),
    )?;
    Ok(())
}

fn ensure_status(record: &JobRecord, expected: JobStatus, action: &'static str) -> Result<()> {
    if record.status != expected {
        return Err(invalid_state(record, action));
    }
    Ok(())
}

fn invalid_state(record: &JobRecord, action: &'static str) -> SnapexError {
    SnapexError::InvalidState {
        id: record.id.clone(),
        action,
        status: record.status.to_string(),
    }
}
