//! Drives one job from `running` to its terminal state.
//!
//! The async half resolves the mount point and records the execution; the
//! blocking half scans the tree on the calling thread, feeds the worker pool
//! and lets a single aggregator thread own the counters, summary and sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use crossbeam_channel::Receiver;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::error::PipelineError;
use super::sink::OutputSink;
use super::summary::{RunSummary, DEFAULT_MAX_ERROR_DETAILS};
use crate::db::execution_repo::{self, ExecutionRow};
use crate::error::{MountError, Result, WorkerError};
use crate::extractor::MultiLevelExtractor;
use crate::job::{JobConfig, JobRecord, JobStatus};
use crate::mount::{MountReconciler, MountSession};
use crate::registry::{JobRegistry, RunHandle, RunOutcome};
use crate::worker::{TreeScanner, UnitResult, WorkUnit, WorkerPool};

pub const DEFAULT_PROGRESS_FLUSH_EVERY: u64 = 25;

/// Builds the extractor a run hands to its workers.
pub type ExtractorFactory = Arc<dyn Fn(&JobConfig) -> MultiLevelExtractor + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub output_directory: PathBuf,
    pub max_error_details: usize,
    /// Persist counters after this many finished units.
    pub progress_flush_every: u64,
}

impl RunnerSettings {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            max_error_details: DEFAULT_MAX_ERROR_DETAILS,
            progress_flush_every: DEFAULT_PROGRESS_FLUSH_EVERY,
        }
    }
}

/// What a finished tree run leaves behind.
struct RunArtifacts {
    summary: RunSummary,
    output_path: PathBuf,
}

pub struct JobRunner {
    registry: Arc<JobRegistry>,
    reconciler: Arc<MountReconciler>,
    settings: RunnerSettings,
    extractor_factory: ExtractorFactory,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        reconciler: Arc<MountReconciler>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            registry,
            reconciler,
            settings,
            extractor_factory: Arc::new(|config: &JobConfig| MultiLevelExtractor::for_job(config)),
        }
    }

    pub fn with_extractor_factory(mut self, factory: ExtractorFactory) -> Self {
        self.extractor_factory = factory;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Moves the job to `running` and continues in the background. Only the
    /// state check surfaces here; mount and file errors land on the record.
    pub fn start(self: &Arc<Self>, job_id: &str) -> Result<JobRecord> {
        let handle = self.registry.begin_run(job_id)?;
        let snapshot = self.registry.get(job_id)?;

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let job_id = handle.job_id.clone();
            if let Err(e) = runner.run(handle).await {
                log::error!("Job {} could not record its final state: {}", job_id, e);
            }
        });
        Ok(snapshot)
    }

    /// Runs the job to completion on the current task.
    pub async fn execute(&self, job_id: &str) -> Result<JobRecord> {
        let handle = self.registry.begin_run(job_id)?;
        self.run(handle).await
    }

    async fn run(&self, handle: RunHandle) -> Result<JobRecord> {
        let span = info_span!("job_run", job_id = %handle.job_id, backup_id = %handle.spec.backup_id);
        async move {
            let mut execution = ExecutionRow::started(
                Uuid::new_v4().to_string(),
                handle.job_id.clone(),
                Utc::now().to_rfc3339(),
            );
            let result = self.drive(&handle, &mut execution).await;
            self.conclude(&handle, execution, result)
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        handle: &RunHandle,
        execution: &mut ExecutionRow,
    ) -> std::result::Result<RunArtifacts, PipelineError> {
        execution_repo::insert(self.registry.database(), execution)?;

        let session = self.resolve_mount(&handle.spec.backup_id).await?;
        execution.session_id = Some(session.session_id.clone());
        execution.mount_kind = Some(session.kind.as_str().to_string());
        execution.mount_point = Some(session.mount_point.display().to_string());

        if handle.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let root = traversal_root(&session.mount_point, &handle.spec.config.directory_path);
        log::info!(
            "Job {} traversing {} (session {})",
            handle.job_id,
            root.display(),
            session.session_id
        );

        let tree_run = TreeRun {
            root,
            handle: handle.clone(),
            registry: Arc::clone(&self.registry),
            settings: self.settings.clone(),
            extractor: Arc::new((self.extractor_factory)(&handle.spec.config)),
        };
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            tree_run.run()
        })
        .await
        .map_err(|e| PipelineError::Aborted(format!("pipeline task failed: {}", e)))?
    }

    /// Mount errors get one reconciliation pass before they fail the run.
    async fn resolve_mount(
        &self,
        backup_id: &str,
    ) -> std::result::Result<Arc<MountSession>, MountError> {
        match self.reconciler.resolve_mount_point(backup_id).await {
            Ok(session) => Ok(session),
            Err(first) => {
                log::warn!(
                    "Mount resolution for backup '{}' failed ({}), reconciling before retry",
                    backup_id,
                    first
                );
                if let Err(e) = self.reconciler.reconcile().await {
                    log::warn!("Reconciliation before retry failed: {}", e);
                }
                self.reconciler.resolve_mount_point(backup_id).await
            }
        }
    }

    fn conclude(
        &self,
        handle: &RunHandle,
        mut execution: ExecutionRow,
        result: std::result::Result<RunArtifacts, PipelineError>,
    ) -> Result<JobRecord> {
        let outcome = match result {
            Ok(artifacts) => RunOutcome {
                status: if handle.is_cancelled() {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Completed
                },
                error_message: None,
                output_path: Some(artifacts.output_path.display().to_string()),
                results_summary: Some(artifacts.summary.to_value()),
            },
            Err(PipelineError::Cancelled) => RunOutcome {
                status: JobStatus::Cancelled,
                error_message: None,
                output_path: None,
                results_summary: None,
            },
            Err(e) => {
                log::error!("Job {} failed: {}", handle.job_id, e);
                RunOutcome {
                    status: JobStatus::Failed,
                    error_message: Some(e.to_string()),
                    output_path: None,
                    results_summary: None,
                }
            }
        };

        let progress = handle.progress.snapshot();
        let summary = outcome.results_summary.as_ref();
        execution.status = outcome.status.as_str().to_string();
        execution.files_processed = progress.processed as i64;
        execution.errors_count = progress.failed as i64;
        execution.chunks_created = summary_count(summary, "chunks_created");
        execution.databases_extracted = summary_count(summary, "databases_extracted");
        execution.output_path = outcome.output_path.clone();
        execution.error_log = outcome.error_message.clone();
        execution.completed_at = Some(Utc::now().to_rfc3339());
        if let Err(e) = execution_repo::update(self.registry.database(), &execution) {
            log::error!(
                "Failed to record execution {} of job {}: {}",
                execution.id,
                handle.job_id,
                e
            );
        }

        self.registry.finish_run(&handle.job_id, outcome)
    }
}

fn summary_count(summary: Option<&serde_json::Value>, key: &str) -> i64 {
    summary
        .and_then(|s| s.get(key))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

/// `directory_path` is relative to the mount point even when written with a
/// leading separator.
fn traversal_root(mount_point: &Path, directory_path: &str) -> PathBuf {
    let relative = directory_path.trim_start_matches(['/', '\\']);
    if relative.is_empty() {
        mount_point.to_path_buf()
    } else {
        mount_point.join(relative)
    }
}

/// The blocking half of a run.
struct TreeRun {
    root: PathBuf,
    handle: RunHandle,
    registry: Arc<JobRegistry>,
    settings: RunnerSettings,
    extractor: Arc<MultiLevelExtractor>,
}

impl TreeRun {
    fn run(self) -> std::result::Result<RunArtifacts, PipelineError> {
        let config = &self.handle.spec.config;
        let job_id = self.handle.job_id.as_str();

        let report = {
            let _step = info_span!("scan", root = %self.root.display()).entered();
            TreeScanner::new(&self.root, config).scan()?
        };
        self.handle.progress.set_total(report.files.len() as u64);
        if let Err(e) = self.registry.flush_progress(job_id) {
            log::warn!("Failed to persist discovery count for job {}: {}", job_id, e);
        }
        log::info!(
            "Job {} discovered {} files ({} over size limit, {} filtered)",
            job_id,
            report.files.len(),
            report.oversize_skipped,
            report.ineligible
        );

        let mut summary = RunSummary::new(self.settings.max_error_details);
        summary.record_scan(&report);
        let sink = OutputSink::create(&self.settings.output_directory, job_id, config)?;

        let _step = info_span!("extract", workers = config.effective_workers()).entered();
        let pool = WorkerPool::new(
            Arc::clone(&self.extractor),
            config.effective_workers(),
            Arc::clone(&self.handle.cancel),
        )?;

        let aggregator = Aggregator {
            sink,
            summary,
            handle: self.handle.clone(),
            registry: Arc::clone(&self.registry),
            flush_every: self.settings.progress_flush_every.max(1),
            since_flush: 0,
            first_error: None,
        };
        let results = pool.results();
        let span = tracing::Span::current();
        let aggregator = thread::Builder::new()
            .name("snapex-aggregator".to_string())
            .spawn(move || {
                let _entered = span.enter();
                aggregator.drain(results)
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        let total = report.files.len();
        let mut dispatched = 0;
        let mut submit_error = None;
        for descriptor in report.files {
            if self.handle.is_cancelled() {
                log::info!(
                    "Job {} cancelled after {} of {} units dispatched",
                    job_id,
                    dispatched,
                    total
                );
                break;
            }
            if let Err(e) = pool.submit(WorkUnit::new(descriptor)) {
                submit_error = Some(e);
                break;
            }
            dispatched += 1;
        }
        pool.wait();

        let aggregator = aggregator
            .join()
            .map_err(|_| PipelineError::Aborted("result aggregator panicked".to_string()))?;
        if let Err(e) = self.registry.flush_progress(job_id) {
            log::warn!("Failed to persist final counters for job {}: {}", job_id, e);
        }

        if let Some(e) = submit_error {
            return Err(e.into());
        }
        if let Some(e) = aggregator.first_error {
            return Err(e);
        }
        let output_path = aggregator.sink.finish()?;
        Ok(RunArtifacts {
            summary: aggregator.summary,
            output_path,
        })
    }
}

/// Single writer for a run's counters, summary and output.
struct Aggregator {
    sink: OutputSink,
    summary: RunSummary,
    handle: RunHandle,
    registry: Arc<JobRegistry>,
    flush_every: u64,
    since_flush: u64,
    /// First sink failure. Results keep draining so workers never block.
    first_error: Option<PipelineError>,
}

impl Aggregator {
    fn drain(mut self, results: Receiver<UnitResult>) -> Self {
        for result in results.iter() {
            self.record(result);
        }
        self
    }

    fn record(&mut self, result: UnitResult) {
        let progress = &self.handle.progress;
        let written = match result {
            UnitResult::Completed(extraction) => {
                progress.record_processed();
                self.summary.record_completed(&extraction);
                self.sink.write_extraction(&extraction)
            }
            UnitResult::Failed {
                descriptor,
                extractor,
                error,
            } => {
                progress.record_failed();
                log::warn!("Extraction failed for {}: {}", descriptor.relative_path, error);
                self.summary.record_failed(&descriptor.relative_path, &error);
                self.sink.write_failure(&descriptor, extractor, &error)
            }
            UnitResult::Skipped(_) => {
                self.summary.record_skipped();
                return;
            }
        };

        if let Err(e) = written {
            if self.first_error.is_none() {
                log::error!("Output write failed for job {}: {}", self.handle.job_id, e);
                self.first_error = Some(e);
            }
        }

        self.since_flush += 1;
        if self.since_flush >= self.flush_every {
            self.since_flush = 0;
            if let Err(e) = self.registry.flush_progress(&self.handle.job_id) {
                log::warn!("Failed to persist progress of job {}: {}", self.handle.job_id, e);
            }
        }
    }
}
