//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` struct owns a temporary directory holding a mount root
//! for one backup and an output directory, plus an in-memory database with
//! a registry, template store, reconciler and runner wired together.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use snapex::pipeline::ExtractorFactory;
use snapex::{
    Database, DirectoryMountProvider, JobRecord, JobRegistry, JobRunner, JobSpec,
    MountProvider, MountReconciler, RunnerSettings, TemplateStore,
};

pub const BACKUP_ID: &str = "backup-1";

pub struct TestHarness {
    temp_dir: TempDir,
    /// Directory served as the mount point of `BACKUP_ID`.
    pub mount_dir: PathBuf,
    pub output_dir: PathBuf,
    pub db: Database,
    pub registry: Arc<JobRegistry>,
    pub templates: TemplateStore,
    pub reconciler: Arc<MountReconciler>,
    pub runner: Arc<JobRunner>,
}

impl TestHarness {
    /// Harness with a directory provider serving `mount_dir` as `BACKUP_ID`.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    pub fn with_provider(provider: Arc<dyn MountProvider>) -> Self {
        Self::build(Some(provider), None)
    }

    pub fn with_extractor_factory(factory: ExtractorFactory) -> Self {
        Self::build(None, Some(factory))
    }

    fn build(provider: Option<Arc<dyn MountProvider>>, factory: Option<ExtractorFactory>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mount_dir = temp_dir.path().join("mount");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&mount_dir).expect("Failed to create mount dir");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        let provider = provider.unwrap_or_else(|| {
            let mut directories = HashMap::new();
            directories.insert(BACKUP_ID.to_string(), mount_dir.clone());
            Arc::new(DirectoryMountProvider::new(directories))
        });

        let db = Database::open_in_memory().expect("Failed to open database");
        let registry = Arc::new(JobRegistry::open(db.clone()).expect("Failed to open registry"));
        let templates = TemplateStore::new(db.clone());
        let reconciler = Arc::new(MountReconciler::new(provider));

        let mut settings = RunnerSettings::new(&output_dir);
        settings.progress_flush_every = 1;
        let mut runner = JobRunner::new(Arc::clone(&registry), Arc::clone(&reconciler), settings);
        if let Some(factory) = factory {
            runner = runner.with_extractor_factory(factory);
        }

        Self {
            temp_dir,
            mount_dir,
            output_dir,
            db,
            registry,
            templates,
            reconciler,
            runner: Arc::new(runner),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file below the mount root, creating parent directories.
    pub fn write_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.mount_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write mount file");
        path
    }

    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        self.write_file(relative, content.as_bytes())
    }

    /// Writes a file of exactly `size` bytes.
    pub fn write_sized(&self, relative: &str, size: usize) -> PathBuf {
        self.write_file(relative, &vec![b'x'; size])
    }

    pub fn create_job(&self, spec: JobSpec) -> JobRecord {
        self.registry.create(spec).expect("Failed to create job")
    }

    /// Creates the job and runs it to a terminal state on the current task.
    pub async fn run(&self, spec: JobSpec) -> JobRecord {
        let job = self.create_job(spec);
        self.runner
            .execute(&job.id)
            .await
            .expect("Failed to record run outcome")
    }

    /// Polls the registry until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> JobRecord {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.registry.get(job_id).expect("job disappeared");
            if record.status.is_terminal() {
                return record;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} still {} after {:?}",
                job_id,
                record.status,
                timeout
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Parsed lines of a JSON run's output file.
    pub fn output_lines(&self, record: &JobRecord) -> Vec<Value> {
        let path = record.output_path.as_ref().expect("run has no output");
        std::fs::read_to_string(path)
            .expect("Failed to read output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("output line is not JSON"))
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
