//! Builders and scripted collaborators for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use async_trait::async_trait;

use snapex::classifier::FileType;
use snapex::extractor::{ExtractOptions, ExtractionOutcome};
use snapex::pipeline::ExtractorFactory;
use snapex::{
    ContentExtractor, ExtractionError, ExtractionLevel, ExtractorKind, ExtractorRegistry,
    FileTypeFilter, JobConfig, JobSpec, MountError, MountProvider, MountSession,
    MultiLevelExtractor,
};

use super::harness::BACKUP_ID;

// ─── Job specs ──────────────────────────────────────────────────────────────

/// Builder for job specs against the harness backup.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: JobSpec::new(name, BACKUP_ID),
        }
    }

    pub fn backup(mut self, backup_id: &str) -> Self {
        self.spec.backup_id = backup_id.to_string();
        self
    }

    pub fn level(mut self, level: ExtractionLevel) -> Self {
        self.spec.config.extraction_level = level;
        self
    }

    pub fn filter(mut self, filter: FileTypeFilter) -> Self {
        self.spec.config.file_type_filter = filter;
        self
    }

    pub fn custom_types(mut self, extensions: &[&str]) -> Self {
        self.spec.config.file_type_filter = FileTypeFilter::Custom;
        self.spec.config.custom_file_types = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        self.spec.config.directory_path = path.to_string();
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.spec.config.max_file_size = bytes;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.spec.config.max_depth = depth;
        self
    }

    pub fn workers(mut self, workers: u32) -> Self {
        self.spec.config.max_workers = workers;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.spec.config.parallel_processing = false;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut JobConfig)) -> Self {
        f(&mut self.spec.config);
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

// ─── Mount providers ────────────────────────────────────────────────────────

/// Provider whose `mount` always fails and whose upstream list is scripted.
#[derive(Default)]
pub struct ScriptedMountProvider {
    upstream: Mutex<Vec<MountSession>>,
    pub mount_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub unmount_calls: Mutex<Vec<String>>,
}

impl ScriptedMountProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_upstream(&self, sessions: Vec<MountSession>) {
        *self.upstream.lock().unwrap() = sessions;
    }

    pub fn mount_calls(&self) -> usize {
        self.mount_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountProvider for ScriptedMountProvider {
    async fn mount(&self, _backup_id: &str) -> Result<MountSession, MountError> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        Err(MountError::ProviderUnavailable(
            "backup service unreachable".to_string(),
        ))
    }

    async fn list_active_sessions(&self) -> Result<Vec<MountSession>, MountError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.upstream.lock().unwrap().clone())
    }

    async fn unmount_flr(&self, session_id: &str) -> Result<(), MountError> {
        self.unmount_calls
            .lock()
            .unwrap()
            .push(format!("flr:{}", session_id));
        Ok(())
    }

    async fn unmount_data_integration(&self, mount_id: &str) -> Result<(), MountError> {
        self.unmount_calls
            .lock()
            .unwrap()
            .push(format!("data_integration:{}", mount_id));
        Ok(())
    }
}

// ─── Extractors ─────────────────────────────────────────────────────────────

/// Factory running `extractor` as the only content extractor of a job.
pub fn single_extractor_factory<E>(extractor: Arc<E>) -> ExtractorFactory
where
    E: ContentExtractor + 'static,
{
    Arc::new(move |config: &JobConfig| {
        let shared: Box<dyn ContentExtractor> = Box::new(Shared(Arc::clone(&extractor)));
        MultiLevelExtractor::new(
            config.extraction_level,
            ExtractorRegistry::from_extractors(vec![shared]),
            ExtractOptions::from_config(config),
            config.include_attributes,
        )
    })
}

struct Shared<E>(Arc<E>);

impl<E: ContentExtractor> ContentExtractor for Shared<E> {
    fn kind(&self) -> ExtractorKind {
        self.0.kind()
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        self.0.can_handle(file_type)
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        self.0.extract(path, options)
    }
}

/// Document extractor that blocks every call until the gate opens.
#[derive(Default)]
pub struct GatedExtractor {
    open: Mutex<bool>,
    opened: Condvar,
    started: AtomicUsize,
}

impl GatedExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl ContentExtractor for GatedExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Document
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::Document
    }

    fn extract(
        &self,
        path: &Path,
        _options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        Ok(ExtractionOutcome {
            raw_content: Some(path.display().to_string()),
            ..Default::default()
        })
    }
}
