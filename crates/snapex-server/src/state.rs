//! Shared handler state and the wiring that builds it from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use snapex::{
    Database, DirectoryMountProvider, EngineConfig, JobRegistry, JobRunner, MountProvider,
    MountReconciler, TemplateStore,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub templates: Arc<TemplateStore>,
    pub reconciler: Arc<MountReconciler>,
    pub runner: Arc<JobRunner>,
    /// Wakes the reconcile scheduler for an out-of-band pass.
    pub reconcile_trigger: broadcast::Sender<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        registry: Arc<JobRegistry>,
        templates: Arc<TemplateStore>,
        reconciler: Arc<MountReconciler>,
        runner: Arc<JobRunner>,
    ) -> Self {
        let (reconcile_trigger, _) = broadcast::channel(8);
        Self {
            registry,
            templates,
            reconciler,
            runner,
            reconcile_trigger,
            start_time: Instant::now(),
        }
    }

    /// Opens the database, restores the registry, seeds the built-in
    /// templates and wires a runner over the configured mount provider.
    pub fn bootstrap(config: &EngineConfig, db: Database) -> snapex::Result<Self> {
        let directories: HashMap<_, _> = config
            .mounts
            .directories
            .iter()
            .map(|(backup_id, path)| (backup_id.clone(), path.clone()))
            .collect();
        let provider: Arc<dyn MountProvider> = Arc::new(DirectoryMountProvider::new(directories));
        Self::with_provider(config, db, provider)
    }

    pub fn with_provider(
        config: &EngineConfig,
        db: Database,
        provider: Arc<dyn MountProvider>,
    ) -> snapex::Result<Self> {
        let registry = Arc::new(JobRegistry::open(db.clone())?);
        let templates = TemplateStore::new(db);
        templates.seed_defaults()?;

        let reconciler = Arc::new(MountReconciler::with_grace_period(
            provider,
            config.mounts.grace_period(),
        ));
        let runner = JobRunner::new(
            Arc::clone(&registry),
            Arc::clone(&reconciler),
            config.runner_settings(),
        );

        Ok(Self::new(
            registry,
            Arc::new(templates),
            reconciler,
            Arc::new(runner),
        ))
    }
}
