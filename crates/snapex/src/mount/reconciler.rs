//! Keeps the local session cache converged on the provider's session list.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use super::provider::MountProvider;
use super::session::{MountKind, MountSession, MountState};
use crate::error::MountError;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub active_confirmed: usize,
    pub marked_stale: usize,
    pub removed: usize,
    pub adopted: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.marked_stale + self.removed + self.adopted > 0
    }
}

/// Local cache of mount sessions.
///
/// Each entry is an `Arc` snapshot swapped whole under a short write lock, so
/// a running job holding a session keeps a consistent view while
/// reconciliation publishes a new one. Every publish happens under
/// `reconcile_lock`, so a pass never overwrites a session published while it
/// was waiting on the provider.
pub struct MountReconciler {
    provider: Arc<dyn MountProvider>,
    sessions: RwLock<HashMap<String, Arc<MountSession>>>,
    grace_period: Duration,
    reconcile_lock: Mutex<()>,
}

impl MountReconciler {
    pub fn new(provider: Arc<dyn MountProvider>) -> Self {
        Self::with_grace_period(provider, DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(provider: Arc<dyn MountProvider>, grace_period: Duration) -> Self {
        Self {
            provider,
            sessions: RwLock::new(HashMap::new()),
            grace_period,
            reconcile_lock: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Result<HashMap<String, Arc<MountSession>>, MountError> {
        self.sessions
            .read()
            .map(|sessions| sessions.clone())
            .map_err(|_| MountError::ProviderUnavailable("session cache poisoned".to_string()))
    }

    fn publish<F>(&self, f: F) -> Result<(), MountError>
    where
        F: FnOnce(&mut HashMap<String, Arc<MountSession>>),
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MountError::ProviderUnavailable("session cache poisoned".to_string()))?;
        f(&mut sessions);
        Ok(())
    }

    /// Cached sessions ordered by id.
    pub fn sessions(&self) -> Result<Vec<Arc<MountSession>>, MountError> {
        let mut sessions: Vec<_> = self.snapshot()?.into_values().collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(sessions)
    }

    pub fn session(&self, session_id: &str) -> Result<Option<Arc<MountSession>>, MountError> {
        Ok(self.snapshot()?.get(session_id).cloned())
    }

    fn within_grace(&self, session: &MountSession) -> bool {
        let elapsed = (Utc::now() - session.requested_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        elapsed < self.grace_period
    }

    /// Returns an active session for the backup, mounting it when nothing
    /// usable is cached.
    pub async fn resolve_mount_point(
        &self,
        backup_id: &str,
    ) -> Result<Arc<MountSession>, MountError> {
        let cached = self.snapshot()?;
        let mut stale = Vec::new();
        for session in cached.values().filter(|s| s.backup_id == backup_id) {
            match session.state {
                MountState::Active => return Ok(Arc::clone(session)),
                MountState::Requested if self.within_grace(session) => {
                    return Err(MountError::NotReady {
                        session_id: session.session_id.clone(),
                        backup_id: backup_id.to_string(),
                    });
                }
                _ => stale.push(session.session_id.clone()),
            }
        }

        let session = Arc::new(self.provider.mount(backup_id).await?);
        let _guard = self.reconcile_lock.lock().await;
        self.publish(|sessions| {
            for id in &stale {
                sessions.remove(id);
            }
            sessions.insert(session.session_id.clone(), Arc::clone(&session));
        })?;

        if session.state != MountState::Active {
            return Err(MountError::NotReady {
                session_id: session.session_id.clone(),
                backup_id: backup_id.to_string(),
            });
        }
        Ok(session)
    }

    /// Diffs the cache against the provider and publishes the result.
    ///
    /// Present upstream: refreshed to `active`. Absent upstream: active
    /// sessions are removed, requested sessions turn `stale` once past the
    /// grace period. Upstream-only sessions are adopted.
    pub async fn reconcile(&self) -> Result<ReconcileReport, MountError> {
        let _guard = self.reconcile_lock.lock().await;
        let local = self.snapshot()?;

        let upstream: HashMap<String, MountSession> = self
            .provider
            .list_active_sessions()
            .await?
            .into_iter()
            .map(|s| (s.session_id.clone(), s))
            .collect();
        let now = Utc::now();

        let mut report = ReconcileReport::default();
        let mut next: HashMap<String, Arc<MountSession>> = HashMap::new();

        for (id, session) in &local {
            if let Some(remote) = upstream.get(id) {
                let refreshed = MountSession {
                    mount_point: remote.mount_point.clone(),
                    ..session.with_state(MountState::Active, Some(now))
                };
                report.active_confirmed += 1;
                next.insert(id.clone(), Arc::new(refreshed));
                continue;
            }

            match session.state {
                MountState::Active | MountState::Gone => {
                    log::info!("Mount session {} vanished upstream; removing", id);
                    report.removed += 1;
                }
                MountState::Requested if self.within_grace(session) => {
                    next.insert(id.clone(), Arc::clone(session));
                }
                MountState::Requested => {
                    log::warn!(
                        "Mount session {} for backup {} not confirmed within {:?}; marking stale",
                        id,
                        session.backup_id,
                        self.grace_period
                    );
                    report.marked_stale += 1;
                    next.insert(
                        id.clone(),
                        Arc::new(session.with_state(MountState::Stale, Some(now))),
                    );
                }
                MountState::Stale => {
                    next.insert(id.clone(), Arc::clone(session));
                }
            }
        }

        for (id, remote) in upstream {
            if local.contains_key(&id) {
                continue;
            }
            log::info!("Adopting upstream mount session {} ({})", id, remote.backup_id);
            report.adopted += 1;
            next.insert(id, Arc::new(remote.with_state(MountState::Active, Some(now))));
        }

        self.publish(|sessions| *sessions = next)?;

        tracing::debug!(
            active = report.active_confirmed,
            stale = report.marked_stale,
            removed = report.removed,
            adopted = report.adopted,
            "Mount reconciliation finished"
        );
        Ok(report)
    }

    /// Releases a session through the call its kind requires and drops it
    /// from the cache.
    pub async fn unmount(&self, session_id: &str) -> Result<MountSession, MountError> {
        let session = self
            .session(session_id)?
            .ok_or_else(|| MountError::UnknownSession(session_id.to_string()))?;

        let result = match &session.kind {
            MountKind::FileLevelRestore { .. } => {
                self.provider.unmount_flr(&session.session_id).await
            }
            MountKind::DataIntegration { mount_id, .. } => {
                self.provider.unmount_data_integration(mount_id).await
            }
        };
        result.map_err(|e| MountError::UnmountFailed {
            session_id: session_id.to_string(),
            reason: e.to_string(),
        })?;

        let _guard = self.reconcile_lock.lock().await;
        self.publish(|sessions| {
            sessions.remove(session_id);
        })?;
        log::info!(
            "Unmounted {} session {}",
            session.kind.as_str(),
            session_id
        );
        Ok(session.with_state(MountState::Gone, Some(Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Provider whose upstream list and mount answers are set by the test.
    #[derive(Default)]
    struct FakeProvider {
        upstream: StdMutex<Vec<MountSession>>,
        mount_state: StdMutex<Option<MountState>>,
        calls: StdMutex<Vec<String>>,
    }

    impl FakeProvider {
        fn set_upstream(&self, sessions: Vec<MountSession>) {
            *self.upstream.lock().unwrap() = sessions;
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MountProvider for FakeProvider {
        async fn mount(&self, backup_id: &str) -> Result<MountSession, MountError> {
            self.calls.lock().unwrap().push(format!("mount:{}", backup_id));
            let state = self.mount_state.lock().unwrap().unwrap_or(MountState::Active);
            Ok(flr(&format!("s-{}", backup_id), backup_id, state))
        }

        async fn list_active_sessions(&self) -> Result<Vec<MountSession>, MountError> {
            Ok(self.upstream.lock().unwrap().clone())
        }

        async fn unmount_flr(&self, session_id: &str) -> Result<(), MountError> {
            self.calls.lock().unwrap().push(format!("flr:{}", session_id));
            Ok(())
        }

        async fn unmount_data_integration(&self, mount_id: &str) -> Result<(), MountError> {
            self.calls.lock().unwrap().push(format!("di:{}", mount_id));
            Ok(())
        }
    }

    fn flr(id: &str, backup: &str, state: MountState) -> MountSession {
        MountSession::new(
            id,
            backup,
            MountKind::FileLevelRestore {
                share_path: format!("\\\\host\\{}", backup),
            },
            format!("/mnt/{}", backup),
            state,
        )
    }

    fn block(id: &str, backup: &str) -> MountSession {
        MountSession::new(
            id,
            backup,
            MountKind::DataIntegration {
                mount_id: format!("map-{}", backup),
                device_path: "/dev/sdz".to_string(),
            },
            format!("/mnt/{}", backup),
            MountState::Active,
        )
    }

    /// Holds `list_active_sessions` open until the test releases it.
    #[derive(Default)]
    struct GatedListing {
        inner: FakeProvider,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl MountProvider for GatedListing {
        async fn mount(&self, backup_id: &str) -> Result<MountSession, MountError> {
            self.inner.mount(backup_id).await
        }

        async fn list_active_sessions(&self) -> Result<Vec<MountSession>, MountError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.list_active_sessions().await
        }

        async fn unmount_flr(&self, session_id: &str) -> Result<(), MountError> {
            self.inner.unmount_flr(session_id).await
        }

        async fn unmount_data_integration(&self, mount_id: &str) -> Result<(), MountError> {
            self.inner.unmount_data_integration(mount_id).await
        }
    }

    fn reconciler(grace: Duration) -> (Arc<FakeProvider>, MountReconciler) {
        let provider = Arc::new(FakeProvider::default());
        let reconciler = MountReconciler::with_grace_period(provider.clone(), grace);
        (provider, reconciler)
    }

    #[tokio::test]
    async fn test_resolve_mounts_once_and_caches() {
        let (provider, reconciler) = reconciler(DEFAULT_GRACE_PERIOD);

        let first = reconciler.resolve_mount_point("b1").await.unwrap();
        let second = reconciler.resolve_mount_point("b1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls(), vec!["mount:b1"]);
    }

    #[tokio::test]
    async fn test_requested_session_is_not_ready() {
        let (provider, reconciler) = reconciler(DEFAULT_GRACE_PERIOD);
        *provider.mount_state.lock().unwrap() = Some(MountState::Requested);

        assert!(matches!(
            reconciler.resolve_mount_point("b1").await,
            Err(MountError::NotReady { .. })
        ));
        // Within grace the cached request answers without a second mount call.
        assert!(matches!(
            reconciler.resolve_mount_point("b1").await,
            Err(MountError::NotReady { .. })
        ));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_diff_rules() {
        let (provider, reconciler) = reconciler(DEFAULT_GRACE_PERIOD);
        reconciler.resolve_mount_point("keep").await.unwrap();
        reconciler.resolve_mount_point("orphan").await.unwrap();

        provider.set_upstream(vec![
            flr("s-keep", "keep", MountState::Active),
            flr("s-new", "new", MountState::Active),
        ]);

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                active_confirmed: 1,
                marked_stale: 0,
                removed: 1,
                adopted: 1,
            }
        );
        let ids: Vec<String> = reconciler
            .sessions()
            .unwrap()
            .iter()
            .map(|s| s.session_id.clone())
            .collect();
        assert_eq!(ids, vec!["s-keep", "s-new"]);
        assert!(reconciler
            .sessions()
            .unwrap()
            .iter()
            .all(|s| s.last_reconciled.is_some()));
    }

    #[tokio::test]
    async fn test_requested_past_grace_becomes_stale() {
        let (provider, reconciler) = reconciler(Duration::ZERO);
        *provider.mount_state.lock().unwrap() = Some(MountState::Requested);
        let _ = reconciler.resolve_mount_point("b1").await;

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.marked_stale, 1);
        let session = reconciler.session("s-b1").unwrap().unwrap();
        assert_eq!(session.state, MountState::Stale);
    }

    #[tokio::test]
    async fn test_requested_within_grace_is_left_alone() {
        let (provider, reconciler) = reconciler(Duration::from_secs(3600));
        *provider.mount_state.lock().unwrap() = Some(MountState::Requested);
        let _ = reconciler.resolve_mount_point("b1").await;

        let report = reconciler.reconcile().await.unwrap();
        assert!(!report.changed());
        let session = reconciler.session("s-b1").unwrap().unwrap();
        assert_eq!(session.state, MountState::Requested);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (provider, reconciler) = reconciler(Duration::ZERO);
        *provider.mount_state.lock().unwrap() = Some(MountState::Requested);
        let _ = reconciler.resolve_mount_point("pending").await;
        provider.set_upstream(vec![flr("s-up", "up", MountState::Active)]);

        let first = reconciler.reconcile().await.unwrap();
        assert!(first.changed());
        let before = reconciler.sessions().unwrap();

        let second = reconciler.reconcile().await.unwrap();
        assert!(!second.changed());
        let after = reconciler.sessions().unwrap();
        let states = |v: &[Arc<MountSession>]| {
            v.iter()
                .map(|s| (s.session_id.clone(), s.state))
                .collect::<Vec<_>>()
        };
        assert_eq!(states(&before), states(&after));
    }

    #[tokio::test]
    async fn test_stale_session_is_remounted() {
        let (provider, reconciler) = reconciler(Duration::ZERO);
        *provider.mount_state.lock().unwrap() = Some(MountState::Requested);
        let _ = reconciler.resolve_mount_point("b1").await;
        reconciler.reconcile().await.unwrap();

        *provider.mount_state.lock().unwrap() = Some(MountState::Active);
        let session = reconciler.resolve_mount_point("b1").await.unwrap();
        assert_eq!(session.state, MountState::Active);
        assert_eq!(provider.calls(), vec!["mount:b1", "mount:b1"]);
    }

    #[tokio::test]
    async fn test_unmount_dispatches_on_kind() {
        let (provider, reconciler) = reconciler(DEFAULT_GRACE_PERIOD);
        provider.set_upstream(vec![
            flr("s-flr", "a", MountState::Active),
            block("s-blk", "b"),
        ]);
        reconciler.reconcile().await.unwrap();

        let gone = reconciler.unmount("s-flr").await.unwrap();
        assert_eq!(gone.state, MountState::Gone);
        reconciler.unmount("s-blk").await.unwrap();

        assert_eq!(provider.calls(), vec!["flr:s-flr", "di:map-b"]);
        assert!(reconciler.sessions().unwrap().is_empty());
        assert!(matches!(
            reconciler.unmount("s-flr").await,
            Err(MountError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_session_mounted_during_pass_survives() {
        let provider = Arc::new(GatedListing::default());
        let reconciler = Arc::new(MountReconciler::new(provider.clone()));

        let pass = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.reconcile().await }
        });
        provider.entered.notified().await;

        let resolve = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.resolve_mount_point("b1").await }
        });
        while provider.inner.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        provider.release.notify_one();

        let report = pass.await.unwrap().unwrap();
        let session = resolve.await.unwrap().unwrap();
        assert_eq!(report.removed, 0);
        assert!(reconciler.session(&session.session_id).unwrap().is_some());

        let again = reconciler.resolve_mount_point("b1").await.unwrap();
        assert!(Arc::ptr_eq(&session, &again));
        assert_eq!(provider.inner.calls(), vec!["mount:b1"]);
    }
}
