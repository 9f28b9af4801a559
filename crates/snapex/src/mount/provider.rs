use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::session::{MountKind, MountSession, MountState};
use crate::error::MountError;

/// The external service that owns backup mounts. Its session list is the
/// authoritative state the reconciler converges on.
#[async_trait]
pub trait MountProvider: Send + Sync {
    async fn mount(&self, backup_id: &str) -> Result<MountSession, MountError>;

    async fn list_active_sessions(&self) -> Result<Vec<MountSession>, MountError>;

    /// Releases a file-level-restore session.
    async fn unmount_flr(&self, session_id: &str) -> Result<(), MountError>;

    /// Deletes a block-level mapping.
    async fn unmount_data_integration(&self, mount_id: &str) -> Result<(), MountError>;
}

/// Serves pre-mounted local directories as file-level-restore sessions.
pub struct DirectoryMountProvider {
    directories: HashMap<String, PathBuf>,
    sessions: Mutex<HashMap<String, MountSession>>,
}

impl DirectoryMountProvider {
    pub fn new(directories: HashMap<String, PathBuf>) -> Self {
        Self {
            directories,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, MountSession>>, MountError> {
        self.sessions
            .lock()
            .map_err(|_| MountError::ProviderUnavailable("session table poisoned".to_string()))
    }
}

#[async_trait]
impl MountProvider for DirectoryMountProvider {
    async fn mount(&self, backup_id: &str) -> Result<MountSession, MountError> {
        let directory = self
            .directories
            .get(backup_id)
            .ok_or_else(|| MountError::BackupNotFound(backup_id.to_string()))?;
        if !directory.is_dir() {
            return Err(MountError::MissingMountPoint(directory.clone()));
        }

        let mut sessions = self.lock()?;
        if let Some(existing) = sessions.values().find(|s| s.backup_id == backup_id) {
            return Ok(existing.clone());
        }

        let session = MountSession::new(
            format!("flr-{}", Uuid::new_v4()),
            backup_id,
            MountKind::FileLevelRestore {
                share_path: directory.display().to_string(),
            },
            directory.clone(),
            MountState::Active,
        );
        log::info!(
            "Mounted backup {} at {} ({})",
            backup_id,
            directory.display(),
            session.session_id
        );
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn list_active_sessions(&self) -> Result<Vec<MountSession>, MountError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn unmount_flr(&self, session_id: &str) -> Result<(), MountError> {
        self.lock()?
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| MountError::UnknownSession(session_id.to_string()))
    }

    async fn unmount_data_integration(&self, mount_id: &str) -> Result<(), MountError> {
        Err(MountError::UnknownSession(mount_id.to_string()))
    }
}
