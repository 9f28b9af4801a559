use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a backup is exposed. Set when the session is created and used to pick
/// the unmount call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MountKind {
    /// File-level restore published as a network share.
    FileLevelRestore { share_path: String },
    /// Block-level mapping of the backup disk (iSCSI target or raw device).
    DataIntegration { mount_id: String, device_path: String },
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::FileLevelRestore { .. } => "file_level_restore",
            MountKind::DataIntegration { .. } => "data_integration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    /// Asked for, not yet visible upstream.
    Requested,
    Active,
    /// Requested but never confirmed within the grace period.
    Stale,
    /// Released through an unmount call.
    Gone,
}

impl MountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountState::Requested => "requested",
            MountState::Active => "active",
            MountState::Stale => "stale",
            MountState::Gone => "gone",
        }
    }
}

/// Cached view of one provider session. Entries are replaced whole, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSession {
    pub session_id: String,
    pub backup_id: String,
    #[serde(flatten)]
    pub kind: MountKind,
    pub mount_point: PathBuf,
    pub state: MountState,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl MountSession {
    pub fn new(
        session_id: impl Into<String>,
        backup_id: impl Into<String>,
        kind: MountKind,
        mount_point: impl Into<PathBuf>,
        state: MountState,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            backup_id: backup_id.into(),
            kind,
            mount_point: mount_point.into(),
            state,
            requested_at: Utc::now(),
            last_reconciled: None,
        }
    }

    pub(crate) fn with_state(&self, state: MountState, at: Option<DateTime<Utc>>) -> Self {
        Self {
            state,
            last_reconciled: at.or(self.last_reconciled),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_tagged_in_json() {
        let session = MountSession::new(
            "s1",
            "b1",
            MountKind::DataIntegration {
                mount_id: "m-9".into(),
                device_path: "/dev/sdx".into(),
            },
            "/mnt/b1",
            MountState::Active,
        );
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["kind"], "data_integration");
        assert_eq!(value["mount_id"], "m-9");
        assert_eq!(value["state"], "active");
    }
}
