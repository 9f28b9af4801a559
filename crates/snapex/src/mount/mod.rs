//! Backup mount sessions: the provider seam, the locally cached projection
//! of provider state, and its reconciliation.

pub mod provider;
pub mod reconciler;
pub mod scheduler;
pub mod session;

pub use provider::{DirectoryMountProvider, MountProvider};
pub use reconciler::{MountReconciler, ReconcileReport};
pub use scheduler::ReconcileScheduler;
pub use session::{MountKind, MountSession, MountState};
