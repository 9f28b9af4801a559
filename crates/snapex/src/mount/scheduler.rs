//! Periodic mount reconciliation with manual trigger support.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use super::reconciler::MountReconciler;

pub struct ReconcileScheduler {
    reconciler: Arc<MountReconciler>,
    /// `None` disables the periodic tick; manual triggers still run.
    interval: Option<Duration>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<MountReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval: (!interval.is_zero()).then_some(interval),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Starts the loop on the current tokio runtime.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let reconciler = Arc::clone(&self.reconciler);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;

        tokio::spawn(async move {
            let mut timer = interval.map(tokio::time::interval);
            if let Some(timer) = timer.as_mut() {
                timer.tick().await; // skip immediate first tick
            }

            let mut trigger_open = true;
            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                let tick = async {
                    match timer.as_mut() {
                        Some(timer) => {
                            timer.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    _ = tick => {},
                    trigger = trigger_rx.recv(), if trigger_open => match trigger {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            log::info!("Manual mount reconciliation triggered");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            log::debug!("Reconcile trigger channel closed");
                            trigger_open = false;
                            continue;
                        }
                    },
                    _ = wake.notified() => {},
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                match reconciler.reconcile().await {
                    Ok(report) if report.changed() => log::info!(
                        "Mount reconciliation: {} stale, {} removed, {} adopted",
                        report.marked_stale,
                        report.removed,
                        report.adopted
                    ),
                    Ok(_) => {}
                    Err(e) => log::error!("Mount reconciliation failed: {}", e),
                }
            }

            log::debug!("Reconcile scheduler stopped");
        })
    }

    /// Signals the scheduler to stop and wakes it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
