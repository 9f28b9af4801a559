use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::{ExtractionError, WorkerError};
use crate::extractor::MultiLevelExtractor;
use crate::worker::job::{UnitResult, WorkUnit};

/// Fixed-size pool of extraction threads fed through a bounded queue.
///
/// Results go to an unbounded channel so a slow consumer never blocks a
/// worker; the queue bound alone limits in-flight work.
pub struct WorkerPool {
    unit_sender: Sender<WorkUnit>,
    result_receiver: Receiver<UnitResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        extractor: Arc<MultiLevelExtractor>,
        worker_count: usize,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (unit_sender, unit_receiver) = bounded::<WorkUnit>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<UnitResult>();

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let unit_rx = unit_receiver.clone();
            let result_tx = result_sender.clone();
            let cancel_flag = Arc::clone(&cancel);
            let worker_extractor = Arc::clone(&extractor);

            let handle = thread::Builder::new()
                .name(format!("snapex-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, unit_rx, result_tx, cancel_flag, worker_extractor);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} extraction workers", worker_count);

        Ok(Self {
            unit_sender,
            result_receiver,
            workers,
        })
    }

    pub fn submit(&self, unit: WorkUnit) -> Result<(), WorkerError> {
        self.unit_sender
            .send(unit)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// A handle on the result stream. The stream ends once `wait` has joined
    /// every worker and the pool is dropped.
    pub fn results(&self) -> Receiver<UnitResult> {
        self.result_receiver.clone()
    }

    /// Closes the queue and blocks until every queued unit has been handled.
    pub fn wait(self) {
        drop(self.unit_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All extraction workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    unit_receiver: Receiver<WorkUnit>,
    result_sender: Sender<UnitResult>,
    cancel: Arc<AtomicBool>,
    extractor: Arc<MultiLevelExtractor>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        match unit_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(unit) => {
                let result = if cancel.load(Ordering::Relaxed) {
                    UnitResult::Skipped(unit.descriptor)
                } else {
                    debug!(
                        "Worker {} processing {}",
                        worker_id, unit.descriptor.relative_path
                    );
                    process_unit(&extractor, unit)
                };

                if let Err(e) = result_sender.send(result) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} queue disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs one unit, turning an extractor panic into a per-file failure.
fn process_unit(extractor: &MultiLevelExtractor, unit: WorkUnit) -> UnitResult {
    let outcome = catch_unwind(AssertUnwindSafe(|| extractor.process(&unit.descriptor)));
    match outcome {
        Ok(Ok(extraction)) => UnitResult::Completed(Box::new(extraction)),
        Ok(Err(error)) => UnitResult::Failed {
            extractor: extractor.selected(&unit.descriptor),
            descriptor: unit.descriptor,
            error,
        },
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                "Extractor panicked on {}: {}",
                unit.descriptor.relative_path, message
            );
            UnitResult::Failed {
                extractor: extractor.selected(&unit.descriptor),
                descriptor: unit.descriptor,
                error: ExtractionError::Panicked(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::extractor::ExtractorKind;
    use crate::job::{ExtractionLevel, JobConfig};
    use crate::worker::FileDescriptor;
    use tempfile::TempDir;

    fn unit(dir: &TempDir, name: &str, content: &str) -> WorkUnit {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        WorkUnit::new(FileDescriptor {
            classification: classify(&path),
            relative_path: name.to_string(),
            size: content.len() as u64,
            modified: None,
            path,
        })
    }

    fn extractor() -> Arc<MultiLevelExtractor> {
        let config = JobConfig {
            extraction_level: ExtractionLevel::ContentParsing,
            ..Default::default()
        };
        Arc::new(MultiLevelExtractor::for_job(&config))
    }

    #[test]
    fn test_pool_processes_all_units() {
        let dir = TempDir::new().unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let pool = WorkerPool::new(extractor(), 3, cancel).unwrap();
        let results = pool.results();

        for i in 0..10 {
            pool.submit(unit(&dir, &format!("f{}.txt", i), "hello"))
                .unwrap();
        }
        pool.submit(unit(&dir, "broken.json", "{ nope")).unwrap();
        pool.wait();

        let collected: Vec<UnitResult> = results.try_iter().collect();
        assert_eq!(collected.len(), 11);
        let failed: Vec<&UnitResult> = collected
            .iter()
            .filter(|r| matches!(r, UnitResult::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            failed[0],
            UnitResult::Failed {
                extractor: Some(ExtractorKind::Config),
                ..
            }
        ));
    }

    #[test]
    fn test_cancelled_units_are_skipped() {
        let dir = TempDir::new().unwrap();
        let cancel = Arc::new(AtomicBool::new(true));
        let pool = WorkerPool::new(extractor(), 2, cancel).unwrap();
        let results = pool.results();

        pool.submit(unit(&dir, "a.txt", "x")).unwrap();
        pool.submit(unit(&dir, "b.txt", "y")).unwrap();
        pool.wait();

        let collected: Vec<UnitResult> = results.try_iter().collect();
        assert_eq!(collected.len(), 2);
        assert!(collected
            .iter()
            .all(|r| matches!(r, UnitResult::Skipped(_))));
    }

    #[test]
    fn test_zero_workers_still_drains_queue() {
        let dir = TempDir::new().unwrap();
        let pool = WorkerPool::new(extractor(), 0, Arc::new(AtomicBool::new(false))).unwrap();
        let results = pool.results();

        pool.submit(unit(&dir, "only.txt", "hello")).unwrap();
        pool.wait();

        let collected: Vec<UnitResult> = results.try_iter().collect();
        assert_eq!(collected.len(), 1);
        assert!(matches!(collected[0], UnitResult::Completed(_)));
    }
}
