//! Concurrent transfer pool.
//!
//! Dispatcher + worker inbox design:
//! - a feeder pushes jobs into a bounded upstream `mpsc` queue
//! - the dispatcher hands them round-robin to per-worker inboxes
//! - workers run the blocking transport/filesystem I/O and report outcomes
//!   on one results channel
//! - the caller's `on_outcome` runs on the calling thread only, so store
//!   updates stay single-writer
//!
//! Setting the cancel flag stops the feeder; jobs already queued come back
//! as [`JobResult::Cancelled`].

use super::Applied;
use crate::types::{SyncAction, SyncError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, Mutex};

/// Work item accepted by the transfer pool.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub index: usize,
    pub action: SyncAction,
}

/// What happened to a job.
#[derive(Debug)]
pub enum JobResult {
    Done(Result<Applied, SyncError>),
    /// Skipped because the run was cancelled before a worker picked it up
    Cancelled,
}

/// A finished job, delivered back to the coordinator.
#[derive(Debug)]
pub struct TransferOutcome {
    pub index: usize,
    pub action: SyncAction,
    pub result: JobResult,
}

/// The per-action I/O a worker performs.
pub type WorkFn = Arc<dyn Fn(&SyncAction) -> Result<Applied, SyncError> + Send + Sync>;

/// Runtime stats for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub enqueued: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub per_worker_completed: Vec<usize>,
}

impl PoolStats {
    fn new(workers: usize) -> Self {
        Self {
            workers,
            enqueued: 0,
            dispatched: 0,
            completed: 0,
            per_worker_completed: vec![0; workers],
        }
    }
}

/// Worker pool for transfer batches.
pub struct TransferPool {
    runtime: Runtime,
    workers: usize,
    capacity: usize,
}

impl TransferPool {
    /// Create a pool with bounded channels.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Result<Self, SyncError> {
        let workers = worker_count.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(workers)
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            workers,
            capacity: queue_capacity.max(1),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run one batch to completion.
    ///
    /// Returns once every worker has exited. `on_outcome` is called once per
    /// job that reached a worker, in completion order.
    pub fn run<F>(
        &self,
        jobs: Vec<TransferJob>,
        work: WorkFn,
        cancel: Arc<AtomicBool>,
        mut on_outcome: F,
    ) -> Result<PoolStats, SyncError>
    where
        F: FnMut(TransferOutcome),
    {
        let workers = self.workers;
        let capacity = self.capacity;

        self.runtime.block_on(async move {
            let stats = Arc::new(Mutex::new(PoolStats::new(workers)));
            let (enqueue_tx, enqueue_rx) = mpsc::channel::<TransferJob>(capacity);
            let (result_tx, mut result_rx) = mpsc::unbounded_channel::<TransferOutcome>();

            let mut worker_txs = Vec::with_capacity(workers);
            let mut worker_handles = Vec::with_capacity(workers);
            for worker_id in 0..workers {
                let (worker_tx, worker_rx) = mpsc::channel::<TransferJob>(capacity);
                worker_txs.push(worker_tx);

                let work = Arc::clone(&work);
                let cancel = Arc::clone(&cancel);
                let results = result_tx.clone();
                let stats = Arc::clone(&stats);
                worker_handles.push(tokio::task::spawn_blocking(move || {
                    worker_loop(worker_id, worker_rx, work, cancel, results, stats)
                }));
            }
            // Workers hold the only senders; the results loop ends when they exit.
            drop(result_tx);

            let dispatcher =
                tokio::spawn(dispatcher_loop(enqueue_rx, worker_txs, Arc::clone(&stats)));

            let feeder = {
                let cancel = Arc::clone(&cancel);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    for job in jobs {
                        if cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        if enqueue_tx.send(job).await.is_err() {
                            break;
                        }
                        stats.lock().await.enqueued += 1;
                    }
                    // enqueue_tx dropped here, which lets the dispatcher finish.
                })
            };

            while let Some(outcome) = result_rx.recv().await {
                on_outcome(outcome);
            }

            feeder.await.map_err(map_join_error)?;
            dispatcher.await.map_err(map_join_error)?;
            for handle in worker_handles {
                handle.await.map_err(map_join_error)?;
            }

            let snapshot = stats.lock().await.clone();
            Ok(snapshot)
        })
    }
}

async fn dispatcher_loop(
    mut enqueue_rx: mpsc::Receiver<TransferJob>,
    worker_txs: Vec<mpsc::Sender<TransferJob>>,
    stats: Arc<Mutex<PoolStats>>,
) {
    let mut next_worker = 0usize;
    let worker_len = worker_txs.len();

    while let Some(job) = enqueue_rx.recv().await {
        if worker_len == 0 {
            break;
        }

        let target = next_worker % worker_len;
        if worker_txs[target].send(job).await.is_ok() {
            stats.lock().await.dispatched += 1;
            next_worker = (next_worker + 1) % worker_len;
        }
    }
    // worker_txs are dropped here, which closes worker inboxes.
}

fn worker_loop(
    worker_id: usize,
    mut worker_rx: mpsc::Receiver<TransferJob>,
    work: WorkFn,
    cancel: Arc<AtomicBool>,
    results: mpsc::UnboundedSender<TransferOutcome>,
    stats: Arc<Mutex<PoolStats>>,
) {
    while let Some(job) = worker_rx.blocking_recv() {
        let result = if cancel.load(Ordering::SeqCst) {
            JobResult::Cancelled
        } else {
            JobResult::Done(work(&job.action))
        };

        {
            let mut guard = stats.blocking_lock();
            guard.completed += 1;
            if let Some(slot) = guard.per_worker_completed.get_mut(worker_id) {
                *slot += 1;
            }
        }

        let outcome = TransferOutcome {
            index: job.index,
            action: job.action,
            result,
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
}

fn map_join_error(error: tokio::task::JoinError) -> SyncError {
    SyncError::Io(std::io::Error::other(format!(
        "transfer pool task failed: {}",
        error
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::types::RelPath;
    use std::collections::HashSet;
    use std::time::Duration;

    fn upload_job(index: usize) -> TransferJob {
        TransferJob {
            index,
            action: SyncAction::Upload {
                path: RelPath::parse(&format!("file_{index}.tex")).unwrap(),
                fingerprint: hash_bytes(b"x"),
            },
        }
    }

    fn recording_work() -> WorkFn {
        Arc::new(|_action: &SyncAction| {
            std::thread::sleep(Duration::from_millis(2));
            Ok(Applied::Recorded {
                fingerprint: hash_bytes(b"x"),
                bytes: 1,
            })
        })
    }

    #[test]
    fn test_pool_delivers_every_outcome_once() {
        let pool = TransferPool::new(4, 8).expect("create pool");
        let jobs: Vec<_> = (0..64).map(upload_job).collect();
        let mut seen = HashSet::new();

        let stats = pool
            .run(jobs, recording_work(), Arc::new(AtomicBool::new(false)), |outcome| {
                assert!(matches!(outcome.result, JobResult::Done(Ok(_))));
                assert!(seen.insert(outcome.index), "duplicate outcome");
            })
            .expect("run batch");

        assert_eq!(seen.len(), 64);
        assert_eq!(stats.enqueued, 64);
        assert_eq!(stats.dispatched, 64);
        assert_eq!(stats.completed, 64);
        assert!(
            stats.per_worker_completed.iter().filter(|&&c| c > 0).count() > 1,
            "expected jobs distributed across multiple workers"
        );
    }

    #[test]
    fn test_pool_shuts_down_cleanly_without_jobs() {
        let pool = TransferPool::new(2, 8).expect("create pool");
        let stats = pool
            .run(Vec::new(), recording_work(), Arc::new(AtomicBool::new(false)), |_| {
                panic!("no outcomes expected")
            })
            .expect("run batch");
        assert_eq!(stats.enqueued, 0);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn test_pool_enforces_minimum_one_worker() {
        let pool = TransferPool::new(0, 0).expect("create pool");
        assert_eq!(pool.workers(), 1);
        let mut count = 0;
        pool.run(vec![upload_job(0)], recording_work(), Arc::new(AtomicBool::new(false)), |_| {
            count += 1
        })
        .expect("run batch");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_cancel_stops_remaining_jobs() {
        let pool = TransferPool::new(1, 1).expect("create pool");
        let cancel = Arc::new(AtomicBool::new(false));
        let jobs: Vec<_> = (0..50).map(upload_job).collect();
        let mut done = 0;
        let mut cancelled = 0;

        pool.run(jobs, recording_work(), Arc::clone(&cancel), |outcome| {
            match outcome.result {
                JobResult::Done(_) => done += 1,
                JobResult::Cancelled => cancelled += 1,
            }
            cancel.store(true, Ordering::SeqCst);
        })
        .expect("run batch");

        assert!(done >= 1);
        assert!(done + cancelled < 50, "cancel must stop the feeder early");
    }
}
