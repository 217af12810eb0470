use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::service::dispatch::batch::BatchRequest;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub request: BatchRequest,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("job queue is full")]
    QueueFull,

    #[error("worker pool is shut down")]
    Closed,
}

/// Fixed set of workers draining a bounded queue. Submissions never wait:
/// a full queue is reported back to the caller.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
    capacity: usize,
    worker_count: usize,
}

impl WorkerPool {
    pub fn start<H, Fut>(worker_count: usize, capacity: usize, handler: H) -> Self
    where
        H: Fn(QueuedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let worker_count = worker_count.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel::<QueuedJob>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let handler = Arc::new(handler);

        let mut workers = JoinSet::new();
        for worker_idx in 0..worker_count {
            let rx = rx.clone();
            let handler = handler.clone();
            workers.spawn(async move {
                loop {
                    // The lock is only held while waiting for the next job.
                    let next = rx.lock().await.recv().await;
                    let Some(job) = next else { break };
                    tracing::debug!("[Workers] Worker {} picked up job {}", worker_idx, job.id);
                    handler(job).await;
                }
                tracing::debug!("[Workers] Worker {} stopped", worker_idx);
            });
        }
        tracing::info!(
            "[Workers] Started {} workers (queue capacity {})",
            worker_count,
            capacity
        );

        Self {
            sender: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
            capacity,
            worker_count,
        }
    }

    pub fn submit(&self, job: QueuedJob) -> Result<(), SubmitError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(SubmitError::Closed)?;
        sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    pub fn queue_depth(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map(|s| self.capacity.saturating_sub(s.capacity()))
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Closes the queue and waits for the workers to drain it. Callers cancel
    /// the jobs' parent token first so queued jobs finish immediately. Workers
    /// still running after `timeout` are aborted.
    pub async fn shutdown(&self, timeout: Duration) {
        drop(self.sender.lock().take());

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(res) = workers.join_next().await {
                if let Err(e) = res {
                    tracing::warn!("[Workers] Worker ended abnormally: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "[Workers] {} workers still busy after {:?}, aborting",
                workers.len(),
                timeout
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        } else {
            tracing::info!("[Workers] All workers stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(id: &str) -> QueuedJob {
        QueuedJob {
            id: id.to_string(),
            request: BatchRequest {
                server: "EU".to_string(),
                target_id: 1,
                count: 1,
            },
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn submitted_jobs_are_processed() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        let pool = WorkerPool::start(2, 8, move |_job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for i in 0..5 {
            pool.submit(job(&format!("j{}", i))).expect("submit");
        }
        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn full_queue_rejects_instead_of_waiting() {
        let gate = CancellationToken::new();
        let release = gate.clone();
        let pool = WorkerPool::start(1, 1, move |_job| {
            let gate = gate.clone();
            async move { gate.cancelled().await }
        });

        // First job occupies the worker, second fills the queue.
        pool.submit(job("busy")).expect("first");
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(job("queued")).expect("second");
        assert_eq!(pool.queue_depth(), 1);
        assert_eq!(pool.submit(job("rejected")), Err(SubmitError::QueueFull));

        release.cancel();
        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(pool.submit(job("late")), Err(SubmitError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_stuck_workers_after_timeout() {
        let pool = WorkerPool::start(1, 1, |_job| async {
            std::future::pending::<()>().await;
        });
        pool.submit(job("stuck")).expect("submit");
        tokio::task::yield_now().await;

        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(pool.queue_depth(), 0);
    }
}
