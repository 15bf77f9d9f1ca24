//! Jobs and the bounded pool that runs them.
//!
//! A [`JobPool`] is a fixed set of worker tasks fed by a bounded channel.
//! Submitting to a saturated pool waits for room instead of buffering
//! without limit, which is the engine's only backpressure mechanism.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// A named unit of deferred work.
pub struct Job {
    name: String,
    task: BoxFuture<'static, Result<()>>,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            task: Box::pin(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self) -> Result<()> {
        self.task.await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Fixed-size worker pool with a bounded submission queue.
pub struct JobPool {
    size: usize,
    sender: mpsc::Sender<Job>,
    cancelled: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl JobPool {
    /// Spawn `size` workers (at least one). The queue holds as many jobs
    /// as there are workers.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(size);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancelled = Arc::new(AtomicBool::new(false));

        let workers = (0..size)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let cancelled = Arc::clone(&cancelled);
                tokio::spawn(async move {
                    loop {
                        let next = { receiver.lock().await.recv().await };
                        let Some(job) = next else {
                            break;
                        };
                        if cancelled.load(Ordering::Acquire) {
                            debug!(worker = id, job = job.name(), "dropping queued job");
                            continue;
                        }
                        let name = job.name().to_string();
                        debug!(worker = id, job = %name, "running job");
                        if let Err(e) = job.run().await {
                            error!(worker = id, job = %name, "job failed: {e}");
                        }
                    }
                    debug!(worker = id, "worker exiting");
                })
            })
            .collect();

        Self {
            size,
            sender,
            cancelled,
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// A handle for submitting jobs. Sending waits while the queue is full.
    pub fn sender(&self) -> mpsc::Sender<Job> {
        self.sender.clone()
    }

    /// Submit a job, waiting for room if the pool is saturated.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.sender.send(job).await.map_err(|_| Error::Stopped)
    }

    /// Stop accepting work and drop whatever is still queued. Jobs that are
    /// already running finish on their own.
    pub fn cancel(self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Stop accepting work but let the workers finish the queue in the
    /// background.
    pub fn close(self) {}

    /// Stop accepting work, run the queue to completion, and wait for
    /// every worker to exit.
    pub async fn shutdown(self) {
        let Self {
            sender, workers, ..
        } = self;
        drop(sender);
        for worker in workers {
            if let Err(e) = worker.await {
                error!("job worker panicked: {e}");
            }
        }
    }
}
