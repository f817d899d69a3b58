use crate::error::{Error, Result};
use crate::sync::{BoundedQueue, TryPutError};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// A unit of work queued for a pool.
pub(crate) trait Job: Send + 'static {
    /// Fails the job without running it.
    fn abandon(self, error: Error);
}

/// What a worker does after finishing a job.
pub(crate) enum Flow {
    Continue,

    /// The worker can no longer serve jobs and leaves the pool.
    Retire,
}

/// Named OS threads pulling jobs from one shared queue.
///
/// Each worker loops on a blocking `get` until it reaches the shutdown
/// sentinel, so shutdown drains every job queued before it. When the
/// last worker retires early, the queue is closed and the jobs still in
/// it are failed instead of left waiting.
pub(crate) struct Workers<J: Job> {
    name: String,
    queue: Arc<BoundedQueue<J>>,
    threads: Vec<JoinHandle<()>>,
    alive: Arc<AtomicUsize>,
}

impl<J: Job> Workers<J> {
    /// Starts one thread per handler.
    ///
    /// Threads are named `{name}-{index}`.
    pub(crate) fn start<H>(name: &str, handlers: Vec<H>) -> Result<Self>
    where
        H: FnMut(J) -> Flow + Send + 'static,
    {
        let mut workers = Self {
            name: name.to_string(),
            queue: Arc::new(BoundedQueue::unbounded()),
            threads: Vec::with_capacity(handlers.len()),
            alive: Arc::new(AtomicUsize::new(0)),
        };

        for (index, handler) in handlers.into_iter().enumerate() {
            let queue = workers.queue.clone();
            let alive = workers.alive.clone();

            alive.fetch_add(1, Ordering::AcqRel);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || run(index, queue, alive, handler));

            match spawned {
                Ok(thread) => workers.threads.push(thread),
                Err(err) => {
                    workers.alive.fetch_sub(1, Ordering::AcqRel);
                    return Err(err.into());
                }
            }
        }

        info!(pool = name, workers = workers.threads.len(), "pool started");
        Ok(workers)
    }

    /// Queues `job`, failing it at once if the pool stopped accepting work.
    pub(crate) fn submit(&self, job: J) {
        if let Err(rejected) = self.queue.try_put(job) {
            let (job, error) = match rejected {
                TryPutError::Closed(job) => (job, Error::PoolShutdown),
                // The queue is unbounded, so this only happens if it was
                // built otherwise.
                TryPutError::Full(job) => (job, Error::InvalidState("pool queue is full")),
            };

            job.abandon(error);
        }
    }

    /// Number of workers still serving jobs.
    pub(crate) fn alive(&self) -> usize {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.threads.len()
    }

    /// Number of jobs waiting for a worker.
    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Enqueues the sentinel behind the pending jobs and joins every
    /// worker. Jobs already running or queued complete first.
    pub(crate) fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }

        // Fails only when the last worker already closed the queue.
        let _ = self.queue.try_close();

        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                warn!(pool = %self.name, "worker thread panicked outside a job");
            }
        }

        info!(pool = %self.name, "pool shut down");
    }
}

impl<J: Job> Drop for Workers<J> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<J, H>(index: usize, queue: Arc<BoundedQueue<J>>, alive: Arc<AtomicUsize>, mut handler: H)
where
    J: Job,
    H: FnMut(J) -> Flow,
{
    debug!(worker = index, "worker started");

    while let Ok(job) = queue.get_blocking() {
        if let Flow::Retire = handler(job) {
            warn!(worker = index, "worker retired");

            if alive.fetch_sub(1, Ordering::AcqRel) == 1 {
                abandon_queued(index, &queue);
            }
            return;
        }
    }

    alive.fetch_sub(1, Ordering::AcqRel);
    debug!(worker = index, "worker stopped");
}

/// Fails every queued job once no worker is left to run them.
fn abandon_queued<J: Job>(index: usize, queue: &BoundedQueue<J>) {
    let _ = queue.try_close();

    let mut abandoned = 0;
    while let Ok(Some(job)) = queue.try_get() {
        job.abandon(Error::WorkerCrashed {
            worker: index,
            reason: "no live workers left in the pool".to_string(),
        });
        abandoned += 1;
    }

    warn!(worker = index, abandoned, "last worker retired, pool closed");
}
