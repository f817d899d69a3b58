use super::worker::{Flow, Job, Workers};
use crate::bridge::{PoolFuture, WorkerPool};
use crate::error::{Error, Result, panic_message};
use crate::promise::{Promise, Resolver};

use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, warn};

/// A pool of OS threads running blocking closures.
///
/// Closures return `Result<T, E>`; the value resolves the job's
/// [`PoolFuture`], the error rejects it with [`Error::Job`] carrying the
/// original error. A closure that panics fails its own job with
/// [`Error::WorkerCrashed`]; the worker thread keeps serving.
///
/// Dropping the pool (or calling [`shutdown`](Self::shutdown)) lets the
/// queued jobs finish and joins every thread.
///
/// # Examples
///
/// ```rust,ignore
/// let pool = ThreadPool::builder().workers(4).build()?;
///
/// let sum = pool.submit(|| Ok::<_, io::Error>(expensive_sum()));
/// assert_eq!(sum.await?, 42);
/// ```
pub struct ThreadPool {
    workers: Workers<Box<dyn Call>>,
}

/// A type-erased closure and the cell it settles.
trait Call: Send + 'static {
    fn call(self: Box<Self>, worker: usize);

    fn reject(self: Box<Self>, error: Error);
}

impl Job for Box<dyn Call> {
    fn abandon(self, error: Error) {
        self.reject(error);
    }
}

struct Closure<F, T> {
    f: F,
    resolver: Resolver<T>,
}

impl<F, T, E> Call for Closure<F, T>
where
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    fn call(self: Box<Self>, worker: usize) {
        let Closure { f, resolver } = *self;

        if resolver.is_complete() {
            debug!(worker, "skipping job whose result was cancelled");
            return;
        }

        // A discarded publish (the consumer cancelled) is not an error.
        let _ = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => resolver.resolve(value),
            Ok(Err(err)) => resolver.reject(Error::job(err)),
            Err(payload) => {
                let reason = panic_message(&*payload);
                warn!(worker, %reason, "job panicked");

                resolver.reject(Error::WorkerCrashed { worker, reason })
            }
        };
    }

    fn reject(self: Box<Self>, error: Error) {
        let _ = self.resolver.reject(error);
    }
}

impl ThreadPool {
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// Starts a pool, runs `f` with it, then shuts it down.
    ///
    /// The pool is shut down on every exit path, including unwinding.
    pub fn scope<R>(workers: usize, f: impl FnOnce(&ThreadPool) -> R) -> Result<R> {
        let pool = Self::builder().workers(workers).build()?;
        let out = f(&pool);
        pool.shutdown();

        Ok(out)
    }

    /// Queues `f` and returns a future of its result.
    ///
    /// After shutdown the future fails with [`Error::PoolShutdown`].
    pub fn submit<F, T, E>(&self, f: F) -> PoolFuture<T>
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (promise, resolver) = Promise::new();

        self.workers.submit(Box::new(Closure { f, resolver }));
        PoolFuture::new(promise)
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.workers.queued()
    }

    /// Lets every queued job finish and joins the worker threads.
    pub fn shutdown(mut self) {
        self.workers.shutdown();
    }
}

impl<F, T, E> WorkerPool<F> for ThreadPool
where
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    type Output = T;

    fn submit_job(&self, job: F) -> PoolFuture<T> {
        self.submit(job)
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .field("queued", &self.workers.queued())
            .finish()
    }
}

/// Builder for a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    workers: usize,
    name: String,
}

impl ThreadPoolBuilder {
    /// One worker per logical CPU, threads named `braid-worker-{i}`.
    pub fn new() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            workers,
            name: "braid-worker".to_string(),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn workers(mut self, n: usize) -> Self {
        assert!(n > 0, "workers must be > 0");

        self.workers = n;
        self
    }

    /// Sets the prefix of the worker thread names.
    pub fn name(mut self, prefix: impl Into<String>) -> Self {
        self.name = prefix.into();
        self
    }

    /// Starts the worker threads.
    pub fn build(self) -> Result<ThreadPool> {
        let handlers = (0..self.workers)
            .map(|index| {
                move |job: Box<dyn Call>| {
                    job.call(index);
                    Flow::Continue
                }
            })
            .collect();

        Ok(ThreadPool {
            workers: Workers::start(&self.name, handlers)?,
        })
    }
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
