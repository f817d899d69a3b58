//! The bridge between cooperative tasks and worker pools.
//!
//! A task hands blocking or CPU-heavy work to a pool and suspends on the
//! returned [`PoolFuture`]; the worker publishes the outcome into the
//! future's result cell, waking the task from its own thread.
//!
//! Cancelling the waiting task drops its `PoolFuture`, which cancels the
//! cell. The job itself is not interrupted: a job already running
//! finishes, its publish is discarded, and pool shutdown still waits for
//! it. A job still queued is skipped.

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::runtime::context;

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A pool that accepts jobs of type `J`.
///
/// Implemented by [`ThreadPool`](crate::pool::ThreadPool) for closures
/// and by [`ProcessPool`](crate::pool::ProcessPool) for
/// [`ProcessJob`](crate::pool::ProcessJob)s.
pub trait WorkerPool<J> {
    type Output;

    fn submit_job(&self, job: J) -> PoolFuture<Self::Output>;
}

/// Submits `job` to `pool` and returns a future of its outcome.
///
/// # Examples
///
/// ```rust,ignore
/// let digest = bridge::submit_to_pool(&pool, move || hash_file(&path)).await?;
/// ```
pub fn submit_to_pool<P, J>(pool: &P, job: J) -> PoolFuture<P::Output>
where
    P: WorkerPool<J>,
{
    pool.submit_job(job)
}

/// Runs `f` on the runtime's blocking pool.
///
/// The pool is started on first use with
/// [`RuntimeBuilder::blocking_threads`](crate::RuntimeBuilder::blocking_threads)
/// threads and shut down with the runtime.
///
/// # Panics
///
/// Panics when called outside a runtime.
pub fn spawn_blocking<F, T>(f: F) -> PoolFuture<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let submitted = context::expect_scheduler("spawn_blocking", |scheduler| {
        scheduler.with_blocking_pool(|pool| pool.submit(move || Ok::<T, Infallible>(f())))
    });

    match submitted {
        Ok(future) => future,
        Err(err) => PoolFuture::failed(err),
    }
}

/// The outcome of a job running in a worker pool.
///
/// Await it inside a task, or block a plain thread on it with
/// [`wait_blocking`](Self::wait_blocking). Dropping it before the job
/// finished discards the job's result.
#[must_use = "dropping a PoolFuture discards the job's result"]
pub struct PoolFuture<T> {
    promise: Option<Promise<T>>,
}

impl<T> PoolFuture<T> {
    pub(crate) fn new(promise: Promise<T>) -> Self {
        Self {
            promise: Some(promise),
        }
    }

    /// A future that is already rejected with `error`.
    pub(crate) fn failed(error: Error) -> Self {
        let (promise, resolver) = Promise::new();
        let _ = resolver.reject(error);

        Self::new(promise)
    }

    pub fn is_complete(&self) -> bool {
        self.promise.as_ref().is_some_and(Promise::is_complete)
    }

    /// Blocks the calling thread until the job finishes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn wait_blocking(mut self) -> Result<T> {
        match self.promise.take() {
            Some(promise) => promise.wait_blocking(),
            None => Err(Error::InvalidState("pool result already collected")),
        }
    }
}

impl<T> Future for PoolFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.promise.as_mut() {
            Some(promise) => Pin::new(promise).poll(cx),
            None => Poll::Ready(Err(Error::InvalidState("pool result already collected"))),
        }
    }
}

impl<T> Drop for PoolFuture<T> {
    fn drop(&mut self) {
        if let Some(promise) = self.promise.take() {
            promise.cancel();
        }
    }
}

impl<T> fmt::Debug for PoolFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolFuture")
            .field("promise", &self.promise)
            .finish()
    }
}
