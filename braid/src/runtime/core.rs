use super::builder::Config;
use super::context;
use super::scheduler::Scheduler;
use crate::error::{Error, Result};
use crate::task::JoinHandle;

use std::future::Future;
use std::panic;
use std::rc::Rc;
use tracing::debug;

/// The main runtime handle.
///
/// `Runtime` is responsible for:
/// - spawning cooperative tasks,
/// - driving them on the calling thread with a single-threaded scheduler,
/// - integrating timers and I/O readiness into the scheduler's poll step,
/// - owning the default thread pool behind `spawn_blocking`.
///
/// A runtime is bound to the thread that created it. Independent
/// runtimes never share state. Dropping the runtime drops every
/// unfinished task and shuts down its blocking pool.
pub struct Runtime {
    scheduler: Rc<Scheduler>,
}

impl Runtime {
    pub(crate) fn new(config: Config) -> Result<Self> {
        let scheduler = Scheduler::new(config)?;
        debug!("runtime started");

        Ok(Self { scheduler })
    }

    /// Spawns a future onto the runtime.
    ///
    /// The task is queued and runs the next time the runtime is driven.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handle = runtime.spawn(async { 7 });
    /// assert_eq!(runtime.run_until_complete(handle)?, Ok(7));
    /// ```
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.scheduler.spawn(future)
    }

    /// Drives the runtime until `future` completes and returns its result.
    ///
    /// The future runs as the root task. Other tasks make progress while
    /// it is suspended; the ones still unfinished when it completes stay
    /// queued for the next run.
    ///
    /// Returns [`Error::Cancelled`] if the root task was cancelled and
    /// [`Error::Panicked`] if it panicked.
    ///
    /// # Panics
    ///
    /// Panics if called from within a runtime.
    pub fn run_until_complete<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        context::enter(self.scheduler.clone(), || {
            let root = self.scheduler.spawn(future);

            self.scheduler.run_until(|| root.is_finished())?;

            match root.try_take() {
                Some(outcome) => outcome,
                None => Err(Error::InvalidState("root task result already collected")),
            }
        })
    }

    /// Runs a future to completion, blocking the current thread.
    ///
    /// This method is the synchronous entry point of the runtime (e.g. in
    /// `main` or tests). A panic inside the future is resumed on the
    /// calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the future panics, is cancelled, or the driver fails.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = runtime.block_on(async {
    ///     42
    /// });
    /// assert_eq!(result, 42);
    /// ```
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        match self.run_until_complete(future) {
            Ok(output) => output,
            Err(Error::Panicked(message)) => panic::resume_unwind(Box::new(message)),
            Err(err) => panic!("block_on failed: {err}"),
        }
    }
}

impl Drop for Runtime {
    /// Shuts down the runtime.
    ///
    /// This performs the following steps:
    /// 1. Drops every unfinished task, cancelling its result cell
    /// 2. Shuts down the blocking pool, waiting for in-flight jobs
    fn drop(&mut self) {
        self.scheduler.shutdown();
        debug!("runtime stopped");
    }
}
