use super::{TaskId, TaskState};
use crate::error::Result;
use crate::promise::{Completion, Promise};
use crate::runtime::context;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

/// A handle to a spawned task.
///
/// A `JoinHandle` implements [`Future`] and resolves to the task's
/// output once it finishes, to [`Error::Cancelled`](crate::Error::Cancelled) if it was cancelled
/// or to [`Error::Panicked`](crate::Error::Panicked) if its future panicked.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    pub(crate) id: TaskId,
    pub(crate) promise: Promise<T>,
    pub(crate) cancel: CancelHandle,
}

impl<T> JoinHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Requests cancellation of the task.
    ///
    /// The request is delivered at the task's next suspension point. A
    /// task that never suspends runs to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a handle that can request cancellation from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.promise.is_complete()
    }

    /// Returns the task's current state.
    ///
    /// Returns `None` while the task is live and the handle is inspected
    /// outside the runtime that owns it.
    pub fn state(&self) -> Option<TaskState> {
        match self.promise.completion() {
            Some(Completion::Resolved) => Some(TaskState::Done),
            Some(Completion::Rejected) => Some(TaskState::Failed),
            Some(Completion::Cancelled) => Some(TaskState::Cancelled),
            None => context::with_scheduler(|scheduler| scheduler.state_of(self.id)).flatten(),
        }
    }

    /// Collects the output of a finished task without waiting.
    pub(crate) fn try_take(&self) -> Option<Result<T>> {
        self.promise.try_take()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.promise).poll(cx)
    }
}

/// Requests cancellation of a task from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    pub(crate) flag: Arc<AtomicBool>,
    pub(crate) waker: Waker,
}

impl CancelHandle {
    /// Sets the task's pending-cancel flag and wakes it.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            self.waker.wake_by_ref();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Cancels every handle, then waits for each task to finish.
///
/// This is how the leftovers of [`await_first`](super::await_first) are
/// drained: tasks that already finished keep their result, the others
/// observe the cancellation at their next suspension point.
pub async fn cancel_all<T>(handles: Vec<JoinHandle<T>>) -> Vec<Result<T>> {
    for handle in &handles {
        handle.cancel();
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await);
    }

    results
}
