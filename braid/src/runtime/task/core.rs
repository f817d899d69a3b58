use super::{JoinHandle, TaskState};
use crate::promise::Settle;
use crate::runtime::context;
use crate::utils::Key;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::task::Waker;

/// Identifier of a task within its runtime.
///
/// Ids are generational: an id is never reused for a later task of the
/// same runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) Key);

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The boxed body of a task.
///
/// The body resolves the task's cell itself; the scheduler only settles
/// the cell for cancellations and panics.
pub(crate) type Body = Pin<Box<dyn Future<Output = ()>>>;

/// A spawned task, as stored in the scheduler's task table.
pub(crate) struct Task {
    pub(crate) id: TaskId,

    state: TaskState,

    /// The suspended continuation. `None` while the scheduler polls it.
    pub(crate) body: Option<Body>,

    /// Pending-cancel flag, shared with every [`CancelHandle`](super::CancelHandle).
    pub(crate) cancel: Arc<AtomicBool>,

    /// The task's only waker, so that `Waker::will_wake` deduplicates.
    pub(crate) waker: Waker,

    /// Settles the task's result cell on cancellation or panic.
    pub(crate) settle: Box<dyn Settle>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        body: Body,
        cancel: Arc<AtomicBool>,
        waker: Waker,
        settle: Box<dyn Settle>,
    ) -> Self {
        Self {
            id,
            state: TaskState::Created,
            body: Some(body),
            cancel,
            waker,
            settle,
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    /// Moves the task to `next`.
    ///
    /// # Panics
    ///
    /// Panics on an illegal transition: the state machine is corrupted
    /// and the run cannot continue.
    pub(crate) fn transition(&mut self, next: TaskState) {
        assert!(
            self.state.can_transition_to(next),
            "scheduler invariant violated: task {} cannot move from {} to {}",
            self.id,
            self.state,
            next
        );

        self.state = next;
    }
}

/// Spawns a future as a task onto the current runtime.
///
/// The task is queued immediately and runs once the scheduler reaches
/// it; the returned [`JoinHandle`] resolves to its output.
///
/// # Panics
///
/// Panics if called outside the context of a running runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = task::spawn(async { 1 + 1 });
/// assert_eq!(handle.await?, 2);
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    context::expect_scheduler("spawn", |scheduler| scheduler.spawn(future))
}

/// Returns the id of the task currently being polled.
///
/// Returns `None` outside a task.
pub fn current() -> Option<TaskId> {
    context::current_task()
}

/// Returns the state of a live task of the current runtime.
///
/// Finished tasks are forgotten by the scheduler; observe them through
/// their [`JoinHandle::state`]. Returns `None` outside a runtime or for
/// an unknown id.
pub fn state(id: TaskId) -> Option<TaskState> {
    context::with_scheduler(|scheduler| scheduler.state_of(id)).flatten()
}
