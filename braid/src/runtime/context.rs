use crate::runtime::scheduler::{Scheduler, WaitKey};
use crate::runtime::task::TaskId;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    /// Scheduler driving the current thread, if any.
    ///
    /// Installed by [`enter`] for the duration of a run so that leaf
    /// futures (timers, primitives, promises) can reach the scheduler
    /// without explicit parameter passing.
    static CURRENT: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

/// Restores the previous context on exit, including unwinding.
struct Reset;

impl Drop for Reset {
    fn drop(&mut self) {
        CURRENT.with(|current| current.borrow_mut().take());
    }
}

/// Runs `f` with `scheduler` installed as the current thread's scheduler.
///
/// # Panics
///
/// Panics if the thread is already inside a run.
pub(crate) fn enter<R>(scheduler: Rc<Scheduler>, f: impl FnOnce() -> R) -> R {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        assert!(
            current.is_none(),
            "cannot start a runtime from within a runtime"
        );
        *current = Some(scheduler);
    });

    let _reset = Reset;
    f()
}

/// Calls `f` with the current scheduler, or returns `None` outside a run.
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&Rc<Scheduler>) -> R) -> Option<R> {
    let scheduler = CURRENT.with(|current| current.borrow().clone())?;
    Some(f(&scheduler))
}

/// Like [`with_scheduler`], for operations that only make sense in a run.
///
/// # Panics
///
/// Panics with "`what` must be called within the context of a runtime".
pub(crate) fn expect_scheduler<R>(what: &str, f: impl FnOnce(&Rc<Scheduler>) -> R) -> R {
    match with_scheduler(f) {
        Some(out) => out,
        None => panic!("{what} must be called within the context of a runtime"),
    }
}

/// Id of the task being polled on this thread.
pub(crate) fn current_task() -> Option<TaskId> {
    with_scheduler(|scheduler| scheduler.running()).flatten()
}

/// Id of the current runtime paired with the task being polled.
pub(crate) fn current_task_in_runtime() -> Option<(u64, TaskId)> {
    with_scheduler(|scheduler| scheduler.running().map(|task| (scheduler.id(), task))).flatten()
}

/// Declares the wait-key of the task being polled.
///
/// Leaf futures call this right before returning `Poll::Pending`.
/// Outside a task this does nothing, so leaves stay usable from
/// foreign executors.
pub(crate) fn suspend_on(key: WaitKey) {
    with_scheduler(|scheduler| scheduler.declare(key));
}

/// Panics if called from inside a running task.
///
/// Blocking the control thread stalls every other task, so blocking
/// operations refuse to run there.
pub(crate) fn assert_not_cooperative(operation: &str) {
    if current_task().is_some() {
        panic!(
            "`{operation}` would block the runtime thread; \
             await the async variant or offload the call with `task::spawn_blocking`"
        );
    }
}
