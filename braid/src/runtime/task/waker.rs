use crate::runtime::driver::Unparker;
use crate::runtime::task::TaskId;

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};
use std::thread::{self, ThreadId};

/// Mailbox of task wakeups, shared by every waker of one runtime.
///
/// Wakers may fire from any thread. They only record the task id here;
/// the scheduler drains the inbox on its control thread and decides
/// what a wakeup means for the task's current state.
pub(crate) struct Inbox {
    /// Ids of woken tasks, in wake order.
    woken: Mutex<VecDeque<TaskId>>,

    /// Interrupts the driver when a wake arrives from another thread.
    unparker: Arc<Unparker>,

    /// The runtime's control thread.
    owner: ThreadId,
}

impl Inbox {
    pub(crate) fn new(unparker: Arc<Unparker>) -> Arc<Self> {
        Arc::new(Self {
            woken: Mutex::new(VecDeque::new()),
            unparker,
            owner: thread::current().id(),
        })
    }

    /// Records a wakeup for `task`.
    ///
    /// The control thread is never parked while it runs tasks, so only
    /// foreign threads need to interrupt the driver.
    pub(crate) fn push(&self, task: TaskId) {
        self.woken.lock().push_back(task);

        if thread::current().id() != self.owner {
            self.unparker.unpark();
        }
    }

    /// Takes every pending wakeup.
    pub(crate) fn drain(&self) -> VecDeque<TaskId> {
        mem::take(&mut *self.woken.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.woken.lock().is_empty()
    }
}

/// Payload behind a task's [`Waker`].
///
/// It holds the task id rather than the task itself: a waker is a
/// lookup-only back reference and never keeps a task alive.
struct TaskWaker {
    id: TaskId,
    inbox: Arc<Inbox>,
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates the [`Waker`] of task `id`.
///
/// # Safety
///
/// The pointer stored inside the `RawWaker` originates from
/// `Arc::into_raw` and every vtable function keeps the reference count
/// balanced.
pub(crate) fn make_waker(id: TaskId, inbox: Arc<Inbox>) -> Waker {
    let payload = Arc::new(TaskWaker { id, inbox });

    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(payload) as *const (), &VTABLE)) }
}

/// Clones the raw waker by incrementing the payload's reference count.
fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

/// Wakes the task and consumes the waker.
fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    arc.inbox.push(arc.id);
}

/// Wakes the task without consuming the waker.
fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    arc.inbox.push(arc.id);
    mem::forget(arc);
}

/// Drops the raw waker.
fn drop_raw(ptr: *const ()) {
    unsafe { drop(Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker)) };
}
