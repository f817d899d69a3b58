//! Waiter plumbing shared by every primitive.
//!
//! A primitive keeps its waiters in one FIFO [`WaitList`], whether they
//! are tasks (woken through their [`Waker`]) or worker threads (parked
//! with [`thread::park`]). Releases hand the resource directly to the
//! head waiter by *granting* it under the primitive's lock, then notify
//! it once the lock is released. A granted waiter owns the resource, so
//! a newcomer can never overtake it.

use crate::runtime::context;
use crate::runtime::task::TaskId;

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;
use std::thread::{self, Thread, ThreadId};

/// Identity of whoever holds or requests a primitive.
///
/// Task ids restart in every runtime, so a task is identified together
/// with the runtime that drives it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Holder {
    Task { runtime: u64, task: TaskId },
    Thread(ThreadId),
}

impl Holder {
    /// The running task, or the calling thread outside a task.
    pub(crate) fn current() -> Holder {
        match context::current_task_in_runtime() {
            Some((runtime, task)) => Holder::Task { runtime, task },
            None => Holder::Thread(thread::current().id()),
        }
    }
}

enum Wakeup {
    Task(Waker),
    Thread(Thread),
}

/// One queued request.
pub(crate) struct Waiter {
    granted: AtomicBool,
    wakeup: Mutex<Wakeup>,
}

impl Waiter {
    pub(crate) fn task(waker: &Waker) -> Arc<Self> {
        Arc::new(Self {
            granted: AtomicBool::new(false),
            wakeup: Mutex::new(Wakeup::Task(waker.clone())),
        })
    }

    pub(crate) fn thread() -> Arc<Self> {
        Arc::new(Self {
            granted: AtomicBool::new(false),
            wakeup: Mutex::new(Wakeup::Thread(thread::current())),
        })
    }

    /// Marks the request as satisfied. Called under the primitive's lock.
    pub(crate) fn grant(&self) {
        self.granted.store(true, Ordering::Release);
    }

    pub(crate) fn is_granted(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }

    /// Wakes the waiter. Called after the primitive's lock is released.
    pub(crate) fn notify(&self) {
        match &*self.wakeup.lock() {
            Wakeup::Task(waker) => waker.wake_by_ref(),
            Wakeup::Thread(thread) => thread.unpark(),
        }
    }

    /// Replaces the stored waker if the task was polled with a new one.
    pub(crate) fn refresh(&self, waker: &Waker) {
        let mut wakeup = self.wakeup.lock();

        if let Wakeup::Task(current) = &*wakeup {
            if current.will_wake(waker) {
                return;
            }
        }

        *wakeup = Wakeup::Task(waker.clone());
    }

    /// Parks the calling thread until the request is granted.
    pub(crate) fn park_until_granted(&self) {
        while !self.is_granted() {
            thread::park();
        }
    }
}

/// FIFO of pending requests.
#[derive(Default)]
pub(crate) struct WaitList {
    waiters: VecDeque<Arc<Waiter>>,
}

impl WaitList {
    pub(crate) fn push(&mut self, waiter: Arc<Waiter>) {
        self.waiters.push_back(waiter);
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<Waiter>> {
        self.waiters.pop_front()
    }

    /// Removes an abandoned request.
    pub(crate) fn remove(&mut self, waiter: &Arc<Waiter>) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|queued| !Arc::ptr_eq(queued, waiter));

        self.waiters.len() != before
    }

    /// Takes every request, in FIFO order.
    pub(crate) fn take_all(&mut self) -> VecDeque<Arc<Waiter>> {
        std::mem::take(&mut self.waiters)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

impl fmt::Debug for WaitList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitList").field("len", &self.len()).finish()
    }
}

/// Grants and notifies the waiters it collects once dropped.
///
/// Primitives collect hand-offs while holding their lock and let this
/// notify after the lock guard is gone.
#[derive(Default)]
pub(crate) struct Handoff {
    granted: Vec<Arc<Waiter>>,
}

impl Handoff {
    pub(crate) fn grant(&mut self, waiter: Arc<Waiter>) {
        waiter.grant();
        self.granted.push(waiter);
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        for waiter in self.granted.drain(..) {
            waiter.notify();
        }
    }
}
