use super::waiter::{Handoff, Holder, Waiter};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex;

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A lock its holder may acquire again.
///
/// The lock remembers who holds it (a task inside a runtime, a thread
/// otherwise) and how many times. Re-acquiring by the holder succeeds
/// immediately; only the matching number of releases frees the lock for
/// the next waiter.
///
/// Guards only give shared access: hand out a `RefCell` or similar
/// through the lock when mutation is needed.
pub struct ReentrantLock<T: ?Sized> {
    id: u64,
    state: Mutex<State>,
    data: UnsafeCell<T>,
}

struct State {
    holder: Option<Holder>,
    depth: usize,
    waiters: VecDeque<(Holder, Arc<Waiter>)>,
}

impl State {
    /// Takes the lock for `me` if it is free or already held by `me`.
    fn try_enter(&mut self, me: Holder) -> bool {
        match self.holder {
            Some(holder) if holder == me => {
                self.depth += 1;
                true
            }
            None if self.waiters.is_empty() => {
                self.holder = Some(me);
                self.depth = 1;
                true
            }
            _ => false,
        }
    }
}

// Safety: the data is only reachable through guards, and only the
// holder, one task or one thread at a time, can hold guards.
unsafe impl<T: ?Sized + Send> Send for ReentrantLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for ReentrantLock<T> {}

impl<T> ReentrantLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: next_object_id(),
            state: Mutex::new(State {
                holder: None,
                depth: 0,
                waiters: VecDeque::new(),
            }),
            data: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized> ReentrantLock<T> {
    /// Acquires the lock for the current task.
    pub fn lock(&self) -> ReentrantLockFuture<'_, T> {
        ReentrantLockFuture {
            lock: self,
            waiter: None,
        }
    }

    /// Acquires the lock for the calling thread, blocking it.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn lock_blocking(&self) -> ReentrantLockGuard<'_, T> {
        context::assert_not_cooperative("ReentrantLock::lock_blocking");

        let me = Holder::current();
        let waiter = {
            let mut state = self.state.lock();

            if state.try_enter(me) {
                return ReentrantLockGuard::new(self);
            }

            let waiter = Waiter::thread();
            state.waiters.push_back((me, waiter.clone()));
            waiter
        };

        waiter.park_until_granted();
        ReentrantLockGuard::new(self)
    }

    /// Acquires the lock if it is free or already held by the caller.
    pub fn try_lock(&self) -> Option<ReentrantLockGuard<'_, T>> {
        let mut state = self.state.lock();

        state.try_enter(Holder::current()).then(|| ReentrantLockGuard::new(self))
    }

    /// Returns `true` if the current task or thread holds the lock.
    pub fn is_held_by_current(&self) -> bool {
        self.state.lock().holder == Some(Holder::current())
    }

    /// Number of times the holder has acquired the lock.
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Undoes one acquisition; the last one hands the lock on.
    fn release(&self) {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        // Bodies dropped by the scheduler run outside any task, so only a
        // task-to-task mismatch is detectable.
        if let (Some(holder @ Holder::Task { .. }), current @ Holder::Task { .. }) =
            (state.holder, Holder::current())
        {
            debug_assert_eq!(holder, current, "ReentrantLock released by a task that does not hold it");
        }

        state.depth -= 1;
        if state.depth > 0 {
            return;
        }

        state.holder = None;

        if let Some((next, waiter)) = state.waiters.pop_front() {
            state.holder = Some(next);
            state.depth = 1;
            handoff.grant(waiter);
        }
    }
}

impl<T: ?Sized> fmt::Debug for ReentrantLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("ReentrantLock")
            .field("holder", &state.holder)
            .field("depth", &state.depth)
            .finish_non_exhaustive()
    }
}

/// Future returned by [`ReentrantLock::lock`].
pub struct ReentrantLockFuture<'a, T: ?Sized> {
    lock: &'a ReentrantLock<T>,
    waiter: Option<Arc<Waiter>>,
}

impl<'a, T: ?Sized> Future for ReentrantLockFuture<'a, T> {
    type Output = ReentrantLockGuard<'a, T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lock = self.lock;

        if let Some(waiter) = &self.waiter {
            if waiter.is_granted() {
                self.waiter = None;
                return Poll::Ready(ReentrantLockGuard::new(lock));
            }

            waiter.refresh(cx.waker());
        } else {
            let me = Holder::current();
            let mut state = lock.state.lock();

            if state.try_enter(me) {
                return Poll::Ready(ReentrantLockGuard::new(lock));
            }

            let waiter = Waiter::task(cx.waker());
            state.waiters.push_back((me, waiter.clone()));
            drop(state);

            self.waiter = Some(waiter);
        }

        context::suspend_on(WaitKey::Primitive(lock.id));
        Poll::Pending
    }
}

impl<T: ?Sized> Drop for ReentrantLockFuture<'_, T> {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        let mut state = self.lock.state.lock();
        let before = state.waiters.len();
        state.waiters.retain(|(_, queued)| !Arc::ptr_eq(queued, &waiter));

        if state.waiters.len() == before && waiter.is_granted() {
            drop(state);
            self.lock.release();
        }
    }
}

/// Guard of a [`ReentrantLock`] acquisition.
///
/// The guard is tied to its holder and cannot move to another thread.
#[must_use = "the acquisition is undone as soon as the guard is dropped"]
pub struct ReentrantLockGuard<'a, T: ?Sized> {
    lock: &'a ReentrantLock<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> ReentrantLockGuard<'a, T> {
    fn new(lock: &'a ReentrantLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T: ?Sized> Deref for ReentrantLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ReentrantLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
