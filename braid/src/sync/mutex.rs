use super::waiter::{Handoff, WaitList, Waiter};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex as StateLock;

use std::cell::UnsafeCell;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A non-reentrant mutex shared by tasks and worker threads.
///
/// Tasks that cannot acquire the lock are suspended and woken when the
/// mutex is handed to them; threads use
/// [`lock_blocking`](Self::lock_blocking). Waiters are served in FIFO
/// order and the lock passes directly from the releasing holder to the
/// next waiter.
///
/// The mutex does not track who holds it: a task that locks it again
/// while holding it waits for itself forever. Use
/// [`ReentrantLock`](super::ReentrantLock) when re-entry is expected.
pub struct Mutex<T: ?Sized> {
    id: u64,

    /// Lock flag and waiters.
    ///
    /// Protected by a blocking lock because manipulating them is fast.
    state: StateLock<State>,

    /// The underlying data protected by the mutex.
    ///
    /// UnsafeCell allows mutable access through shared references,
    /// which is safe because we guarantee mutual exclusion.
    data: UnsafeCell<T>,
}

/// A mutex that only guards a critical section.
pub type Lock = Mutex<()>;

struct State {
    locked: bool,
    waiters: WaitList,
}

// Safety: `Mutex<T>` can be sent across threads if `T` is Send.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
// Safety: `Mutex<T>` can be shared across threads if `T` is Send,
// because access to the data is serialized by the lock flag.
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new, unlocked mutex wrapping the given value.
    pub fn new(value: T) -> Mutex<T> {
        Self {
            id: next_object_id(),
            state: StateLock::new(State {
                locked: false,
                waiters: WaitList::default(),
            }),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Returns a future that will resolve to a guard when the mutex is acquired.
    ///
    /// This does **not block the thread**. Instead, the task is suspended until
    /// the mutex is handed to it.
    ///
    /// # Example
    /// ```rust,ignore
    /// let guard = mutex.lock().await;
    /// // The protected value can now be accessed via `*guard`.
    /// ```
    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture {
            mutex: self,
            waiter: None,
        }
    }

    /// Blocks the calling thread until the mutex is acquired.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn lock_blocking(&self) -> MutexGuard<'_, T> {
        context::assert_not_cooperative("Mutex::lock_blocking");

        let waiter = {
            let mut state = self.state.lock();

            if !state.locked {
                state.locked = true;
                return MutexGuard { mutex: self };
            }

            let waiter = Waiter::thread();
            state.waiters.push(waiter.clone());
            waiter
        };

        waiter.park_until_granted();
        MutexGuard { mutex: self }
    }

    /// Acquires the mutex if it is free and nobody is queued for it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.lock();

        if state.locked {
            return None;
        }

        state.locked = true;
        Some(MutexGuard { mutex: self })
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Releases the lock, handing it to the oldest waiter if any.
    fn unlock(&self) {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        match state.waiters.pop() {
            Some(waiter) => handoff.grant(waiter),
            None => state.locked = false,
        }

        drop(state);
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Future returned by `Mutex::lock`.
///
/// The future resolves to a `MutexGuard` once the lock is acquired.
/// Dropping it while queued withdraws the request; dropping it after the
/// lock was handed over releases the lock again.
pub struct LockFuture<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    waiter: Option<Arc<Waiter>>,
}

impl<'a, T: ?Sized> Future for LockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    /// Polls the future to attempt acquiring the mutex.
    ///
    /// If the mutex is free, the future resolves immediately.
    /// If the mutex is locked, the current task is queued and the
    /// future returns `Poll::Pending` until the lock is handed to it.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mutex = self.mutex;

        if let Some(waiter) = &self.waiter {
            if waiter.is_granted() {
                self.waiter = None;
                return Poll::Ready(MutexGuard { mutex });
            }

            waiter.refresh(cx.waker());
        } else {
            let mut state = mutex.state.lock();

            if !state.locked {
                state.locked = true;
                return Poll::Ready(MutexGuard { mutex });
            }

            let waiter = Waiter::task(cx.waker());
            state.waiters.push(waiter.clone());
            drop(state);

            self.waiter = Some(waiter);
        }

        context::suspend_on(WaitKey::Primitive(mutex.id));
        Poll::Pending
    }
}

impl<T: ?Sized> Drop for LockFuture<'_, T> {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        let mut state = self.mutex.state.lock();

        if !state.waiters.remove(&waiter) && waiter.is_granted() {
            drop(state);
            self.mutex.unlock();
        }
    }
}

/// Guard returned by `Mutex::lock`.
///
/// Releases the mutex when dropped.
#[must_use = "the mutex is unlocked as soon as the guard is dropped"]
pub struct MutexGuard<'a, T: ?Sized> {
    pub(crate) mutex: &'a Mutex<T>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    /// Returns the mutex this guard locks.
    pub fn mutex(guard: &Self) -> &'a Mutex<T> {
        guard.mutex
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    /// Unlocks the mutex and hands it to the next waiter (if any).
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    /// Provides immutable access to the protected data.
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    /// Provides mutable access to the protected data.
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// Safety: the guard only hands out `&T` across threads.
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}
