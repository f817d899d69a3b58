use super::waiter::{Handoff, WaitList, Waiter};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex;

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A counting semaphore.
///
/// `Semaphore` bounds the number of concurrent holders of a resource.
/// Tasks wait with [`acquire`](Self::acquire), worker threads with
/// [`acquire_blocking`](Self::acquire_blocking); both share one FIFO
/// queue. A release hands its permit straight to the oldest waiter, so
/// a newcomer never takes a permit a waiter was owed.
///
/// # Examples
///
/// ```rust,ignore
/// let semaphore = Arc::new(Semaphore::new(3));
///
/// let permit = semaphore.acquire().await;
/// // at most three tasks run this section at once
/// drop(permit);
/// ```
pub struct Semaphore {
    id: u64,
    state: Mutex<State>,
}

struct State {
    permits: usize,
    waiters: WaitList,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Self {
        Self {
            id: next_object_id(),
            state: Mutex::new(State {
                permits,
                waiters: WaitList::default(),
            }),
        }
    }

    /// Returns a future resolving to a permit.
    pub fn acquire(&self) -> Acquire<'_> {
        Acquire {
            semaphore: self,
            waiter: None,
        }
    }

    /// Blocks the calling thread until a permit is available.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn acquire_blocking(&self) -> Permit<'_> {
        context::assert_not_cooperative("Semaphore::acquire_blocking");

        let waiter = {
            let mut state = self.state.lock();

            if state.permits > 0 && state.waiters.is_empty() {
                state.permits -= 1;
                return Permit { semaphore: self };
            }

            let waiter = Waiter::thread();
            state.waiters.push(waiter.clone());
            waiter
        };

        waiter.park_until_granted();
        Permit { semaphore: self }
    }

    /// Takes a permit if one is free and nobody is queued for it.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();

        if state.permits > 0 && state.waiters.is_empty() {
            state.permits -= 1;
            Some(Permit { semaphore: self })
        } else {
            None
        }
    }

    /// Returns one permit.
    ///
    /// The permit goes to the oldest waiter if there is one; only
    /// otherwise does the free count grow. Pair this with
    /// [`Permit::forget`].
    pub fn release(&self) {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        match state.waiters.pop() {
            Some(waiter) => handoff.grant(waiter),
            None => state.permits += 1,
        }

        drop(state);
    }

    /// Number of permits nobody holds or is owed.
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Number of queued requests.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("Semaphore")
            .field("permits", &state.permits)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// Future returned by [`Semaphore::acquire`].
///
/// Dropping it while queued withdraws the request; dropping it after a
/// permit was handed over passes the permit on.
pub struct Acquire<'a> {
    semaphore: &'a Semaphore,
    waiter: Option<Arc<Waiter>>,
}

impl<'a> Future for Acquire<'a> {
    type Output = Permit<'a>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let semaphore = self.semaphore;

        if let Some(waiter) = &self.waiter {
            if waiter.is_granted() {
                self.waiter = None;
                return Poll::Ready(Permit { semaphore });
            }

            waiter.refresh(cx.waker());
        } else {
            let mut state = semaphore.state.lock();

            if state.permits > 0 && state.waiters.is_empty() {
                state.permits -= 1;
                return Poll::Ready(Permit { semaphore });
            }

            let waiter = Waiter::task(cx.waker());
            state.waiters.push(waiter.clone());
            self.waiter = Some(waiter);
        }

        context::suspend_on(WaitKey::Primitive(semaphore.id));
        Poll::Pending
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        let mut state = self.semaphore.state.lock();

        if !state.waiters.remove(&waiter) && waiter.is_granted() {
            drop(state);
            self.semaphore.release();
        }
    }
}

/// A held permit, returned to the semaphore on drop.
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Permit<'_> {
    /// Keeps the permit checked out; give it back later with
    /// [`Semaphore::release`].
    pub fn forget(self) {
        mem::forget(self);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}
