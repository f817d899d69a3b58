use super::mutex::MutexGuard;
use super::waiter::{Handoff, WaitList, Waiter};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A condition variable paired with a [`Mutex`](super::Mutex).
///
/// A waiter is queued *before* its guard is released, so a notification
/// sent after the waiter checked its condition is never lost. Wakeups
/// are FIFO. As with every condition variable, re-check the condition
/// in a loop after waking.
///
/// # Examples
///
/// ```rust,ignore
/// let mut ready = mutex.lock().await;
/// while !*ready {
///     ready = condvar.wait(ready).await;
/// }
/// ```
#[derive(Debug)]
pub struct Condvar {
    id: u64,
    waiters: Mutex<WaitList>,
}

impl Condvar {
    pub fn new() -> Self {
        Self {
            id: next_object_id(),
            waiters: Mutex::new(WaitList::default()),
        }
    }

    /// Releases `guard`, waits for a notification, then locks again.
    pub async fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex;

        Notified {
            condvar: self,
            guard: Some(guard),
            waiter: None,
        }
        .await;

        mutex.lock().await
    }

    /// Blocking counterpart of [`wait`](Self::wait) for worker threads.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn wait_blocking<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        context::assert_not_cooperative("Condvar::wait_blocking");

        let mutex = guard.mutex;
        let waiter = Waiter::thread();

        self.waiters.lock().push(waiter.clone());
        drop(guard);

        waiter.park_until_granted();
        mutex.lock_blocking()
    }

    /// Wakes the oldest waiter.
    pub fn notify_one(&self) {
        let mut handoff = Handoff::default();

        if let Some(waiter) = self.waiters.lock().pop() {
            handoff.grant(waiter);
        }
    }

    /// Wakes every current waiter.
    pub fn notify_all(&self) {
        let mut handoff = Handoff::default();

        for waiter in self.waiters.lock().take_all() {
            handoff.grant(waiter);
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a notification, releasing the guard once queued.
struct Notified<'c, 'a, T: ?Sized> {
    condvar: &'c Condvar,
    guard: Option<MutexGuard<'a, T>>,
    waiter: Option<Arc<Waiter>>,
}

impl<T: ?Sized> Future for Notified<'_, '_, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match &self.waiter {
            Some(waiter) if waiter.is_granted() => {
                self.waiter = None;
                return Poll::Ready(());
            }
            Some(waiter) => waiter.refresh(cx.waker()),
            None => {
                let waiter = Waiter::task(cx.waker());
                self.condvar.waiters.lock().push(waiter.clone());
                self.waiter = Some(waiter);
                self.guard = None;
            }
        }

        context::suspend_on(WaitKey::Primitive(self.condvar.id));
        Poll::Pending
    }
}

impl<T: ?Sized> Drop for Notified<'_, '_, T> {
    /// Withdraws the request, passing on a notification it consumed.
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        let removed = self.condvar.waiters.lock().remove(&waiter);

        if !removed && waiter.is_granted() {
            self.condvar.notify_one();
        }
    }
}
