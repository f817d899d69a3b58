use super::waiter::{Handoff, WaitList, Waiter};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A one-shot event.
///
/// The flag starts unset. [`set`](Self::set) raises it for good and
/// wakes every waiter; once set, waiting returns immediately.
#[derive(Debug)]
pub struct Event {
    id: u64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    set: bool,
    waiters: WaitList,
}

impl Event {
    pub fn new() -> Self {
        Self {
            id: next_object_id(),
            state: Mutex::new(State::default()),
        }
    }

    /// Raises the flag and wakes every current waiter.
    ///
    /// A `wait` that starts after `set` returns never blocks; a `wait`
    /// that started before is woken. Setting twice is a no-op.
    pub fn set(&self) {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if state.set {
            return;
        }

        state.set = true;
        for waiter in state.waiters.take_all() {
            handoff.grant(waiter);
        }
    }

    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    /// Waits until the flag is raised.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            event: self,
            waiter: None,
        }
    }

    /// Blocks the calling thread until the flag is raised.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn wait_blocking(&self) {
        context::assert_not_cooperative("Event::wait_blocking");

        let waiter = {
            let mut state = self.state.lock();

            if state.set {
                return;
            }

            let waiter = Waiter::thread();
            state.waiters.push(waiter.clone());
            waiter
        };

        waiter.park_until_granted();
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Event::wait`].
pub struct Wait<'a> {
    event: &'a Event,
    waiter: Option<Arc<Waiter>>,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let event = self.event;

        match &self.waiter {
            Some(waiter) if waiter.is_granted() => {
                self.waiter = None;
                return Poll::Ready(());
            }
            Some(waiter) => waiter.refresh(cx.waker()),
            None => {
                let mut state = event.state.lock();

                if state.set {
                    return Poll::Ready(());
                }

                let waiter = Waiter::task(cx.waker());
                state.waiters.push(waiter.clone());
                drop(state);

                self.waiter = Some(waiter);
            }
        }

        context::suspend_on(WaitKey::Primitive(event.id));
        Poll::Pending
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            self.event.state.lock().waiters.remove(&waiter);
        }
    }
}
