use super::waiter::{Handoff, WaitList, Waiter};
use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A FIFO queue with backpressure, shared by tasks and worker threads.
///
/// Producers suspend while the queue holds `maxsize` entries, consumers
/// while it is empty. Items come out in the order they went in, and
/// waiters of each kind are served in arrival order.
///
/// Shutdown is signalled in-band: [`close`](Self::close) enqueues a
/// sentinel behind the pending items. A consumer that reaches the
/// sentinel gets [`Error::QueueClosed`] and leaves it in place for the
/// next one, so every consumer observes shutdown exactly once no matter
/// how many there are. Puts after `close` fail with
/// [`Error::QueueClosed`].
///
/// # Examples
///
/// ```rust,ignore
/// let queue = Arc::new(BoundedQueue::new(5));
///
/// queue.put(1).await?;
/// queue.close().await?;
///
/// assert_eq!(queue.get().await?, 1);
/// assert!(queue.get().await.is_err());
/// ```
pub struct BoundedQueue<T> {
    id: u64,
    maxsize: usize,
    state: Mutex<State<T>>,
}

enum Slot<T> {
    Item(T),
    Sentinel,
}

struct State<T> {
    items: VecDeque<Slot<T>>,

    /// Blocked producers, each with the entry it is waiting to enqueue.
    producers: VecDeque<(Arc<Waiter>, Slot<T>)>,

    consumers: WaitList,

    /// Entries promised to consumers that were granted but did not run yet.
    reserved: usize,

    /// Set once a sentinel was accepted or is waiting for room.
    closed: bool,
}

/// Error returned by [`BoundedQueue::try_put`], handing the item back.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPutError<T> {
    Full(T),
    Closed(T),
}

impl<T> TryPutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPutError::Full(item) | TryPutError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Display for TryPutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPutError::Full(_) => f.write_str("queue is full"),
            TryPutError::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPutError<T> {}

enum Start<T> {
    Done(T),
    Queued(Arc<Waiter>),
}

impl<T> State<T> {
    fn has_room(&self, maxsize: usize) -> bool {
        maxsize == 0 || self.items.len() < maxsize
    }

    /// Enqueues `slot`, reserving it for the oldest waiting consumer.
    fn push(&mut self, slot: Slot<T>, handoff: &mut Handoff) {
        self.items.push_back(slot);
        self.wake_consumer(handoff);
    }

    fn wake_consumer(&mut self, handoff: &mut Handoff) {
        if let Some(consumer) = self.consumers.pop() {
            self.reserved += 1;
            handoff.grant(consumer);
        }
    }

    /// Takes the head entry for a consumer entitled to it.
    ///
    /// The sentinel is never removed: the next consumer is handed the
    /// same shutdown signal.
    fn take_head(&mut self, handoff: &mut Handoff) -> Result<T> {
        match self.items.front() {
            Some(Slot::Sentinel) => {
                self.wake_consumer(handoff);
                Err(Error::QueueClosed)
            }
            Some(Slot::Item(_)) => {
                let Some(Slot::Item(item)) = self.items.pop_front() else {
                    return Err(Error::InvalidState("queue head changed under its lock"));
                };

                if let Some((producer, slot)) = self.producers.pop_front() {
                    handoff.grant(producer);
                    self.push(slot, handoff);
                }

                Ok(item)
            }
            None => Err(Error::InvalidState("consumer granted an empty queue")),
        }
    }

    /// Whether a consumer that is not queued may take the head now.
    fn head_available(&self) -> bool {
        self.consumers.is_empty() && self.items.len() > self.reserved
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `maxsize` entries.
    ///
    /// A `maxsize` of `0` means unbounded.
    pub fn new(maxsize: usize) -> Self {
        Self {
            id: next_object_id(),
            maxsize,
            state: Mutex::new(State {
                items: VecDeque::new(),
                producers: VecDeque::new(),
                consumers: WaitList::default(),
                reserved: 0,
                closed: false,
            }),
        }
    }

    /// Creates a queue without a capacity limit.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    /// Number of queued items, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .items
            .iter()
            .filter(|slot| matches!(slot, Slot::Item(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Enqueues `item`, suspending while the queue is full.
    pub fn put(&self, item: T) -> Put<'_, T> {
        Put {
            queue: self,
            slot: Some(Slot::Item(item)),
            waiter: None,
        }
    }

    /// Enqueues the shutdown sentinel behind the pending items.
    ///
    /// Like a put, this waits for room. Dropping the future before the
    /// sentinel was accepted reopens the queue.
    pub fn close(&self) -> Put<'_, T> {
        Put {
            queue: self,
            slot: Some(Slot::Sentinel),
            waiter: None,
        }
    }

    /// Dequeues the oldest item, suspending while the queue is empty.
    pub fn get(&self) -> Get<'_, T> {
        Get {
            queue: self,
            waiter: None,
        }
    }

    /// Enqueues `item` if there is room right now.
    pub fn try_put(&self, item: T) -> std::result::Result<(), TryPutError<T>> {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if state.closed {
            return Err(TryPutError::Closed(item));
        }

        if !state.producers.is_empty() || !state.has_room(self.maxsize) {
            return Err(TryPutError::Full(item));
        }

        state.push(Slot::Item(item), &mut handoff);
        Ok(())
    }

    /// Enqueues the sentinel if there is room right now.
    pub fn try_close(&self) -> std::result::Result<(), TryPutError<()>> {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if state.closed {
            return Err(TryPutError::Closed(()));
        }

        if !state.producers.is_empty() || !state.has_room(self.maxsize) {
            return Err(TryPutError::Full(()));
        }

        state.closed = true;
        state.push(Slot::Sentinel, &mut handoff);
        Ok(())
    }

    /// Dequeues the oldest item if one is available right now.
    ///
    /// Returns `Ok(None)` when empty and [`Error::QueueClosed`] once the
    /// sentinel is at the head.
    pub fn try_get(&self) -> Result<Option<T>> {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if !state.head_available() {
            return Ok(None);
        }

        state.take_head(&mut handoff).map(Some)
    }

    /// Blocking counterpart of [`put`](Self::put) for worker threads.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn put_blocking(&self, item: T) -> Result<()> {
        context::assert_not_cooperative("BoundedQueue::put_blocking");
        self.put_slot_blocking(Slot::Item(item))
    }

    /// Blocking counterpart of [`close`](Self::close).
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn close_blocking(&self) -> Result<()> {
        context::assert_not_cooperative("BoundedQueue::close_blocking");
        self.put_slot_blocking(Slot::Sentinel)
    }

    /// Blocking counterpart of [`get`](Self::get) for worker threads.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn get_blocking(&self) -> Result<T> {
        context::assert_not_cooperative("BoundedQueue::get_blocking");

        match self.start_get(Waiter::thread) {
            Start::Done(outcome) => outcome,
            Start::Queued(waiter) => {
                waiter.park_until_granted();
                self.finish_get()
            }
        }
    }

    fn put_slot_blocking(&self, slot: Slot<T>) -> Result<()> {
        match self.start_put(slot, Waiter::thread) {
            Start::Done(outcome) => outcome,
            Start::Queued(waiter) => {
                waiter.park_until_granted();
                Ok(())
            }
        }
    }

    fn start_put(&self, slot: Slot<T>, waiter: impl FnOnce() -> Arc<Waiter>) -> Start<Result<()>> {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if state.closed {
            return Start::Done(Err(Error::QueueClosed));
        }

        if matches!(slot, Slot::Sentinel) {
            state.closed = true;
        }

        if state.producers.is_empty() && state.has_room(self.maxsize) {
            state.push(slot, &mut handoff);
            return Start::Done(Ok(()));
        }

        let waiter = waiter();
        state.producers.push_back((waiter.clone(), slot));
        Start::Queued(waiter)
    }

    fn start_get(&self, waiter: impl FnOnce() -> Arc<Waiter>) -> Start<Result<T>> {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if state.head_available() {
            return Start::Done(state.take_head(&mut handoff));
        }

        let waiter = waiter();
        state.consumers.push(waiter.clone());
        Start::Queued(waiter)
    }

    /// Completes a get whose waiter was granted an entry.
    fn finish_get(&self) -> Result<T> {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        state.reserved -= 1;
        state.take_head(&mut handoff)
    }

    /// Withdraws a producer; an abandoned sentinel reopens the queue.
    fn abandon_put(&self, waiter: &Arc<Waiter>) {
        let mut state = self.state.lock();

        if let Some(position) = state
            .producers
            .iter()
            .position(|(queued, _)| Arc::ptr_eq(queued, waiter))
        {
            if let Some((_, Slot::Sentinel)) = state.producers.remove(position) {
                state.closed = false;
            }
        }
    }

    /// Withdraws a consumer, passing on an entry it was promised.
    fn abandon_get(&self, waiter: &Arc<Waiter>) {
        let mut handoff = Handoff::default();
        let mut state = self.state.lock();

        if !state.consumers.remove(waiter) && waiter.is_granted() {
            state.reserved -= 1;
            state.wake_consumer(&mut handoff);
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("BoundedQueue")
            .field("maxsize", &self.maxsize)
            .field("entries", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Future returned by [`BoundedQueue::put`] and [`BoundedQueue::close`].
pub struct Put<'a, T> {
    queue: &'a BoundedQueue<T>,
    slot: Option<Slot<T>>,
    waiter: Option<Arc<Waiter>>,
}

// The slot is never structurally pinned.
impl<T> Unpin for Put<'_, T> {}

impl<T> Future for Put<'_, T> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let queue = self.queue;

        if let Some(waiter) = &self.waiter {
            if waiter.is_granted() {
                self.waiter = None;
                return Poll::Ready(Ok(()));
            }

            waiter.refresh(cx.waker());
        } else {
            let Some(slot) = self.slot.take() else {
                return Poll::Ready(Err(Error::InvalidState("put polled after completion")));
            };

            match queue.start_put(slot, || Waiter::task(cx.waker())) {
                Start::Done(outcome) => return Poll::Ready(outcome),
                Start::Queued(waiter) => self.waiter = Some(waiter),
            }
        }

        context::suspend_on(WaitKey::Primitive(queue.id));
        Poll::Pending
    }
}

impl<T> Drop for Put<'_, T> {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            self.queue.abandon_put(&waiter);
        }
    }
}

/// Future returned by [`BoundedQueue::get`].
pub struct Get<'a, T> {
    queue: &'a BoundedQueue<T>,
    waiter: Option<Arc<Waiter>>,
}

impl<T> Future for Get<'_, T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let queue = self.queue;

        if let Some(waiter) = &self.waiter {
            if waiter.is_granted() {
                self.waiter = None;
                return Poll::Ready(queue.finish_get());
            }

            waiter.refresh(cx.waker());
        } else {
            match queue.start_get(|| Waiter::task(cx.waker())) {
                Start::Done(outcome) => return Poll::Ready(outcome),
                Start::Queued(waiter) => self.waiter = Some(waiter),
            }
        }

        context::suspend_on(WaitKey::Primitive(queue.id));
        Poll::Pending
    }
}

impl<T> Drop for Get<'_, T> {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            self.queue.abandon_get(&waiter);
        }
    }
}
