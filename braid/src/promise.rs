//! Single-assignment result cells.
//!
//! A cell is created as a pair: the [`Resolver`] publishes exactly one
//! terminal outcome, possibly from a worker thread, and the [`Promise`]
//! collects it once, either by awaiting it inside a task or by blocking
//! a thread with [`Promise::wait_blocking`].
//!
//! ```rust,ignore
//! let (promise, resolver) = Promise::new();
//!
//! std::thread::spawn(move || resolver.resolve(42));
//!
//! assert_eq!(promise.await?, 42);
//! ```

use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::scheduler::{WaitKey, next_object_id};

use parking_lot::Mutex;

use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// What happens when a cell that already completed is completed again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletionMode {
    /// Later transitions are silently ignored.
    #[default]
    Lenient,

    /// Later transitions fail with [`Error::InvalidState`].
    Strict,
}

/// The terminal state a cell reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Resolved,
    Rejected,
    Cancelled,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Completion::Resolved => "resolved",
            Completion::Rejected => "rejected",
            Completion::Cancelled => "cancelled",
        };

        f.write_str(name)
    }
}

enum Outcome<T> {
    Pending,
    Resolved(T),
    Rejected(Error),
    Cancelled,
    /// The outcome was handed to the consumer.
    Collected(Completion),
}

impl<T> Outcome<T> {
    fn completion(&self) -> Option<Completion> {
        match self {
            Outcome::Pending => None,
            Outcome::Resolved(_) => Some(Completion::Resolved),
            Outcome::Rejected(_) => Some(Completion::Rejected),
            Outcome::Cancelled => Some(Completion::Cancelled),
            Outcome::Collected(completion) => Some(*completion),
        }
    }
}

/// Parties to notify once the cell completes, in registration order.
enum Notify {
    Task(Waker),
    Thread(Thread),
    Callback(Box<dyn FnOnce() + Send>),
}

impl Notify {
    fn notify(self) {
        match self {
            Notify::Task(waker) => waker.wake(),
            Notify::Thread(thread) => thread.unpark(),
            Notify::Callback(callback) => callback(),
        }
    }
}

struct Inner<T> {
    outcome: Outcome<T>,
    waiters: Vec<Notify>,
}

struct Cell<T> {
    id: u64,
    mode: CompletionMode,
    /// Number of live resolvers.
    producers: AtomicUsize,
    inner: Mutex<Inner<T>>,
}

impl<T> Cell<T> {
    /// Publishes `outcome` if the cell is still pending.
    ///
    /// Waiters are notified after the lock is released.
    fn complete(&self, outcome: Outcome<T>, mode: CompletionMode) -> Result<()> {
        let waiters = {
            let mut inner = self.inner.lock();

            if !matches!(inner.outcome, Outcome::Pending) {
                return match mode {
                    CompletionMode::Lenient => Ok(()),
                    CompletionMode::Strict => Err(Error::InvalidState("promise already completed")),
                };
            }

            inner.outcome = outcome;
            mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            waiter.notify();
        }

        Ok(())
    }

    /// Hands the outcome to the consumer, or `None` while pending.
    fn take(&self) -> Option<Result<T>> {
        let mut inner = self.inner.lock();
        let completion = inner.outcome.completion()?;

        let outcome = mem::replace(&mut inner.outcome, Outcome::Collected(completion));

        Some(match outcome {
            Outcome::Resolved(value) => Ok(value),
            Outcome::Rejected(error) => Err(error),
            Outcome::Cancelled => Err(Error::Cancelled),
            Outcome::Pending | Outcome::Collected(_) => {
                Err(Error::InvalidState("promise result already collected"))
            }
        })
    }

    fn completion(&self) -> Option<Completion> {
        self.inner.lock().outcome.completion()
    }
}

/// Consumer side of a result cell.
///
/// Awaiting a `Promise` suspends the task until the cell completes and
/// yields the outcome: the value, the rejection error, or
/// [`Error::Cancelled`]. Dropping it only detaches the consumer.
pub struct Promise<T> {
    cell: Arc<Cell<T>>,
}

/// Producer side of a result cell.
///
/// Resolvers can be cloned and sent to other threads; the first
/// terminal transition wins. When the last resolver is dropped while
/// the cell is still pending, the cell is cancelled so that the
/// consumer never waits forever.
pub struct Resolver<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Promise<T> {
    /// Creates a pending cell.
    ///
    /// Inside a runtime the cell uses the runtime's completion mode,
    /// elsewhere [`CompletionMode::Lenient`].
    pub fn new() -> (Promise<T>, Resolver<T>) {
        let mode = context::with_scheduler(|scheduler| scheduler.completion_mode()).unwrap_or_default();

        Self::with_mode(mode)
    }

    /// Creates a pending cell with an explicit completion mode.
    pub fn with_mode(mode: CompletionMode) -> (Promise<T>, Resolver<T>) {
        let cell = Arc::new(Cell {
            id: next_object_id(),
            mode,
            producers: AtomicUsize::new(1),
            inner: Mutex::new(Inner {
                outcome: Outcome::Pending,
                waiters: Vec::new(),
            }),
        });

        (Promise { cell: cell.clone() }, Resolver { cell })
    }

    /// Returns the terminal state, or `None` while pending.
    pub fn completion(&self) -> Option<Completion> {
        self.cell.completion()
    }

    pub fn is_complete(&self) -> bool {
        self.completion().is_some()
    }

    /// Cancels the cell from the consumer side.
    ///
    /// Returns `false` if the cell had already completed; a later
    /// publish by the producer is then discarded.
    pub fn cancel(&self) -> bool {
        let was_pending = !self.is_complete();
        let _ = self.cell.complete(Outcome::Cancelled, CompletionMode::Lenient);

        was_pending && self.completion() == Some(Completion::Cancelled)
    }

    /// Collects the outcome without waiting.
    pub fn try_take(&self) -> Option<Result<T>> {
        self.cell.take()
    }

    /// Blocks the calling thread until the cell completes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn wait_blocking(self) -> Result<T> {
        context::assert_not_cooperative("Promise::wait_blocking");

        let mut registered = false;

        loop {
            {
                let mut inner = self.cell.inner.lock();

                if matches!(inner.outcome, Outcome::Pending) {
                    if !registered {
                        inner.waiters.push(Notify::Thread(thread::current()));
                        registered = true;
                    }
                } else {
                    drop(inner);

                    return match self.cell.take() {
                        Some(outcome) => outcome,
                        None => Err(Error::InvalidState("promise result already collected")),
                    };
                }
            }

            thread::park();
        }
    }
}

impl<T: Send + 'static> Promise<T> {
    /// Runs `callback` with the outcome once the cell completes.
    ///
    /// The callback runs on the thread that completes the cell, or
    /// immediately if it already completed.
    pub fn on_complete(self, callback: impl FnOnce(Result<T>) + Send + 'static) {
        let cell = self.cell.clone();
        let deliver = move || {
            if let Some(outcome) = cell.take() {
                callback(outcome);
            }
        };

        let mut inner = self.cell.inner.lock();

        if matches!(inner.outcome, Outcome::Pending) {
            inner.waiters.push(Notify::Callback(Box::new(deliver)));
        } else {
            drop(inner);
            deliver();
        }
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T>;

    /// Registers the task's waker before reporting `Pending`, so a
    /// publish racing with this poll is never missed.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.cell.inner.lock();

        if !matches!(inner.outcome, Outcome::Pending) {
            drop(inner);

            return match self.cell.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => Poll::Ready(Err(Error::InvalidState("promise result already collected"))),
            };
        }

        let registered = inner
            .waiters
            .iter()
            .any(|waiter| matches!(waiter, Notify::Task(waker) if waker.will_wake(cx.waker())));

        if !registered {
            inner.waiters.push(Notify::Task(cx.waker().clone()));
        }

        drop(inner);
        context::suspend_on(WaitKey::Promise(self.cell.id));

        Poll::Pending
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.cell.id)
            .field("completion", &self.completion())
            .finish()
    }
}

impl<T> Resolver<T> {
    /// Publishes a value.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.cell.complete(Outcome::Resolved(value), self.cell.mode)
    }

    /// Publishes an error.
    pub fn reject(&self, error: Error) -> Result<()> {
        self.cell.complete(Outcome::Rejected(error), self.cell.mode)
    }

    /// Publishes a cancellation.
    pub fn cancel(&self) -> Result<()> {
        self.cell.complete(Outcome::Cancelled, self.cell.mode)
    }

    pub fn is_complete(&self) -> bool {
        self.cell.completion().is_some()
    }

    /// Returns `true` if the consumer cancelled the cell.
    pub fn is_cancelled(&self) -> bool {
        self.cell.completion() == Some(Completion::Cancelled)
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        self.cell.producers.fetch_add(1, Ordering::Relaxed);

        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.cell.producers.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.cell.complete(Outcome::Cancelled, CompletionMode::Lenient);
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("id", &self.cell.id)
            .finish()
    }
}

/// Type-erased terminal transitions, used by the scheduler to settle a
/// task's cell without knowing its output type.
pub(crate) trait Settle {
    fn cancel(&self);

    fn fail(&self, error: Error);
}

impl<T> Settle for Resolver<T> {
    fn cancel(&self) {
        let _ = self.cell.complete(Outcome::Cancelled, CompletionMode::Lenient);
    }

    fn fail(&self, error: Error) {
        let _ = self.cell.complete(Outcome::Rejected(error), CompletionMode::Lenient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn first_transition_wins() {
        let (promise, resolver) = Promise::with_mode(CompletionMode::Lenient);

        resolver.resolve(1).unwrap();
        resolver.resolve(2).unwrap();
        resolver.cancel().unwrap();

        assert_eq!(promise.completion(), Some(Completion::Resolved));
        assert_eq!(promise.try_take().unwrap().unwrap(), 1);
    }

    #[test]
    fn strict_mode_rejects_second_transition() {
        let (_promise, resolver) = Promise::with_mode(CompletionMode::Strict);

        resolver.reject(Error::Timeout).unwrap();

        assert!(matches!(resolver.resolve(5), Err(Error::InvalidState(_))));
        assert!(matches!(resolver.cancel(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn second_collection_is_invalid() {
        let (promise, resolver) = Promise::with_mode(CompletionMode::Lenient);
        resolver.resolve("done").unwrap();

        assert_eq!(promise.try_take().unwrap().unwrap(), "done");
        assert!(matches!(promise.try_take(), Some(Err(Error::InvalidState(_)))));
    }

    #[test]
    fn dropping_every_resolver_cancels() {
        let (promise, resolver) = Promise::<u8>::with_mode(CompletionMode::Lenient);
        let other = resolver.clone();

        drop(resolver);
        assert!(!promise.is_complete());

        drop(other);
        assert!(matches!(promise.try_take(), Some(Err(Error::Cancelled))));
    }

    #[test]
    fn consumer_cancel_discards_late_publish() {
        let (promise, resolver) = Promise::with_mode(CompletionMode::Lenient);

        assert!(promise.cancel());
        assert!(resolver.is_cancelled());
        resolver.resolve(3).unwrap();

        assert!(matches!(promise.try_take(), Some(Err(Error::Cancelled))));
    }

    #[test]
    fn wait_blocking_sees_a_cross_thread_publish() {
        let (promise, resolver) = Promise::with_mode(CompletionMode::Lenient);

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(7u32).unwrap();
        });

        assert_eq!(promise.wait_blocking().unwrap(), 7);
        worker.join().unwrap();
    }

    #[test]
    fn callbacks_receive_the_outcome() {
        let (promise, resolver) = Promise::with_mode(CompletionMode::Lenient);
        let (tx, rx) = mpsc::channel();

        promise.on_complete(move |outcome| tx.send(outcome.map_err(|e| e.to_string())).unwrap());
        resolver.reject(Error::QueueClosed).unwrap();

        let delivered: std::result::Result<u8, String> = rx.recv().unwrap();
        assert_eq!(delivered.unwrap_err(), Error::QueueClosed.to_string());
    }
}
