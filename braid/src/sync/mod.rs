//! Synchronization primitives for Braid.
//!
//! Every primitive here is *dual-domain*: tasks on the runtime thread use
//! the async operations, which suspend the task instead of blocking the
//! thread, while pool worker threads use the `*_blocking` variants. Both
//! kinds of waiter share one FIFO queue per primitive, and a release
//! hands the resource directly to the oldest waiter.
//!
//! The primitives are:
//! - [`Semaphore`] bounds concurrent access to a resource.
//! - [`Event`] is a one-shot broadcast flag.
//! - [`Mutex`] (and [`Lock`], its data-less form) is a non-reentrant lock.
//! - [`ReentrantLock`] may be acquired again by its holder.
//! - [`Condvar`] waits for a condition under a [`Mutex`].
//! - [`BoundedQueue`] is a FIFO with backpressure and in-band shutdown.
//! - [`LockOrder`] ranks [`OrderedMutex`]es to reject inverted acquisition.
//!
//! Blocking variants panic when called from inside a running task: a
//! blocked runtime thread would stall every other task.

mod condvar;
mod event;
mod mutex;
mod order;
mod queue;
mod reentrant;
mod semaphore;
mod waiter;

pub use condvar::Condvar;
pub use event::{Event, Wait};
pub use mutex::{Lock, LockFuture, Mutex, MutexGuard};
pub use order::{LockOrder, OrderedMutex, OrderedMutexGuard};
pub use queue::{BoundedQueue, Get, Put, TryPutError};
pub use reentrant::{ReentrantLock, ReentrantLockFuture, ReentrantLockGuard};
pub use semaphore::{Acquire, Permit, Semaphore};
