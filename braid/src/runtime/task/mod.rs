//! Task primitives.
//!
//! This module defines how the runtime represents, spawns and observes
//! cooperative tasks.
//!
//! It includes:
//! - the task state machine ([`TaskState`]),
//! - join and cancellation handles,
//! - the batch combinators [`await_all`] and [`await_first`],
//! - [`spawn_blocking`], the offload path to the runtime's thread pool.
//!
//! Most users will interact with this module through [`spawn`] and the
//! [`JoinHandle`]s it returns, while the lower-level components are used
//! internally by the scheduler.

mod batch;
mod core;
mod handle;
mod state;

pub(crate) mod waker;

pub(crate) use core::{Body, Task};

pub use crate::bridge::spawn_blocking;
pub use crate::runtime::yield_now::{YieldNow, yield_now};
pub use batch::{AwaitAll, AwaitFirst, First, Pending, TryAwaitAll, await_all, await_first, try_await_all};
pub use core::{TaskId, current, spawn, state};
pub use handle::{CancelHandle, JoinHandle, cancel_all};
pub use state::TaskState;
