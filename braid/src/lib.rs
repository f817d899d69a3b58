//! # Braid
//!
//! **Braid** is a hybrid concurrency runtime: cooperative tasks on one
//! control thread, bridged to pools of OS threads and child processes
//! for the work that must not run there.
//!
//! - A **single-threaded scheduler** runs tasks until they suspend, and
//!   tracks exactly what each suspended task waits on: a timer, a
//!   descriptor, a result cell or a synchronization primitive.
//! - **Result cells** ([`promise`]) carry values, errors and cancellation
//!   between threads and tasks.
//! - **Synchronization primitives** ([`sync`]) work from tasks and from
//!   worker threads alike, with FIFO hand-off.
//! - **Worker pools** ([`pool`]) run blocking closures on threads or
//!   serializable jobs in child processes; the [`bridge`] lets a task
//!   await them.
//! - **Timers** ([`time`]), **I/O readiness** ([`io`]) and **retries**
//!   ([`tools`]) round out the toolbox, along with the `#[braid::main]`,
//!   `#[braid::test]`, `join!` and `select!` macros.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use braid::sync::BoundedQueue;
//! use braid::task;
//! use std::rc::Rc;
//!
//! #[braid::main]
//! async fn main() {
//!     let queue = Rc::new(BoundedQueue::new(8));
//!
//!     let producer = task::spawn({
//!         let queue = queue.clone();
//!         async move {
//!             for n in 0..100u64 {
//!                 queue.put(n).await?;
//!             }
//!             queue.close().await
//!         }
//!     });
//!
//!     let mut total = 0;
//!     while let Ok(n) = queue.get().await {
//!         total += task::spawn_blocking(move || n * n).await?;
//!     }
//!
//!     producer.await??;
//!     println!("sum of squares: {total}");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`task`]: Spawning, joining and cancelling tasks
//! - [`promise`]: Single-assignment result cells
//! - [`sync`]: Semaphore, event, locks, condition variable, bounded queue
//! - [`pool`]: Thread and process pools
//! - [`bridge`]: Awaiting pool jobs from tasks
//! - [`time`]: Sleep, timeout and timing
//! - [`io`]: Descriptor readiness
//! - [`tools`]: Retry with backoff

mod runtime;
mod utils;

pub mod bridge;
pub mod error;
pub mod io;
pub mod pool;
pub mod promise;
pub mod sync;
pub mod time;
pub mod tools;

pub use error::{Error, Result};
pub use runtime::Runtime;
pub use runtime::builder::RuntimeBuilder;
pub use runtime::task;
pub use runtime::yield_now::yield_now;

pub use braid_macros::*;
