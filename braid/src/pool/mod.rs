//! Worker pools.
//!
//! Pools run work that must not occupy the runtime thread: blocking
//! closures on OS threads ([`ThreadPool`]) and serializable jobs in
//! child processes ([`ProcessPool`]). Both share one worker core: named
//! threads pulling jobs from an unbounded [`BoundedQueue`] until its
//! shutdown sentinel, so shutting a pool down lets queued work finish.
//!
//! Every submission returns a [`PoolFuture`] that tasks await and plain
//! threads wait on with [`PoolFuture::wait_blocking`].
//!
//! Create one pool per phase of a program and share it; a pool per job
//! pays thread or process start-up every time.
//!
//! [`BoundedQueue`]: crate::sync::BoundedQueue
//! [`PoolFuture`]: crate::bridge::PoolFuture
//! [`PoolFuture::wait_blocking`]: crate::bridge::PoolFuture::wait_blocking

mod process;
mod serve;
mod thread;
mod wire;
mod worker;

pub mod jobs;

pub use process::{ProcessPool, ProcessPoolBuilder};
pub use serve::{JobRegistry, ProcessJob, serve, serve_with};
pub use thread::{ThreadPool, ThreadPoolBuilder};
