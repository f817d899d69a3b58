//! Core runtime components.
//!
//! This module contains the fundamental building blocks of the runtime,
//! including task execution, scheduling, and cooperative yielding.
//!
//! It is responsible for:
//! - executing cooperative tasks on a single control thread,
//! - tracking what every suspended task is waiting on,
//! - multiplexing timers, I/O readiness and cross-thread wakeups,
//! - providing the runtime context used by leaf futures.
//!
//! Most users will interact with higher-level APIs built on top of
//! these components rather than using this module directly.

mod core;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod driver;
pub(crate) mod scheduler;
pub(crate) mod yield_now;

pub mod task;

pub use core::Runtime;
