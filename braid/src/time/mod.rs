//! Timers and time-bounded execution.
//!
//! This module provides time-related asynchronous utilities that
//! integrate with the runtime's timer heap.
//!
//! It includes:
//! - [`sleep`] and [`sleep_until`] for suspending a task,
//! - [`with_timeout`] for bounding future execution time,
//! - [`instrumented`] for measuring how long a future takes.

mod instrumented;
mod sleep;
mod timeout;

#[doc(inline)]
pub use instrumented::{Instrumented, instrumented};

#[doc(inline)]
pub use sleep::{Sleep, sleep, sleep_until};

#[doc(inline)]
pub use timeout::{Timeout, with_timeout};
