//! Retry utilities for asynchronous operations.
//!
//! [`retry`] re-runs a fallible operation produced by a factory closure
//! until it succeeds, a bounded number of attempts is exhausted, or an
//! error is not worth retrying. [`Backoff`] spaces the attempts out.

mod retry;

#[doc(inline)]
pub use retry::{Backoff, Retry, retry};
