//! Error taxonomy shared by the whole runtime.
//!
//! Every failure that crosses a suspension point travels as an [`Error`]
//! inside a rejected [`Promise`](crate::promise::Promise) and is re-raised
//! at the awaiting point.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the runtime, its primitives and its worker pools.
#[derive(Debug, Error)]
pub enum Error {
    /// A guarded operation exceeded its deadline and was cancelled.
    #[error("operation timed out")]
    Timeout,

    /// The task or promise was cancelled before it produced a value.
    #[error("operation was cancelled")]
    Cancelled,

    /// The queue observed its shutdown sentinel.
    #[error("queue is closed")]
    QueueClosed,

    /// A pool worker died or panicked while executing a job.
    #[error("worker {worker} crashed: {reason}")]
    WorkerCrashed { worker: usize, reason: String },

    /// A ranked lock was requested while a higher-ranked lock is held.
    #[error(
        "lock order violation: `{requested}` (rank {rank}) requested while holding `{held}` (rank {held_rank})"
    )]
    LockOrderViolation {
        requested: &'static str,
        rank: u32,
        held: &'static str,
        held_rank: u32,
    },

    /// A recoverable I/O failure, eligible for a bounded retry.
    #[error("transient I/O failure: {0}")]
    IoTransient(#[source] io::Error),

    /// A non-recoverable I/O failure.
    #[error("I/O failure: {0}")]
    Io(#[source] io::Error),

    /// A result cell was completed twice (strict mode) or collected twice.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The job's own error, boxed so the caller can downcast it.
    #[error("job failed: {0}")]
    Job(#[source] Box<dyn StdError + Send + Sync>),

    /// The task's future panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The pool no longer accepts jobs.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// The lock name was not declared in the [`LockOrder`](crate::sync::LockOrder).
    #[error("lock `{0}` is not part of the lock order")]
    UnknownLock(&'static str),

    /// A process-pool payload could not be encoded or decoded.
    #[error("job codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::IoTransient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the job's original error, if this is a job failure.
    pub fn job_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Error::Job(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Builds a job failure from anything convertible into a boxed error.
    pub fn job<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error::Job(err.into())
    }
}

impl From<io::Error> for Error {
    /// Classifies an I/O error as transient or fatal.
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Error::IoTransient(err),
            _ => Error::Io(err),
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let transient = Error::from(io::Error::from(io::ErrorKind::TimedOut));
        assert!(transient.is_transient());

        let fatal = Error::from(io::Error::from(io::ErrorKind::NotFound));
        assert!(!fatal.is_transient());
        assert!(matches!(fatal, Error::Io(_)));
    }

    #[test]
    fn job_error_keeps_the_original() {
        let err = Error::job(io::Error::other("disk on fire"));
        let inner = err.job_error().expect("job error");
        let io = inner.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(io.to_string(), "disk on fire");
    }
}
