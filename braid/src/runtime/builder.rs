use super::Runtime;
use crate::error::Result;
use crate::promise::CompletionMode;

use std::thread;
use std::time::Duration;

/// Settings a runtime is built with.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    /// Size of the default thread pool behind `spawn_blocking`.
    pub(crate) blocking_threads: usize,

    /// Completion mode of result cells created inside the runtime.
    pub(crate) completion_mode: CompletionMode,

    /// Polls running longer than this are reported.
    pub(crate) slow_poll_threshold: Duration,
}

/// Builder for configuring and creating a runtime.
///
/// `RuntimeBuilder` allows customizing runtime parameters before
/// constructing the runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .blocking_threads(4)
///     .completion_mode(CompletionMode::Strict)
///     .build();
/// ```
pub struct RuntimeBuilder {
    config: Config,
}

impl RuntimeBuilder {
    /// Creates a new `RuntimeBuilder` with default configuration.
    ///
    /// By default, the blocking pool has one thread per logical CPU,
    /// falling back to `1` if unavailable, result cells are lenient and
    /// polls over 100ms are reported.
    pub fn new() -> Self {
        let blocking_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            config: Config {
                blocking_threads,
                completion_mode: CompletionMode::Lenient,
                slow_poll_threshold: Duration::from_millis(100),
            },
        }
    }

    /// Sets the number of threads of the pool used by
    /// [`spawn_blocking`](crate::task::spawn_blocking).
    ///
    /// The pool is only started on first use.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn blocking_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "blocking_threads must be > 0");

        self.config.blocking_threads = n;
        self
    }

    /// Sets what a second terminal transition of a result cell does.
    pub fn completion_mode(mut self, mode: CompletionMode) -> Self {
        self.config.completion_mode = mode;
        self
    }

    /// Sets the duration above which a single task poll is reported as
    /// monopolizing the control thread.
    pub fn slow_poll_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_poll_threshold = threshold;
        self
    }

    /// Builds the runtime with the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the driver cannot be created. Use
    /// [`try_build`](Self::try_build) to handle that case.
    pub fn build(self) -> Runtime {
        match self.try_build() {
            Ok(runtime) => runtime,
            Err(err) => panic!("failed to build runtime: {err}"),
        }
    }

    /// Builds the runtime, reporting driver creation failures.
    pub fn try_build(self) -> Result<Runtime> {
        Runtime::new(self.config)
    }
}

impl Default for RuntimeBuilder {
    /// Creates a default `RuntimeBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
