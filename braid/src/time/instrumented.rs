use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tracing::debug;

/// Measures how long `future` takes, from its first poll to completion.
///
/// Resolves to the output paired with the elapsed time. Time spent
/// suspended counts, so this measures latency rather than CPU time.
///
/// # Examples
///
/// ```rust,ignore
/// let (primes, elapsed) = instrumented(pool.submit(CountPrimes { limit })).await;
/// ```
pub fn instrumented<F>(future: F) -> Instrumented<F> {
    Instrumented {
        future,
        started: None,
        label: None,
    }
}

/// Future returned by [`instrumented`].
pub struct Instrumented<F> {
    future: F,
    started: Option<Instant>,
    label: Option<&'static str>,
}

impl<F> Instrumented<F> {
    /// Also reports the measurement as a `tracing` event under `label`.
    pub fn named(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}

impl<F: Future> Future for Instrumented<F> {
    type Output = (F::Output, Duration);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: `future` is never moved out while pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let started = *this.started.get_or_insert_with(Instant::now);

        let Poll::Ready(output) = unsafe { Pin::new_unchecked(&mut this.future) }.poll(cx) else {
            return Poll::Pending;
        };

        let elapsed = started.elapsed();
        if let Some(label) = this.label {
            debug!(label, ?elapsed, "instrumented future completed");
        }

        Poll::Ready((output, elapsed))
    }
}
