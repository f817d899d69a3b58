use crate::error::Error;
use crate::time::{Sleep, sleep};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

/// Delay inserted between two attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Retry right away.
    #[default]
    None,

    /// Wait the same duration before every retry.
    Fixed(Duration),

    /// Double the delay after every retry, starting at `base`, never
    /// exceeding `cap`.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed(delay)
    }

    pub fn exponential(base: Duration, cap: Duration) -> Self {
        Backoff::Exponential { base, cap }
    }

    /// Delay before retry number `retry`, counting from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(cap).min(cap)
            }
        }
    }
}

/// Retries the operation produced by `factory` until it succeeds.
///
/// At most `max_attempts` attempts are made, the first one included; a
/// limit of `0` behaves like `1`. The last error is returned once the
/// attempts are exhausted or an error is not worth retrying.
///
/// # Examples
///
/// ```rust,ignore
/// let body = retry(5, || fetch(&url))
///     .backoff(Backoff::exponential(Duration::from_millis(10), Duration::from_secs(1)))
///     .transient_only()
///     .await?;
/// ```
pub fn retry<G, F, T, E>(max_attempts: usize, factory: G) -> Retry<G, F, E>
where
    G: FnMut() -> F,
    F: Future<Output = Result<T, E>>,
{
    Retry {
        factory,
        future: None,
        delay: None,
        attempts: 0,
        max_attempts: max_attempts.max(1),
        backoff: Backoff::None,
        retry_if: Box::new(|_| true),
    }
}

/// Future returned by [`retry`].
pub struct Retry<G, F, E> {
    factory: G,
    future: Option<Pin<Box<F>>>,
    delay: Option<Sleep>,

    /// Attempts started so far.
    attempts: usize,
    max_attempts: usize,

    backoff: Backoff,
    retry_if: Box<dyn Fn(&E) -> bool>,
}

impl<G, F, E> Retry<G, F, E> {
    /// Sets the delay between attempts.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Only retries errors for which `predicate` returns `true`.
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + 'static) -> Self {
        self.retry_if = Box::new(predicate);
        self
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl<G, F> Retry<G, F, Error> {
    /// Only retries errors classified as transient.
    pub fn transient_only(self) -> Self {
        self.retry_if(Error::is_transient)
    }
}

impl<G, F, T, E> Future for Retry<G, F, E>
where
    G: FnMut() -> F + Unpin,
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            if let Some(delay) = this.delay.as_mut() {
                if Pin::new(delay).poll(cx).is_pending() {
                    return Poll::Pending;
                }
                this.delay = None;
            }

            let future = match this.future.as_mut() {
                Some(future) => future,
                None => {
                    this.attempts += 1;
                    this.future.insert(Box::pin((this.factory)()))
                }
            };

            let err = match future.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(value)) => {
                    this.future = None;
                    return Poll::Ready(Ok(value));
                }
                Poll::Ready(Err(err)) => err,
            };

            this.future = None;

            if this.attempts >= this.max_attempts || !(this.retry_if)(&err) {
                return Poll::Ready(Err(err));
            }

            let delay = this.backoff.delay(this.attempts as u32);
            debug!(
                attempt = this.attempts,
                max_attempts = this.max_attempts,
                ?delay,
                "attempt failed, retrying"
            );

            if !delay.is_zero() {
                this.delay = Some(sleep(delay));
            }
        }
    }
}

impl<G, F, E> fmt::Debug for Retry<G, F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_up_to_the_cap() {
        let backoff = Backoff::exponential(Duration::from_millis(10), Duration::from_millis(50));

        let delays: Vec<_> = (1..=5).map(|retry| backoff.delay(retry)).collect();

        assert_eq!(
            delays,
            [10, 20, 40, 50, 50].map(Duration::from_millis).to_vec()
        );
        assert_eq!(backoff.delay(200), Duration::from_millis(50));
    }

    #[test]
    fn fixed_and_none_backoffs() {
        assert_eq!(Backoff::fixed(Duration::from_millis(7)).delay(9), Duration::from_millis(7));
        assert_eq!(Backoff::None.delay(1), Duration::ZERO);
    }
}
