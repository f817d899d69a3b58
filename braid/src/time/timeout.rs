use crate::error::{Error, Result};
use crate::time::sleep::{Sleep, sleep};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Bounds `future` by `duration`.
///
/// Resolves to the future's output, or to [`Error::Timeout`] once the
/// deadline passes first. Dropping the returned future drops the
/// guarded one, releasing whatever it was waiting on.
///
/// # Examples
///
/// ```rust,ignore
/// match with_timeout(Duration::from_secs(1), queue.get()).await {
///     Ok(item) => handle(item?),
///     Err(Error::Timeout) => retry_later(),
///     Err(err) => return Err(err),
/// }
/// ```
pub fn with_timeout<F>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout::new(duration, future)
}

/// Future returned by [`with_timeout`].
pub struct Timeout<F> {
    future: F,
    sleep: Sleep,
}

impl<F> Timeout<F> {
    pub(crate) fn new(duration: Duration, future: F) -> Self {
        Timeout {
            future,
            sleep: sleep(duration),
        }
    }

    /// Releases the guarded future.
    pub fn into_inner(self) -> F {
        self.future
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output>;

    /// Polls the guarded future first, so a result that is ready at the
    /// deadline still wins.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: `future` is never moved out while pinned; `sleep` is Unpin.
        let this = unsafe { self.get_unchecked_mut() };

        let future = unsafe { Pin::new_unchecked(&mut this.future) };
        if let Poll::Ready(output) = future.poll(cx) {
            return Poll::Ready(Ok(output));
        }

        if let Poll::Ready(()) = Pin::new(&mut this.sleep).poll(cx) {
            return Poll::Ready(Err(Error::Timeout));
        }

        Poll::Pending
    }
}
