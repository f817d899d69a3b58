//! Batch combinators over homogeneous collections of futures.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

enum Slot<F: Future> {
    Pending(Pin<Box<F>>),
    Done(F::Output),
    Taken,
}

/// Waits for every future and returns the outputs in submission order.
///
/// Completion order does not matter: `await_all([f0, f1, f2])` yields
/// `[r0, r1, r2]` even if `f2` finishes first.
///
/// # Examples
///
/// ```rust,ignore
/// let handles: Vec<_> = (0..3).map(|i| task::spawn(work(i))).collect();
/// let results = task::await_all(handles).await;
/// ```
pub fn await_all<F: Future>(futures: impl IntoIterator<Item = F>) -> AwaitAll<F> {
    AwaitAll {
        slots: futures
            .into_iter()
            .map(|future| Slot::Pending(Box::pin(future)))
            .collect(),
    }
}

/// Future returned by [`await_all`].
pub struct AwaitAll<F: Future> {
    slots: Vec<Slot<F>>,
}

// Futures are boxed and outputs are never pinned.
impl<F: Future> Unpin for AwaitAll<F> {}

impl<F: Future> Future for AwaitAll<F> {
    type Output = Vec<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut pending = false;

        for slot in &mut this.slots {
            if let Slot::Pending(future) = slot {
                match future.as_mut().poll(cx) {
                    Poll::Ready(output) => *slot = Slot::Done(output),
                    Poll::Pending => pending = true,
                }
            }
        }

        if pending {
            return Poll::Pending;
        }

        let outputs = this
            .slots
            .iter_mut()
            .filter_map(|slot| match std::mem::replace(slot, Slot::Taken) {
                Slot::Done(output) => Some(output),
                _ => None,
            })
            .collect();

        Poll::Ready(outputs)
    }
}

/// Like [`await_all`] for fallible futures, failing fast.
///
/// Resolves to the first error observed, scanning in submission order;
/// the remaining futures are dropped.
pub fn try_await_all<F, T, E>(futures: impl IntoIterator<Item = F>) -> TryAwaitAll<F>
where
    F: Future<Output = Result<T, E>>,
{
    TryAwaitAll {
        inner: await_all(futures),
    }
}

/// Future returned by [`try_await_all`].
pub struct TryAwaitAll<F: Future> {
    inner: AwaitAll<F>,
}

impl<F, T, E> Future for TryAwaitAll<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<Vec<T>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let slots = &mut self.get_mut().inner.slots;
        let mut pending = false;
        let mut failure = None;

        for slot in slots.iter_mut() {
            if let Slot::Pending(future) = slot {
                match future.as_mut().poll(cx) {
                    Poll::Ready(Err(err)) => {
                        failure = Some(err);
                        break;
                    }
                    Poll::Ready(output) => *slot = Slot::Done(output),
                    Poll::Pending => pending = true,
                }
            }
        }

        if let Some(err) = failure {
            slots.clear();
            return Poll::Ready(Err(err));
        }

        if pending {
            return Poll::Pending;
        }

        let mut values = Vec::with_capacity(slots.len());
        for slot in slots.iter_mut() {
            if let Slot::Done(Ok(value)) = std::mem::replace(slot, Slot::Taken) {
                values.push(value);
            }
        }

        Poll::Ready(Ok(values))
    }
}

/// A future left in flight by [`await_first`].
pub struct Pending<F> {
    /// Position of the future in the submitted collection.
    pub index: usize,

    pub future: Pin<Box<F>>,
}

impl<F: Unpin> Pending<F> {
    pub fn into_inner(self) -> F {
        *Pin::into_inner(self.future)
    }
}

impl<F> fmt::Debug for Pending<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("index", &self.index).finish()
    }
}

/// The winner of [`await_first`], along with the losers.
pub struct First<F: Future> {
    /// Position of the winner in the submitted collection.
    pub index: usize,

    pub output: F::Output,

    /// The futures still in flight, in submission order. The caller is
    /// responsible for cancelling and draining them.
    pub pending: Vec<Pending<F>>,
}

/// Waits until one future completes.
///
/// Nothing is cancelled: the other futures are handed back in
/// [`First::pending`]. For join handles, [`cancel_all`](super::cancel_all)
/// cancels and drains them.
///
/// # Panics
///
/// Panics if `futures` is empty.
pub fn await_first<F: Future>(futures: impl IntoIterator<Item = F>) -> AwaitFirst<F> {
    let pending: Vec<Pending<F>> = futures
        .into_iter()
        .enumerate()
        .map(|(index, future)| Pending {
            index,
            future: Box::pin(future),
        })
        .collect();

    assert!(!pending.is_empty(), "await_first requires at least one future");

    AwaitFirst { pending }
}

/// Future returned by [`await_first`].
pub struct AwaitFirst<F> {
    pending: Vec<Pending<F>>,
}

impl<F: Future> Future for AwaitFirst<F> {
    type Output = First<F>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        for position in 0..this.pending.len() {
            if let Poll::Ready(output) = this.pending[position].future.as_mut().poll(cx) {
                let winner = this.pending.remove(position);

                return Poll::Ready(First {
                    index: winner.index,
                    output,
                    pending: std::mem::take(&mut this.pending),
                });
            }
        }

        Poll::Pending
    }
}
