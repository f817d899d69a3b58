use crate::runtime::context;
use crate::runtime::scheduler::WaitKey;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Suspends the current task once, behind every task already ready.
///
/// The task is filed under the yield wait key and re-queued at the tail of
/// the ready queue, so a loop that yields on each iteration shares the
/// control thread fairly with its peers.
///
/// ```rust,ignore
/// for chunk in input.chunks(4096) {
///     digest.update(chunk);
///     yield_now().await;
/// }
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        context::suspend_on(WaitKey::Yield);

        Poll::Pending
    }
}
