use crate::runtime::context;
use crate::runtime::scheduler::{TimerId, WaitKey};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// The returned sleep future registers a timer with the current
/// runtime's scheduler and completes once the duration has elapsed.
///
/// # Panics
///
/// Panics if polled outside of a running runtime.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(Instant::now() + duration)
}

/// Creates a future that completes at `deadline`.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep::new(deadline)
}

/// A future that completes once a specific deadline is reached.
///
/// `Sleep` registers a timer entry on first poll and suspends its task
/// on it. The entry is cancelled if the future is dropped before
/// completion, so an abandoned sleep never wakes anyone.
#[derive(Debug)]
pub struct Sleep {
    /// Absolute point in time when the sleep completes.
    deadline: Instant,

    /// Timer entry, once registered.
    timer: Option<TimerId>,
}

impl Sleep {
    fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            timer: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.is_elapsed() {
            if let Some(timer) = this.timer.take() {
                context::with_scheduler(|scheduler| scheduler.cancel_timer(timer));
            }
            return Poll::Ready(());
        }

        let deadline = this.deadline;
        let timer = *this.timer.get_or_insert_with(|| {
            context::expect_scheduler("Sleep", |scheduler| scheduler.register_timer(deadline))
        });

        context::suspend_on(WaitKey::Timer(timer));
        Poll::Pending
    }
}

impl Drop for Sleep {
    /// Cancels the timer entry of an unfinished sleep.
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            context::with_scheduler(|scheduler| scheduler.cancel_timer(timer));
        }
    }
}
