//! Readiness waits on raw descriptors.
//!
//! [`readable`] and [`writable`] suspend the task until the runtime's
//! driver reports the descriptor ready. Readiness is single-shot: the
//! future completes once, and the caller performs its non-blocking read
//! or write afterwards, waiting again on `WouldBlock`.
//!
//! ```rust,ignore
//! let (mut reader, writer) = UnixStream::pair()?;
//! reader.set_nonblocking(true)?;
//!
//! io::readable(&reader).await?;
//! let n = reader.read(&mut buf)?;
//! ```

use crate::error::Result;
use crate::runtime::context;
use crate::runtime::driver::{Interest, poll_ready};
use crate::runtime::scheduler::WaitKey;

use std::future::Future;
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Waits until `source` can be read without blocking.
pub fn readable<S: AsRawFd + ?Sized>(source: &S) -> Readiness {
    Readiness {
        fd: source.as_raw_fd(),
        interest: Interest::Readable,
    }
}

/// Waits until `source` can be written without blocking.
pub fn writable<S: AsRawFd + ?Sized>(source: &S) -> Readiness {
    Readiness {
        fd: source.as_raw_fd(),
        interest: Interest::Writable,
    }
}

/// Future returned by [`readable`] and [`writable`].
///
/// Fails if the descriptor is invalid. Hang-ups and errors count as
/// readiness: the following read or write reports them.
#[derive(Debug)]
pub struct Readiness {
    fd: RawFd,
    interest: Interest,
}

impl Future for Readiness {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match poll_ready(self.fd, self.interest) {
            Ok(true) => return Poll::Ready(Ok(())),
            Ok(false) => {}
            Err(err) => return Poll::Ready(Err(err.into())),
        }

        context::expect_scheduler("io readiness", |_| ());
        context::suspend_on(WaitKey::Io(self.fd, self.interest));

        Poll::Pending
    }
}
