//! The wait multiplexer behind the scheduler's poll step.
//!
//! The driver blocks the control thread in `poll(2)` until one of three
//! things happens:
//! - a registered descriptor becomes ready,
//! - the next timer deadline passes,
//! - another thread writes to the wake pipe.

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, c_void, nfds_t, pollfd};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Readiness a task can wait for on a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn events(self) -> i16 {
        match self {
            Interest::Readable => POLLIN,
            Interest::Writable => POLLOUT,
        }
    }
}

/// Write end of the wake pipe.
///
/// Held by every waker through the runtime's inbox, so it may outlive
/// the driver; once the driver is gone, unparking does nothing.
pub(crate) struct Unparker {
    fd: OwnedFd,
    closed: AtomicBool,
}

impl Unparker {
    /// Interrupts a blocked [`Driver::poll`].
    pub(crate) fn unpark(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let byte = 1u8;

        // A full pipe already guarantees a wakeup.
        unsafe {
            libc::write(self.fd.as_raw_fd(), &byte as *const u8 as *const c_void, 1);
        }
    }
}

/// `poll(2)`-based driver owned by one scheduler.
pub(crate) struct Driver {
    /// Read end of the wake pipe.
    wake: OwnedFd,

    unparker: Arc<Unparker>,

    /// Reusable descriptor buffer.
    fds: Vec<pollfd>,
}

impl Driver {
    pub(crate) fn new() -> io::Result<Self> {
        let mut ends = [0 as RawFd; 2];

        if unsafe { libc::pipe(ends.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let (read, write) = unsafe { (OwnedFd::from_raw_fd(ends[0]), OwnedFd::from_raw_fd(ends[1])) };

        for fd in [&read, &write] {
            configure(fd.as_raw_fd())?;
        }

        Ok(Self {
            wake: read,
            unparker: Arc::new(Unparker {
                fd: write,
                closed: AtomicBool::new(false),
            }),
            fds: Vec::with_capacity(16),
        })
    }

    pub(crate) fn unparker(&self) -> Arc<Unparker> {
        self.unparker.clone()
    }

    /// Blocks until a registered interest is ready, `timeout` elapses or
    /// the driver is unparked.
    ///
    /// Returns the interests that became ready. `None` waits forever.
    pub(crate) fn poll(
        &mut self,
        interests: &[(RawFd, Interest)],
        timeout: Option<Duration>,
    ) -> io::Result<Vec<(RawFd, Interest)>> {
        self.fds.clear();
        self.fds.push(pollfd {
            fd: self.wake.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        });

        for (fd, interest) in interests {
            self.fds.push(pollfd {
                fd: *fd,
                events: interest.events(),
                revents: 0,
            });
        }

        let timeout = match timeout {
            None => -1,
            Some(duration) => duration.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32,
        };

        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as nfds_t, timeout) };

        if rc < 0 {
            let err = io::Error::last_os_error();

            return match err.kind() {
                io::ErrorKind::Interrupted => Ok(Vec::new()),
                _ => Err(err),
            };
        }

        if self.fds[0].revents & POLLIN != 0 {
            self.drain_wake_pipe();
        }

        let ready = interests
            .iter()
            .zip(&self.fds[1..])
            .filter(|(_, polled)| polled.revents & (polled.events | POLLERR | POLLHUP | POLLNVAL) != 0)
            .map(|(interest, _)| *interest)
            .collect();

        Ok(ready)
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 64];

        loop {
            let n = unsafe {
                libc::read(
                    self.wake.as_raw_fd(),
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len(),
                )
            };

            if n <= 0 {
                break;
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.unparker.closed.store(true, Ordering::Release);
    }
}

/// Returns `true` if `fd` is ready for `interest` right now.
pub(crate) fn poll_ready(fd: RawFd, interest: Interest) -> io::Result<bool> {
    let mut polled = pollfd {
        fd,
        events: interest.events(),
        revents: 0,
    };

    loop {
        let rc = unsafe { libc::poll(&mut polled, 1, 0) };

        if rc >= 0 {
            break;
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    if polled.revents & POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }

    Ok(polled.revents & (polled.events | POLLERR | POLLHUP) != 0)
}

/// Makes a pipe end non-blocking and close-on-exec.
fn configure(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }

        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}
