// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Coalescing wakeup signal over an eventfd or pipe pair.
//!
//! The consumer polls one descriptor. Producers write to it; repeated
//! writes pile onto the same pending state, so however many signals
//! land, the consumer wakes once and clears them with one acknowledge.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use crate::poll::{poll, PollFd};

/// Failure to allocate the descriptors backing a [`Wakeup`].
///
/// Creation is the only fallible operation; signaling, waiting and
/// acknowledging cannot fail.
#[derive(Debug, thiserror::Error)]
#[error("wakeup allocation failed: {source}")]
pub struct WakeupError {
    #[from]
    source: io::Error,
}

/// Platform resource behind a wakeup.
enum Backend {
    /// One eventfd used as a counter. Reading clears it.
    EventFd(RawFd),
    /// Read/write ends of a pipe. One byte per signal, drained on
    /// acknowledge. Used where eventfd is unavailable.
    Pipe { read: RawFd, write: RawFd },
}

/// A coalescing, level-triggered, pollable wakeup signal.
///
/// Any thread may signal it, any number of times; the consumer sees a
/// single pending notification and clears it with one acknowledge.
/// Signaling never blocks and never fails. The state answers "has
/// anything happened since the last acknowledge", never how often.
///
/// Both descriptors are opened close-on-exec and non-blocking.
pub struct Wakeup {
    backend: Backend,
}

impl Wakeup {
    /// Create a wakeup with nothing pending.
    ///
    /// Prefers an eventfd; falls back to a pipe pair on kernels
    /// without eventfd support.
    pub fn new() -> Result<Self, WakeupError> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd >= 0 {
            return Ok(Self {
                backend: Backend::EventFd(fd),
            });
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOSYS) | Some(libc::EINVAL) => Self::pipe(),
            _ => Err(err.into()),
        }
    }

    /// Create a wakeup backed by a pipe pair regardless of eventfd
    /// support.
    ///
    /// `new` falls back to this path on its own; tests call it
    /// directly to cover the fallback backend.
    pub fn pipe() -> Result<Self, WakeupError> {
        let mut fds = [0i32; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(Self {
            backend: Backend::Pipe {
                read: fds[0],
                write: fds[1],
            },
        })
    }

    /// Raise the signal.
    ///
    /// Callable from any thread, the consumer included, concurrently
    /// with any other operation. Never blocks: a full counter or pipe
    /// means a wakeup is already pending, which is all a signal has to
    /// guarantee, so would-block results are swallowed.
    pub fn signal(&self) {
        match self.backend {
            Backend::EventFd(fd) => {
                // eventfd wants a 64-bit increment.
                let one: u64 = 1;
                write_retry(fd, &one.to_ne_bytes());
            }
            Backend::Pipe { write, .. } => {
                // One byte of any value.
                write_retry(write, &[1]);
            }
        }
    }

    /// Clear the pending state.
    ///
    /// One call suffices no matter how many signals coalesced since
    /// the last acknowledge. Harmless when nothing is pending.
    /// Consumer-side only.
    pub fn acknowledge(&self) {
        match self.backend {
            Backend::EventFd(fd) => {
                // A single read returns the whole counter and zeroes it.
                let mut value = [0u8; 8];
                read_retry(fd, &mut value);
            }
            Backend::Pipe { read, .. } => {
                // Drain until the pipe reports empty.
                let mut buf = [0u8; 16];
                while read_retry(read, &mut buf) == buf.len() as isize {}
            }
        }
    }

    /// The pollable handle: readable exactly while a signal is pending.
    ///
    /// Querying has no side effects; the handle stays valid for the
    /// lifetime of the wakeup and can sit in a poll set next to
    /// unrelated descriptors.
    pub fn pollfd(&self) -> PollFd {
        PollFd::readable(self.as_raw_fd())
    }

    /// Check for a pending signal without blocking or consuming it.
    pub fn is_signaled(&self) -> bool {
        let mut fds = [self.pollfd()];
        match poll(&mut fds, Some(Duration::ZERO)) {
            Ok(n) => n > 0,
            Err(_) => false,
        }
    }

    /// Block the calling thread until a signal is pending.
    ///
    /// The pending state is not consumed; follow up with
    /// `acknowledge`. Interrupted polls are restarted.
    pub fn wait(&self) {
        let mut fds = [self.pollfd()];
        loop {
            if let Ok(n) = poll(&mut fds, None) {
                if n > 0 {
                    return;
                }
            }
        }
    }

    /// Block until a signal is pending or `timeout` elapses.
    ///
    /// Returns whether a signal is pending. The deadline is fixed up
    /// front; interruptions restart the poll with the remaining time
    /// only.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fds = [self.pollfd()];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(n) = poll(&mut fds, Some(remaining)) {
                if n > 0 {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    }
}

impl AsRawFd for Wakeup {
    fn as_raw_fd(&self) -> RawFd {
        match self.backend {
            Backend::EventFd(fd) => fd,
            Backend::Pipe { read, .. } => read,
        }
    }
}

impl Drop for Wakeup {
    fn drop(&mut self) {
        match self.backend {
            Backend::EventFd(fd) => unsafe {
                libc::close(fd);
            },
            Backend::Pipe { read, write } => unsafe {
                libc::close(read);
                libc::close(write);
            },
        }
    }
}

/// Write `buf` once, retrying on interruption.
///
/// Any other error is left to the caller's policy; for signals a
/// would-block result means the pending state is already set.
fn write_retry(fd: RawFd, buf: &[u8]) -> isize {
    loop {
        let res = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if res >= 0 || io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
            return res;
        }
    }
}

/// Read into `buf` once, retrying on interruption.
///
/// Returns the byte count, or a negative value for any other error
/// (a would-block result means nothing was pending).
fn read_retry(fd: RawFd, buf: &mut [u8]) -> isize {
    loop {
        let res = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if res >= 0 || io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
            return res;
        }
    }
}
