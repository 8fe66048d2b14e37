// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Thin safe wrapper over poll(2).
//!
//! One entry per descriptor, readability only. Interruption is
//! reported as zero ready entries so callers re-enter with an
//! adjusted deadline instead of failing.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// A single poll(2) entry watching one descriptor for readability.
#[repr(transparent)]
pub struct PollFd(libc::pollfd);

impl PollFd {
    /// Watch `fd` for readability.
    pub fn readable(fd: RawFd) -> Self {
        PollFd(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
    }

    /// Whether the descriptor reported ready on the last `poll` call.
    ///
    /// Hangup and error conditions count as ready; a reader finds out
    /// what happened when it reads.
    pub fn is_ready(&self) -> bool {
        self.0.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
    }
}

/// Block until at least one entry is ready or `timeout` elapses.
///
/// `None` waits indefinitely. Sub-millisecond timeouts round up to a
/// full millisecond so bounded waits cannot degenerate into spinning.
/// Returns the number of ready entries; interruption counts as zero.
pub fn poll(fds: &mut [PollFd], timeout: Option<Duration>) -> io::Result<usize> {
    let timeout_ms: libc::c_int = match timeout {
        None => -1,
        Some(d) => d.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as libc::c_int,
    };

    let n = unsafe {
        libc::poll(
            fds.as_mut_ptr() as *mut libc::pollfd,
            fds.len() as libc::nfds_t,
            timeout_ms,
        )
    };

    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0); // EINTR: caller re-enters.
        }
        return Err(err);
    }

    Ok(n as usize)
}
