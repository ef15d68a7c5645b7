//! Readiness waiting for sockets.
//!
//! On Unix this is a single-descriptor `poll(2)`. Exceptional conditions
//! (`POLLERR`, `POLLNVAL`) are reported as [`TransportError::Exceptional`] so
//! the caller can tear the connection down. `POLLHUP` is folded into
//! readability: the next read returns zero bytes and the caller sees EOF.

use std::time::Duration;

#[cfg(unix)]
use crate::error::TransportError;
use crate::error::Result;

/// What to wait for. Readability is always included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    /// Also wait for writability.
    pub write: bool,
}

impl Interest {
    /// Wait for readability only.
    pub const READ: Self = Self { write: false };
    /// Wait for readability or writability.
    pub const READ_WRITE: Self = Self { write: true };

    /// Interest in writability only when there is something to write.
    pub fn with_pending_write(pending: bool) -> Self {
        Self { write: pending }
    }
}

/// Readiness reported by a wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// The peer hung up. Reads will drain what is left and then return 0.
    pub hangup: bool,
}

impl Readiness {
    /// True when the wait timed out without any event.
    pub fn is_idle(&self) -> bool {
        !self.readable && !self.writable && !self.hangup
    }
}

#[cfg(unix)]
pub(crate) fn wait_for<S: std::os::fd::AsRawFd>(
    source: &S,
    interest: Interest,
    timeout: Duration,
) -> Result<Readiness> {
    let mut events = libc::POLLIN;
    if interest.write {
        events |= libc::POLLOUT;
    }
    let mut pollfd = libc::pollfd {
        fd: source.as_raw_fd(),
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `pollfd` is a valid, writable pollfd and the count passed is 1.
    // The descriptor is borrowed from `source`, which outlives this call.
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(Readiness::default());
        }
        return Err(err.into());
    }
    if rc == 0 {
        return Ok(Readiness::default());
    }

    let revents = pollfd.revents;
    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(TransportError::Exceptional);
    }

    let hangup = revents & libc::POLLHUP != 0;
    Ok(Readiness {
        readable: revents & libc::POLLIN != 0 || hangup,
        writable: revents & libc::POLLOUT != 0,
        hangup,
    })
}

/// Without `poll(2)` the wait degrades to a short sleep and optimistic
/// readiness; non-blocking I/O then reports `WouldBlock` where nothing is ready.
#[cfg(not(unix))]
pub(crate) fn wait_for<S>(_source: &S, interest: Interest, timeout: Duration) -> Result<Readiness> {
    std::thread::sleep(timeout.min(Duration::from_millis(10)));
    Ok(Readiness {
        readable: true,
        writable: interest.write,
        hangup: false,
    })
}
