//! One wait set merging "socket readable" with "shutdown requested".

use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

/// What the caller wants to hear about on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interest {
    /// Data (or EOF) is ready to read.
    Readable,
    /// Only hangup and error conditions.
    Hangup,
}

/// Outcome of one [`wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The socket reported the requested interest or an error.
    Ready,
    /// The peer hung up and nothing matching the interest was reported.
    HungUp,
    /// The shutdown signal fired.
    Shutdown,
    /// Nothing happened before the timeout.
    TimedOut,
}

/// Self-pipe used to interrupt [`wait`] from another thread.
///
/// Once notified it stays readable; shutdown is terminal.
pub(crate) struct ShutdownSignal {
    reader: UnixStream,
    writer: UnixStream,
}

impl ShutdownSignal {
    pub(crate) fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self { reader, writer })
    }

    pub(crate) fn notify(&self) {
        // WouldBlock means a wake-up byte is already pending.
        let _ = (&self.writer).write(&[1]);
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

/// Wait until `socket` matches `interest`, `shutdown` becomes readable, or
/// `timeout` elapses. Shutdown wins when both fire together.
pub(crate) fn wait(
    socket: Option<(RawFd, Interest)>,
    shutdown: RawFd,
    timeout: Duration,
) -> io::Result<Readiness> {
    let deadline = Instant::now() + timeout;
    let mut fds = [
        libc::pollfd {
            fd: shutdown,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: -1,
            events: 0,
            revents: 0,
        },
    ];
    if let Some((fd, interest)) = socket {
        fds[1].fd = fd;
        fds[1].events = match interest {
            Interest::Readable => libc::POLLIN,
            Interest::Hangup => 0,
        };
    }

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout_ms = remaining
            .as_millis()
            .try_into()
            .unwrap_or(libc::c_int::MAX);

        // SAFETY: `fds` is a valid, writable array of `pollfd` for its whole
        // length, and a negative fd in the second slot is ignored by poll(2).
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(Readiness::TimedOut);
        }
        if fds[0].revents != 0 {
            return Ok(Readiness::Shutdown);
        }
        let revents = fds[1].revents;
        if revents & (fds[1].events | libc::POLLERR | libc::POLLNVAL) != 0 {
            return Ok(Readiness::Ready);
        }
        if revents & libc::POLLHUP != 0 {
            return Ok(Readiness::HungUp);
        }
        return Ok(Readiness::TimedOut);
    }
}

/// Bytes queued for reading on `fd`.
pub(crate) fn pending_bytes(fd: RawFd) -> io::Result<usize> {
    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single `c_int` through the pointer, which
    // refers to a live local for the duration of the call.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending as *mut libc::c_int) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(usize::try_from(pending).unwrap_or(0))
}
