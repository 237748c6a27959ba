use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::endpoint::Endpoint;
use crate::error::Result;

/// Capability set shared by every VHAL transport.
///
/// All methods take `&self`: the engine's background thread receives on the
/// same instance an application thread sends on. Each direction assumes a
/// single caller at a time.
pub trait Transport: Send + Sync + 'static {
    /// Open the connection (blocking). Fails without retrying.
    fn connect(&self) -> Result<()>;

    /// One underlying write. The returned count may be short of `buf.len()`.
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// One underlying read of up to `buf.len()` bytes. `Ok(0)` means the peer
    /// closed the connection.
    fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Drop the connection. Closing a closed or never-opened transport is a
    /// no-op.
    fn close(&self);

    /// Whether a connection is currently held.
    fn is_connected(&self) -> bool;

    /// Raw descriptor of the live connection, for readiness polling.
    fn native_handle(&self) -> Option<RawFd>;

    /// Address this transport connects to.
    fn endpoint(&self) -> &Endpoint;
}

/// A connected stream socket of either supported kind.
pub struct SocketStream {
    inner: SocketStreamInner,
}

enum SocketStreamInner {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Read for &SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &self.inner {
            SocketStreamInner::Unix(stream) => (&*stream).read(buf),
            SocketStreamInner::Tcp(stream) => (&*stream).read(buf),
        }
    }
}

impl Write for &SocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.inner {
            SocketStreamInner::Unix(stream) => (&*stream).write(buf),
            SocketStreamInner::Tcp(stream) => (&*stream).write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.inner {
            SocketStreamInner::Unix(stream) => (&*stream).flush(),
            SocketStreamInner::Tcp(stream) => (&*stream).flush(),
        }
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&*self).read(buf)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self).flush()
    }
}

impl SocketStream {
    pub(crate) fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: SocketStreamInner::Unix(stream),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: SocketStreamInner::Tcp(stream),
        }
    }

    /// Shut down both directions, waking any thread blocked on the socket.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            SocketStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both)?,
            SocketStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both)?,
        }
        Ok(())
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            SocketStreamInner::Unix(stream) => stream.set_read_timeout(timeout)?,
            SocketStreamInner::Tcp(stream) => stream.set_read_timeout(timeout)?,
        }
        Ok(())
    }

    /// Get the credentials of a local-domain peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        let fd = match &self.inner {
            SocketStreamInner::Unix(stream) => stream.as_raw_fd(),
            SocketStreamInner::Tcp(_) => return None,
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of a local-domain peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }

    /// Socket kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            SocketStreamInner::Unix(_) => "unix",
            SocketStreamInner::Tcp(_) => "tcp",
        }
    }
}

impl AsRawFd for SocketStream {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            SocketStreamInner::Unix(stream) => stream.as_raw_fd(),
            SocketStreamInner::Tcp(stream) => stream.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for SocketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketStream")
            .field("type", &self.kind())
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}
