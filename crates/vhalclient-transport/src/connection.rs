use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::SocketStream;

/// Holds the live stream of a client transport.
///
/// Sends and receives clone the `Arc` under a short lock and then perform
/// I/O without it, so the two directions never wait on each other. Closing
/// shuts the socket down before releasing it so an in-flight call returns.
#[derive(Default)]
pub(crate) struct ConnectionSlot {
    stream: Mutex<Option<Arc<SocketStream>>>,
}

impl ConnectionSlot {
    pub(crate) fn install(&self, stream: SocketStream) {
        let previous = self.lock().replace(Arc::new(stream));
        if let Some(previous) = previous {
            let _ = previous.shutdown();
        }
    }

    pub(crate) fn send(&self, buf: &[u8]) -> Result<usize> {
        let stream = self.current()?;
        loop {
            match (&*stream).write(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    pub(crate) fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.current()?;
        loop {
            match (&*stream).read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    pub(crate) fn close(&self) {
        if let Some(stream) = self.lock().take() {
            // ENOTCONN here just means the peer already went away.
            let _ = stream.shutdown();
            debug!(fd = stream.as_raw_fd(), "closed connection");
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn native_handle(&self) -> Option<RawFd> {
        self.lock().as_ref().map(|stream| stream.as_raw_fd())
    }

    fn current(&self) -> Result<Arc<SocketStream>> {
        self.lock().clone().ok_or(TransportError::NotConnected)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<SocketStream>>> {
        self.stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;

    fn connected_slot() -> (ConnectionSlot, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        let slot = ConnectionSlot::default();
        slot.install(SocketStream::from_unix(local));
        (slot, remote)
    }

    #[test]
    fn send_and_recv_through_slot() {
        let (slot, mut remote) = connected_slot();

        assert_eq!(slot.send(b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(slot.recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn io_without_connection_is_not_connected() {
        let slot = ConnectionSlot::default();
        assert!(matches!(slot.send(b"x"), Err(TransportError::NotConnected)));
        let mut buf = [0u8; 1];
        assert!(matches!(
            slot.recv(&mut buf),
            Err(TransportError::NotConnected)
        ));
        assert!(slot.native_handle().is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let (slot, _remote) = connected_slot();
        assert!(slot.is_connected());

        slot.close();
        slot.close();

        assert!(!slot.is_connected());
        assert!(slot.native_handle().is_none());
    }

    #[test]
    fn close_signals_eof_to_peer() {
        let (slot, mut remote) = connected_slot();
        slot.close();

        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_wakes_blocked_reader() {
        let (slot, _remote) = connected_slot();
        let slot = Arc::new(slot);

        let reader = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                let mut buf = [0u8; 4];
                slot.recv(&mut buf)
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        slot.close();

        let result = reader.join().unwrap();
        assert!(matches!(result, Ok(0)));
    }
}
