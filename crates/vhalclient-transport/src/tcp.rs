use std::net::TcpStream;

use tracing::debug;

use crate::connection::ConnectionSlot;
use crate::endpoint::{effective_port, Endpoint};
use crate::error::{Result, TransportError};
use crate::traits::{SocketStream, Transport};

/// Client side of a TCP stream socket (the VHAL audio channel).
pub struct TcpStreamClient {
    host: String,
    port: u16,
    endpoint: Endpoint,
    slot: ConnectionSlot,
}

impl TcpStreamClient {
    /// Create a disconnected client. A `port` of 0 selects
    /// [`DEFAULT_TCP_PORT`](crate::DEFAULT_TCP_PORT).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let port = effective_port(port);
        Self {
            endpoint: Endpoint::tcp(host.clone(), port),
            host,
            port,
            slot: ConnectionSlot::default(),
        }
    }

    /// Remote host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port after defaulting.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp-stream"
    }
}

impl Transport for TcpStreamClient {
    fn connect(&self) -> Result<()> {
        let connect_err = |source| TransportError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        };
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;
        debug!(host = %self.host, port = self.port, "connected to tcp stream socket");
        self.slot.install(SocketStream::from_tcp(stream));
        Ok(())
    }

    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.slot.send(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.slot.recv(buf)
    }

    fn close(&self) {
        self.slot.close();
    }

    fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    fn native_handle(&self) -> Option<std::os::fd::RawFd> {
        self.slot.native_handle()
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl std::fmt::Debug for TcpStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpStreamClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::endpoint::DEFAULT_TCP_PORT;

    #[test]
    fn defaults_port_when_zero() {
        let client = TcpStreamClient::new("127.0.0.1", 0);
        assert_eq!(client.port(), DEFAULT_TCP_PORT);
        assert_eq!(client.endpoint(), &Endpoint::tcp("127.0.0.1", 8768));
        assert_eq!(client.transport_name(), "tcp-stream");
    }

    #[test]
    fn loopback_send_recv() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = TcpStreamClient::new("127.0.0.1", port);
        client.connect().unwrap();
        let (mut server, _) = listener.accept().unwrap();

        assert_eq!(client.send(b"audio").unwrap(), 5);
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"audio");

        server.write_all(b"pcm!").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(client.recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"pcm!");

        client.close();
        client.close();
        assert!(!client.is_connected());
    }

    #[test]
    fn connect_refused_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = TcpStreamClient::new("127.0.0.1", port);
        assert!(matches!(
            client.connect(),
            Err(TransportError::Connect { .. })
        ));
        assert!(client.native_handle().is_none());
    }
}
