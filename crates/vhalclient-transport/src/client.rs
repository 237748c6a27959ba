use std::os::fd::RawFd;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::tcp::TcpStreamClient;
use crate::traits::Transport;
use crate::uds::UnixStreamClient;

/// Client for whichever socket kind an [`Endpoint`] names.
#[derive(Debug)]
pub enum StreamClient {
    Unix(UnixStreamClient),
    Tcp(TcpStreamClient),
}

impl StreamClient {
    /// Create a disconnected client for `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Local(path) => Self::Unix(UnixStreamClient::new(path)),
            Endpoint::Tcp { host, port } => Self::Tcp(TcpStreamClient::new(host, port)),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Unix(client) => client.transport_name(),
            Self::Tcp(client) => client.transport_name(),
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            Self::Unix(client) => client,
            Self::Tcp(client) => client,
        }
    }
}

impl From<Endpoint> for StreamClient {
    fn from(endpoint: Endpoint) -> Self {
        Self::new(endpoint)
    }
}

impl Transport for StreamClient {
    fn connect(&self) -> Result<()> {
        self.inner().connect()
    }

    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.inner().send(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner().recv(buf)
    }

    fn close(&self) {
        self.inner().close();
    }

    fn is_connected(&self) -> bool {
        self.inner().is_connected()
    }

    fn native_handle(&self) -> Option<RawFd> {
        self.inner().native_handle()
    }

    fn endpoint(&self) -> &Endpoint {
        self.inner().endpoint()
    }
}
