//! Endpoint addressing.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Default TCP port of the VHAL audio playback channel.
pub const DEFAULT_TCP_PORT: u16 = 8768;

/// Where a transport connects to. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Filesystem path of a local-domain stream socket.
    Local(PathBuf),
    /// Host and port of a TCP stream socket.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Local-domain endpoint at `path`.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }

    /// TCP endpoint. A port of 0 selects [`DEFAULT_TCP_PORT`].
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port: effective_port(port),
        }
    }
}

/// The TCP port actually dialed for a requested `port`: 0 selects
/// [`DEFAULT_TCP_PORT`].
pub const fn effective_port(port: u16) -> u16 {
    if port == 0 {
        DEFAULT_TCP_PORT
    } else {
        port
    }
}

/// Local paths always carry the `unix:` scheme so that a name like `cam:1`
/// cannot read back as a TCP address.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Accepts `unix:path`, `tcp://host[:port]`, `host:port` with a numeric
    /// port, or a bare path.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "endpoint must not be empty".to_string(),
            ));
        }

        if let Some(path) = input.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(
                    "unix endpoint needs a path".to_string(),
                ));
            }
            return Ok(Self::local(path));
        }

        if let Some(rest) = input.strip_prefix("tcp://") {
            return parse_host_port(rest, true);
        }

        if !input.contains('/') {
            if let Some((_, port)) = input.rsplit_once(':') {
                if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
                    return parse_host_port(input, false);
                }
            }
        }

        Ok(Self::local(input))
    }
}

fn parse_host_port(input: &str, port_optional: bool) -> Result<Endpoint, TransportError> {
    let (host, port) = match input.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| TransportError::InvalidEndpoint(format!("invalid port in '{input}'")))?;
            (host, port)
        }
        None if port_optional => (input, 0),
        None => {
            return Err(TransportError::InvalidEndpoint(format!(
                "missing port in '{input}'"
            )))
        }
    };

    if host.is_empty() {
        return Err(TransportError::InvalidEndpoint(format!(
            "missing host in '{input}'"
        )));
    }

    Ok(Endpoint::tcp(host, port))
}
