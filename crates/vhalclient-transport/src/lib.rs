//! Socket transport abstraction for VHAL clients.
//!
//! Two stream transports share one capability set ([`Transport`]):
//! - local-domain sockets addressed by filesystem path
//! - TCP sockets addressed by host and port
//!
//! This is the lowest layer of vhalclient. The reconnecting engine in
//! `vhalclient-sink` is generic over [`Transport`].

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
mod connection;
pub mod endpoint;
pub mod error;
#[cfg(unix)]
pub mod tcp;
#[cfg(unix)]
pub mod traits;
#[cfg(unix)]
pub mod uds;

pub use endpoint::{effective_port, Endpoint, DEFAULT_TCP_PORT};
pub use error::{Result, TransportError};
#[cfg(unix)]
pub use client::StreamClient;
#[cfg(unix)]
pub use tcp::TcpStreamClient;
#[cfg(unix)]
pub use traits::{SocketStream, Transport};
#[cfg(unix)]
pub use uds::{UnixSocketListener, UnixStreamClient};
