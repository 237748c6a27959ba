//! Pull-side facade for the VHAL audio playback channel.

use std::fmt;
use std::time::Duration;

use tracing::info;
use vhalclient_transport::{effective_port, Endpoint, TcpStreamClient, Transport};

use crate::config::{EngineConfig, EngineMode};
use crate::engine::{ConnectionState, EngineStats, ReconnectingEngine};
use crate::error::Result;

/// Address of the VHAL audio playback server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnectionInfo {
    pub ip_addr: String,
    /// `0` selects [`DEFAULT_TCP_PORT`](vhalclient_transport::DEFAULT_TCP_PORT).
    pub port: u16,
}

impl TcpConnectionInfo {
    pub fn new(ip_addr: impl Into<String>, port: u16) -> Self {
        Self {
            ip_addr: ip_addr.into(),
            port,
        }
    }

    /// The port actually dialed.
    pub fn effective_port(&self) -> u16 {
        effective_port(self.port)
    }
}

/// Reads raw audio bytes the VHAL plays back for one user.
///
/// The connection is kept up by a passive engine: nothing is read in the
/// background, and a read that sees EOF or an error drops the connection so
/// the engine dials again. Bytes the server sent before closing stay readable.
pub struct AudioSource<T: Transport = TcpStreamClient> {
    engine: ReconnectingEngine<T>,
    /// Identifies the session to the application. Never sent on the wire.
    user_id: i32,
}

impl AudioSource<TcpStreamClient> {
    pub fn new(info: TcpConnectionInfo, user_id: i32) -> Result<Self> {
        Self::from_transport(TcpStreamClient::new(info.ip_addr, info.port), user_id)
    }
}

impl<T: Transport> AudioSource<T> {
    pub fn from_transport(transport: T, user_id: i32) -> Result<Self> {
        Self::with_config(transport, user_id, EngineConfig::default())
    }

    /// The engine always runs in [`EngineMode::Passive`] regardless of
    /// `config.mode`.
    pub fn with_config(transport: T, user_id: i32, config: EngineConfig) -> Result<Self> {
        let config = EngineConfig {
            mode: EngineMode::Passive,
            ..config
        };
        let engine = ReconnectingEngine::start_with_config(transport, config)?;
        info!(user_id, endpoint = %engine.endpoint(), "audio source started");
        Ok(Self { engine, user_id })
    }

    /// One receive of up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means the server closed the connection; the engine is already
    /// reconnecting when this returns. While disconnected the result is
    /// `TransportError::NotConnected`.
    pub fn read_data_packet(&self, buf: &mut [u8]) -> Result<usize> {
        self.engine.read_packet(buf)
    }

    /// The user this source was opened for.
    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        self.engine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        self.engine.wait_until_connected(timeout)
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.engine.endpoint()
    }

    /// Stop the engine and close the connection. Also run on drop.
    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }
}

impl<T: Transport> fmt::Debug for AudioSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("user_id", &self.user_id)
            .field("engine", &self.engine)
            .finish()
    }
}
