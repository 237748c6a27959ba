//! Push-side facade for the VHAL video channel.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use vhalclient_frame::ControlMessage;
use vhalclient_transport::{Endpoint, Transport, UnixStreamClient};

use crate::config::{EngineConfig, EngineMode};
use crate::engine::{ConnectionState, EngineStats, ReconnectingEngine};
use crate::error::Result;

/// Streams data frames to the VHAL and reports its `open`/`close` commands.
///
/// The VHAL decides when frames are wanted: register a callback, start a
/// producer on [`Command::Open`](vhalclient_frame::Command::Open) that calls
/// [`write_packet`](Self::write_packet), and stop it on
/// [`Command::Close`](vhalclient_frame::Command::Close).
///
/// `VideoSink` is `Sync`, so the producer can share it behind an `Arc`.
pub struct VideoSink<T: Transport = UnixStreamClient> {
    engine: ReconnectingEngine<T>,
}

impl VideoSink<UnixStreamClient> {
    /// Connect to the VHAL's local-domain socket at `path`.
    ///
    /// Returns as soon as the background thread is running; the first
    /// connect happens asynchronously and is retried until it succeeds.
    pub fn connect_unix(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(UnixStreamClient::new(path))
    }
}

impl<T: Transport> VideoSink<T> {
    /// Wrap an arbitrary transport with default engine settings.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, EngineConfig::default())
    }

    /// Wrap an arbitrary transport. The engine always runs in
    /// [`EngineMode::Control`] regardless of `config.mode`.
    pub fn with_config(transport: T, config: EngineConfig) -> Result<Self> {
        let config = EngineConfig {
            mode: EngineMode::Control,
            ..config
        };
        Ok(Self {
            engine: ReconnectingEngine::start_with_config(transport, config)?,
        })
    }

    /// Wrap a transport with the control callback installed before the
    /// first connect.
    pub fn with_callback<F>(transport: T, config: EngineConfig, callback: F) -> Result<Self>
    where
        F: FnMut(&ControlMessage) + Send + 'static,
    {
        let config = EngineConfig {
            mode: EngineMode::Control,
            ..config
        };
        Ok(Self {
            engine: ReconnectingEngine::start_with_callback(transport, config, callback)?,
        })
    }

    /// Install the control callback, replacing any previous one.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: FnMut(&ControlMessage) + Send + 'static,
    {
        self.engine.register_callback(callback);
    }

    /// Send one length-prefixed frame. See
    /// [`ReconnectingEngine::write_packet`].
    pub fn write_packet(&self, payload: &[u8]) -> Result<usize> {
        self.engine.write_packet(payload)
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

impl<T: Transport> fmt::Debug for VideoSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSink")
            .field("engine", &self.engine)
            .finish()
    }
}
