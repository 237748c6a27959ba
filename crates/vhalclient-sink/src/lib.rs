//! Reconnecting VHAL connection engine and the facades built on it.
//!
//! [`ReconnectingEngine`] owns one transport and a background thread that
//! keeps it connected. [`VideoSink`] pushes frames and receives control
//! messages over a local socket; [`AudioSource`] pulls playback bytes over
//! TCP.

pub mod config;
pub mod error;

#[cfg(unix)]
pub mod audio;
#[cfg(unix)]
pub mod engine;
#[cfg(unix)]
mod readiness;
#[cfg(unix)]
pub mod video;

pub use config::{EngineConfig, EngineMode, DEFAULT_POLL_TIMEOUT, DEFAULT_RETRY_DELAY};
pub use error::{Result, SinkError};

#[cfg(unix)]
pub use audio::{AudioSource, TcpConnectionInfo};
#[cfg(unix)]
pub use engine::{ConnectionState, ControlCallback, EngineStats, ReconnectingEngine};
#[cfg(unix)]
pub use video::VideoSink;
