//! Client library for streaming media to a VHAL endpoint.
//!
//! The VHAL owns the session: it tells the client when to start (`open`) and
//! stop (`close`) producing frames. This crate keeps the connection alive
//! across VHAL restarts and hands those commands to the application.
//!
//! # Crate Structure
//!
//! - [`transport`]: Socket abstraction (local-domain and TCP stream clients)
//! - [`frame`]: Control message and data frame wire formats
//! - [`sink`]: Reconnecting engine, video sink and audio source
//!
//! # Example
//!
//! ```no_run
//! use vhalclient::frame::Command;
//! use vhalclient::VideoSink;
//!
//! let sink = VideoSink::connect_unix("/ipc/camera-socket0")?;
//! sink.register_callback(|msg| match msg.command {
//!     Command::Open => println!("start producing"),
//!     Command::Close => println!("stop producing"),
//!     Command::Unknown(code) => eprintln!("unexpected command {code}"),
//! });
//! # Ok::<(), vhalclient::sink::SinkError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use vhalclient_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vhalclient_frame::*;
}

/// Re-export engine and facade types.
pub mod sink {
    pub use vhalclient_sink::*;
}

#[cfg(unix)]
pub use vhalclient_sink::{AudioSource, TcpConnectionInfo, VideoSink};
