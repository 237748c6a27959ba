/// Errors surfaced by the engine and its facades.
///
/// Connectivity and control-framing failures never appear here: the engine
/// absorbs them by reconnecting. Only the data path reports errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] vhalclient_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] vhalclient_frame::FrameError),

    /// A send moved fewer bytes than the frame header needs.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { expected: usize, written: usize },

    /// The engine's background thread or wake-up channel could not be created.
    #[error("failed to start engine: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;
