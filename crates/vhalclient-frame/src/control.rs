use std::fmt;

use crate::error::{FrameError, Result};

/// Wire size of a [`ControlMessage`]: one little-endian `u32` command code.
pub const CONTROL_MESSAGE_SIZE: usize = 4;

/// Command code asking the client to start streaming.
pub const COMMAND_OPEN: u32 = 1;
/// Command code asking the client to stop streaming.
pub const COMMAND_CLOSE: u32 = 2;

/// Lifecycle command issued by the VHAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Open,
    Close,
    /// Any code this client does not recognize. What to do with it is up to
    /// the callback.
    Unknown(u32),
}

impl Command {
    /// Map a wire code to a command.
    pub fn from_code(code: u32) -> Self {
        match code {
            COMMAND_OPEN => Self::Open,
            COMMAND_CLOSE => Self::Close,
            other => Self::Unknown(other),
        }
    }

    /// The wire code of this command.
    pub fn code(self) -> u32 {
        match self {
            Self::Open => COMMAND_OPEN,
            Self::Close => COMMAND_CLOSE,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Fixed-size control record sent unsolicited by the VHAL.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┐
/// │ Command (4B LE u32)  │
/// │ 1 = open, 2 = close  │
/// └──────────────────────┘
/// ```
///
/// There is no magic, version or length prefix; both sides must agree on the
/// layout. Little-endian matches the native layout of the x86 VHAL builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlMessage {
    pub command: Command,
}

impl ControlMessage {
    pub fn new(command: Command) -> Self {
        Self { command }
    }

    pub fn open() -> Self {
        Self::new(Command::Open)
    }

    pub fn close() -> Self {
        Self::new(Command::Close)
    }

    /// Encode into the fixed wire representation.
    pub fn encode(&self) -> [u8; CONTROL_MESSAGE_SIZE] {
        self.command.code().to_le_bytes()
    }

    /// Decode a record. `src` must hold exactly [`CONTROL_MESSAGE_SIZE`] bytes.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let bytes: [u8; CONTROL_MESSAGE_SIZE] =
            src.try_into().map_err(|_| FrameError::Truncated {
                expected: CONTROL_MESSAGE_SIZE,
                actual: src.len(),
            })?;
        Ok(Self::new(Command::from_code(u32::from_le_bytes(bytes))))
    }
}

impl From<Command> for ControlMessage {
    fn from(command: Command) -> Self {
        Self::new(command)
    }
}
