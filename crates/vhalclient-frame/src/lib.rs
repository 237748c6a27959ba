//! Wire records exchanged with the VHAL.
//!
//! Two formats share one connection, in opposite directions:
//! - inbound: fixed 4-byte [`ControlMessage`] records (`open`, `close`)
//! - outbound: data frames, an 8-byte little-endian length then the payload
//!
//! Both use explicit widths and byte order rather than host-native layout.

pub mod codec;
pub mod control;
pub mod error;
#[cfg(unix)]
pub mod reader;

pub use codec::{
    decode_frame, decode_length_prefix, encode_frame, encode_length_prefix, FrameConfig,
    DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE,
};
pub use control::{Command, ControlMessage, COMMAND_CLOSE, COMMAND_OPEN, CONTROL_MESSAGE_SIZE};
pub use error::{FrameError, Result};
#[cfg(unix)]
pub use reader::FrameReader;
