use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Data frame header: payload length as a little-endian `u64`.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode the length prefix of a data frame.
///
/// Eight bytes wide to stay byte-compatible with peers that read a 64-bit
/// native `size_t`, with the byte order pinned to little-endian.
pub fn encode_length_prefix(len: usize) -> [u8; LENGTH_PREFIX_SIZE] {
    (len as u64).to_le_bytes()
}

/// Decode a length prefix.
pub fn decode_length_prefix(src: &[u8; LENGTH_PREFIX_SIZE]) -> u64 {
    u64::from_le_bytes(*src)
}

/// Encode a data frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬─────────────────┐
/// │ Length (8B LE)   │ Payload         │
/// │ u64              │ (Length bytes)  │
/// └──────────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u64_le(payload.len() as u64);
    dst.put_slice(payload);
}

/// Decode a data frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
    let declared = decode_length_prefix(&prefix);

    let payload_len = match usize::try_from(declared) {
        Ok(len) if len <= max_payload => len,
        _ => {
            return Err(FrameError::PayloadTooLarge {
                size: usize::try_from(declared).unwrap_or(usize::MAX),
                max: max_payload,
            })
        }
    };

    if src.len() < LENGTH_PREFIX_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for the peer-side frame reader.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_little_endian_u64() {
        assert_eq!(encode_length_prefix(4096), [0, 0x10, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_length_prefix(&encode_length_prefix(1_000_000)), 1_000_000);
    }

    #[test]
    fn decode_encoded_frame() {
        let mut buf = BytesMut::new();
        encode_frame(b"h265-chunk", &mut buf);
        assert_eq!(buf.len(), LENGTH_PREFIX_SIZE + 10);

        let payload = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"h265-chunk");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&[0x10, 0x00, 0x00][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf);
        buf.truncate(LENGTH_PREFIX_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn empty_payload_frame() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf);
        assert_eq!(buf.len(), LENGTH_PREFIX_SIZE);

        let payload = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf);
        encode_frame(b"second", &mut buf);

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"first");
        assert_eq!(f2.as_ref(), b"second");
        assert!(buf.is_empty());
    }
}
