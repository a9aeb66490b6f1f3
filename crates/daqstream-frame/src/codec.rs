use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::element::{decode_elements, Element};
use crate::error::{FrameError, Result};

/// Frame header: payload length (4) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 64 MiB.
///
/// Large enough for a 10 s block of 8 channels at 100 kHz.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// One length-prefixed message unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Reinterpret the payload as a flat array of `T`.
    pub fn elements<T: Element>(&self) -> Result<Vec<T>> {
        decode_elements(self.payload.as_ref())
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────────────┐
/// │ Length       │ Payload                      │
/// │ (4B LE u32)  │ (Length bytes, LE elements)  │
/// └──────────────┴──────────────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(payload_len) = peek_length(src) else {
        return Ok(None); // Need more data
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { payload }))
}

/// Read the length prefix without consuming it.
pub(crate) fn peek_length(src: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(header) as usize)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
