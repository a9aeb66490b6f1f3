//! Element reinterpretation for frame payloads.
//!
//! Payloads are flat little-endian arrays. The element width is chosen by the
//! caller: 8 bytes for `f64` sample data, 1 byte for `u8` control arrays.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// A fixed-width numeric type that can travel in a frame payload.
pub trait Element: Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;
    /// Type name used in error messages.
    const NAME: &'static str;

    /// Append the little-endian representation to `dst`.
    fn put_le(self, dst: &mut BytesMut);

    /// Read one element from exactly [`Element::WIDTH`] bytes.
    fn from_le(src: &[u8]) -> Self;
}

impl Element for f64 {
    const WIDTH: usize = 8;
    const NAME: &'static str = "f64";

    fn put_le(self, dst: &mut BytesMut) {
        dst.put_f64_le(self);
    }

    fn from_le(src: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(src);
        f64::from_le_bytes(raw)
    }
}

impl Element for u8 {
    const WIDTH: usize = 1;
    const NAME: &'static str = "u8";

    fn put_le(self, dst: &mut BytesMut) {
        dst.put_u8(self);
    }

    fn from_le(src: &[u8]) -> Self {
        src[0]
    }
}

/// Flatten a slice of elements into payload bytes.
pub fn encode_elements<T: Element>(values: &[T]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * T::WIDTH);
    for &value in values {
        value.put_le(&mut buf);
    }
    buf.freeze()
}

/// Reinterpret payload bytes as a flat array of `T`.
///
/// A payload that does not divide evenly into elements is a protocol fault.
pub fn decode_elements<T: Element>(payload: &[u8]) -> Result<Vec<T>> {
    if payload.len() % T::WIDTH != 0 {
        return Err(FrameError::ProtocolMismatch(format!(
            "payload of {} bytes is not a whole number of {} elements",
            payload.len(),
            T::NAME
        )));
    }
    Ok(payload.chunks_exact(T::WIDTH).map(T::from_le).collect())
}
