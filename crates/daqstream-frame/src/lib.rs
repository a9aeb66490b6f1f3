//! Length-prefixed numeric array framing.
//!
//! Every message on the wire is framed with:
//! - A 4-byte little-endian payload length (bytes, not elements)
//! - The raw little-endian bytes of a flat numeric array
//!
//! The codec does not know the element type; callers pick the element width
//! ([`f64`] for sample data, [`u8`] for control bytes) when they reinterpret a
//! payload. Arrays that belong together (time axis and data) travel as separate
//! back-to-back frames.

pub mod codec;
pub mod element;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::SampleFrameCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use element::{decode_elements, encode_elements, Element};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
