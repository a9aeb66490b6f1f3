use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use daqstream_transport::DaqStream;

use crate::codec::{decode_frame, peek_length, Frame, FrameConfig, HEADER_SIZE};
use crate::element::Element;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. Callers always get complete frames, a
/// clean [`FrameError::ConnectionClosed`] at a frame boundary, or
/// [`FrameError::TruncatedFrame`] when the peer went away mid-frame.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(self.eof_error());
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next frame and reinterpret it as an array of `T`.
    pub fn read_array<E: Element>(&mut self) -> Result<Vec<E>> {
        self.read_frame()?.elements()
    }

    fn eof_error(&self) -> FrameError {
        if self.buf.is_empty() {
            return FrameError::ConnectionClosed;
        }
        let expected = match peek_length(&self.buf) {
            Some(len) => HEADER_SIZE + len,
            None => HEADER_SIZE,
        };
        tracing::debug!(expected, received = self.buf.len(), "stream ended mid-frame");
        FrameError::TruncatedFrame {
            expected,
            received: self.buf.len(),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<DaqStream> {
    /// Create a frame reader for `DaqStream` and apply read timeout from config.
    pub fn with_config_stream(inner: DaqStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: daqstream_transport::TransportError) -> FrameError {
    match err {
        daqstream_transport::TransportError::Io(io)
        | daqstream_transport::TransportError::Accept(io) => FrameError::Io(io),
        daqstream_transport::TransportError::Bind { source, .. }
        | daqstream_transport::TransportError::Connect { source, .. }
        | daqstream_transport::TransportError::Resolve { source, .. } => FrameError::Io(source),
    }
}
