/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended inside a frame, before its declared boundary.
    #[error("truncated frame (expected {expected} bytes, received {received})")]
    TruncatedFrame { expected: usize, received: usize },

    /// The payload does not match what the protocol expects.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True when the byte stream can no longer be trusted to sit on a frame
    /// boundary and the connection must be dropped.
    pub fn is_protocol_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::TruncatedFrame { .. }
                | FrameError::ProtocolMismatch(_)
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
