/// Errors that can occur while serving or querying a stream server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] daqstream_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] daqstream_frame::FrameError),

    /// Acquisition engine error.
    #[error("acquisition error: {0}")]
    Acquisition(#[from] daqstream_acquire::AcquisitionError),

    /// Spectral estimator setup error.
    #[error("spectrum error: {0}")]
    Spectrum(#[from] daqstream_acquire::SpectrumError),

    /// The server configuration is not usable.
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// The configuration announcement from the server was malformed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A session thread panicked.
    #[error("session with {0} panicked")]
    SessionPanicked(std::net::SocketAddr),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
