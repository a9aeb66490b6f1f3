//! Continuous DAQ acquisition streamed over TCP.
//!
//! daqstream samples a multi-channel analog input continuously, recovers from
//! overruns, and serves blocks, Welch spectra and recordings to clients over a
//! length-prefixed binary protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream
//! - [`frame`]: `u32` length-prefixed framing of raw little-endian arrays
//! - [`acquire`]: acquisition engine, spectral estimator, recording sink
//! - [`server`]: command dispatcher, server and client (behind `server` feature)

/// Re-export transport types.
pub mod transport {
    pub use daqstream_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use daqstream_frame::*;
}

/// Re-export acquisition types.
pub mod acquire {
    pub use daqstream_acquire::*;
}

/// Re-export server and client types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use daqstream_server::*;
}
