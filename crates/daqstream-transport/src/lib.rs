//! TCP stream transport for the acquisition server.
//!
//! This is the lowest layer of daqstream. A [`TcpTransport`] binds and accepts
//! connections; every connection is handed out as a [`DaqStream`] that the
//! framing layer reads from and writes to.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::DaqStream;
