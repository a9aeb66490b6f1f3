//! TCP server and client for the daqstream protocol.
//!
//! A server announces its scan configuration on accept, then answers
//! `Stream`, `Save`, `Spectrum` and `Reconfigure` commands from an
//! [`AcquisitionEngine`](daqstream_acquire::AcquisitionEngine) shared across
//! sessions. Clients are served one at a time.

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod hello;
pub mod listener;
pub mod session;

pub use client::{Reply, StreamClient, DEFAULT_CLIENT_TIMEOUT};
pub use command::{Command, PROTOCOL_VERSION};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use hello::{read_hello, send_hello, ServerHello};
pub use listener::{ShutdownHandle, StreamServer};
pub use session::{serve_connection, ServerContext, Session, SessionSummary};
