use std::net::SocketAddr;
use std::time::Duration;

use daqstream_acquire::SENTINEL_VALUE;
use daqstream_frame::{FrameConfig, FrameReader, FrameWriter};
use daqstream_transport::{DaqStream, TcpTransport};
use serde::Serialize;
use tracing::debug;

use crate::command::Command;
use crate::error::Result;
use crate::hello::{read_hello, ServerHello};

/// Default connect and per-operation timeout for [`StreamClient`].
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// The two frames answering `Stream`, `Spectrum` or `Reconfigure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Time array (`Stream`) or frequency array (`Spectrum`).
    pub axis: Vec<f64>,
    /// Row-major channel data or power densities.
    pub values: Vec<f64>,
}

impl Reply {
    /// Both frames carry only the sentinel value.
    pub fn is_degraded(&self) -> bool {
        self.axis == [SENTINEL_VALUE] && self.values == [SENTINEL_VALUE]
    }

    /// Split `values` into one row per channel.
    pub fn rows(&self, num_channels: usize) -> Vec<&[f64]> {
        if num_channels == 0 || self.values.is_empty() {
            return Vec::new();
        }
        let width = self.values.len() / num_channels;
        if width == 0 {
            return vec![self.values.as_slice()];
        }
        self.values.chunks(width).collect()
    }
}

/// Blocking client for a stream server.
///
/// Connecting reads the configuration announcement, so [`hello`](Self::hello)
/// is always populated.
pub struct StreamClient {
    reader: FrameReader<DaqStream>,
    writer: FrameWriter<DaqStream>,
    hello: ServerHello,
    peer: SocketAddr,
}

impl StreamClient {
    /// Connect with default frame limits and timeouts.
    pub fn connect(addr: &str) -> Result<Self> {
        let config = FrameConfig {
            read_timeout: Some(DEFAULT_CLIENT_TIMEOUT),
            write_timeout: Some(DEFAULT_CLIENT_TIMEOUT),
            ..FrameConfig::default()
        };
        Self::connect_with_config(addr, DEFAULT_CLIENT_TIMEOUT, config)
    }

    /// Connect with explicit connect timeout and frame configuration.
    pub fn connect_with_config(
        addr: &str,
        connect_timeout: Duration,
        frame_config: FrameConfig,
    ) -> Result<Self> {
        let stream = TcpTransport::connect_timeout(addr, connect_timeout)?;
        let peer = stream.peer_addr();
        let reader_stream = stream.try_clone()?;

        let mut reader = FrameReader::with_config_stream(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_stream(stream, frame_config)?;
        let hello = read_hello(&mut reader)?;
        debug!(%peer, ?hello, "connected to stream server");

        Ok(Self {
            reader,
            writer,
            hello,
            peer,
        })
    }

    /// Configuration announced by the server, updated by successful
    /// reconfigures.
    pub fn hello(&self) -> &ServerHello {
        &self.hello
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send `command` and collect its reply, if it has one.
    pub fn request(&mut self, command: Command) -> Result<Option<Reply>> {
        self.send(command)?;
        if !command.expects_reply() {
            return Ok(None);
        }
        let reply = self.read_reply()?;

        if let Command::Reconfigure {
            sample_rate,
            block_size,
        } = command
        {
            if !reply.is_degraded() {
                self.hello.set_timing(sample_rate, block_size);
            }
        }
        Ok(Some(reply))
    }

    /// Time array and row-major samples of one block.
    pub fn stream(&mut self) -> Result<Reply> {
        self.send(Command::Stream)?;
        self.read_reply()
    }

    /// Frequencies and row-major power densities of one block.
    pub fn spectrum(&mut self) -> Result<Reply> {
        self.send(Command::Spectrum)?;
        self.read_reply()
    }

    /// Ask the server to record; the server sends nothing back.
    pub fn save(&mut self) -> Result<()> {
        self.send(Command::Save)
    }

    /// Change rate and block size; the reply is a fresh block.
    pub fn reconfigure(&mut self, sample_rate: f64, block_size: usize) -> Result<Reply> {
        let reply = self.request(Command::Reconfigure {
            sample_rate,
            block_size,
        })?;
        Ok(reply.unwrap_or(Reply {
            axis: Vec::new(),
            values: Vec::new(),
        }))
    }

    /// Send one command frame.
    pub fn send(&mut self, command: Command) -> Result<()> {
        self.send_raw(&command.encode())
    }

    /// Send an arbitrary command payload.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.send(payload)?;
        Ok(())
    }

    /// Read the next two f64 frames.
    pub fn read_reply(&mut self) -> Result<Reply> {
        let axis = self.reader.read_array::<f64>()?;
        let values = self.reader.read_array::<f64>()?;
        Ok(Reply { axis, values })
    }

    /// Close both directions of the connection.
    pub fn close(self) -> Result<()> {
        self.writer.get_ref().shutdown()?;
        Ok(())
    }
}
