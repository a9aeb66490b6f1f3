use std::io::{Read, Write};

use daqstream_acquire::ChannelConfig;
use daqstream_frame::{FrameReader, FrameWriter};
use serde::Serialize;

use crate::command::PROTOCOL_VERSION;
use crate::error::{Result, ServerError};

/// Configuration announced to every client right after accept.
///
/// Sent as two f64 frames: the channel list, then
/// `[sample_rate, block_size, segment_length, protocol_version]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerHello {
    pub channels: Vec<u8>,
    pub sample_rate: f64,
    pub block_size: usize,
    pub segment_length: usize,
    pub protocol_version: u8,
}

impl ServerHello {
    pub fn new(config: &ChannelConfig, segment_length: usize) -> Self {
        Self {
            channels: config.channels.clone(),
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            segment_length,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Update the timing fields after an accepted reconfigure.
    pub fn set_timing(&mut self, sample_rate: f64, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
    }
}

/// Write both configuration frames.
pub fn send_hello<W: Write>(writer: &mut FrameWriter<W>, hello: &ServerHello) -> Result<()> {
    let channels: Vec<f64> = hello.channels.iter().map(|&c| f64::from(c)).collect();
    writer.send_array(&channels)?;
    writer.send_array(&[
        hello.sample_rate,
        hello.block_size as f64,
        hello.segment_length as f64,
        f64::from(hello.protocol_version),
    ])?;
    Ok(())
}

/// Read and check both configuration frames.
pub fn read_hello<R: Read>(reader: &mut FrameReader<R>) -> Result<ServerHello> {
    let channels = reader
        .read_array::<f64>()?
        .into_iter()
        .map(|value| {
            as_index(value, u8::MAX as usize)
                .map(|c| c as u8)
                .ok_or_else(|| ServerError::HandshakeFailed(format!("bad channel index {value}")))
        })
        .collect::<Result<Vec<u8>>>()?;
    if channels.is_empty() {
        return Err(ServerError::HandshakeFailed(
            "server announced no channels".to_string(),
        ));
    }

    let timing = reader.read_array::<f64>()?;
    let &[sample_rate, block_size, segment_length, version] = timing.as_slice() else {
        return Err(ServerError::HandshakeFailed(format!(
            "configuration frame has {} element(s), expected 4",
            timing.len()
        )));
    };

    let protocol_version = as_index(version, u8::MAX as usize)
        .map(|v| v as u8)
        .filter(|&v| v == PROTOCOL_VERSION)
        .ok_or_else(|| {
            ServerError::HandshakeFailed(format!(
                "server speaks protocol {version}, client speaks {PROTOCOL_VERSION}"
            ))
        })?;
    let block_size = as_index(block_size, usize::MAX)
        .ok_or_else(|| ServerError::HandshakeFailed(format!("bad block size {block_size}")))?;
    let segment_length = as_index(segment_length, usize::MAX).ok_or_else(|| {
        ServerError::HandshakeFailed(format!("bad segment length {segment_length}"))
    })?;

    Ok(ServerHello {
        channels,
        sample_rate,
        block_size,
        segment_length,
        protocol_version,
    })
}

fn as_index(value: f64, max: usize) -> Option<usize> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= max as f64)
        .then_some(value as usize)
}
