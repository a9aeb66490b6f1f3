use std::path::{Path, PathBuf};
use std::time::Duration;

use daqstream_acquire::{ChannelConfig, HardwareOverrunPolicy, InputMode, InputRange};
use daqstream_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Shortest timeout accepted; sockets reject a zero timeout.
pub const MIN_TIMEOUT_SECS: f64 = 0.001;

/// Longest timeout accepted (one day).
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Everything a stream server needs, loaded once at startup.
///
/// Missing JSON fields take their defaults; unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub bind: String,
    pub channels: Vec<u8>,
    /// Single-ended or differential wiring of the inputs.
    pub input_mode: InputMode,
    pub input_range: InputRange,
    pub sample_rate: f64,
    pub block_size: usize,
    /// Welch segment length; must not exceed `block_size`.
    pub segment_length: usize,
    /// Device read timeout per block.
    pub read_timeout_secs: f64,
    /// Socket write timeout; a stalled client is dropped after this.
    pub write_timeout_secs: f64,
    /// Close a session after this long without a command. `None` waits forever.
    pub idle_timeout_secs: Option<f64>,
    pub record_path: PathBuf,
    /// Samples per channel written by one `Save`.
    pub record_samples: usize,
    pub hardware_overrun: HardwareOverrunPolicy,
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            channels: vec![1],
            input_mode: InputMode::SingleEnded,
            input_range: InputRange::Bip1V,
            sample_rate: 10_000.0,
            block_size: 10_000,
            segment_length: 256,
            read_timeout_secs: 5.0,
            write_timeout_secs: 10.0,
            idle_timeout_secs: None,
            record_path: PathBuf::from("record/samples.txt"),
            record_samples: 10_000,
            hardware_overrun: HardwareOverrunPolicy::Report,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.channel_config()?;
        if self.segment_length == 0 {
            return Err(ServerError::Config(
                "segment_length must be greater than zero".to_string(),
            ));
        }
        if self.segment_length > self.block_size {
            return Err(ServerError::Config(format!(
                "segment_length {} exceeds block_size {}",
                self.segment_length, self.block_size
            )));
        }
        for (name, secs) in [
            ("read_timeout_secs", Some(self.read_timeout_secs)),
            ("write_timeout_secs", Some(self.write_timeout_secs)),
            ("idle_timeout_secs", self.idle_timeout_secs),
        ] {
            if let Some(secs) = secs {
                if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
                    return Err(ServerError::Config(format!(
                        "{name} must be within {MIN_TIMEOUT_SECS}..={MAX_TIMEOUT_SECS} (got {secs})"
                    )));
                }
            }
        }
        if self.record_samples == 0 {
            return Err(ServerError::Config(
                "record_samples must be greater than zero".to_string(),
            ));
        }
        let block_bytes = self
            .block_size
            .checked_mul(self.channels.len())
            .and_then(|n| n.checked_mul(std::mem::size_of::<f64>()));
        if block_bytes.is_none_or(|bytes| bytes > self.max_payload_size) {
            return Err(ServerError::Config(format!(
                "max_payload_size {} cannot hold one block of {} samples",
                self.max_payload_size, self.block_size
            )));
        }
        Ok(())
    }

    /// Scan configuration for the acquisition engine.
    pub fn channel_config(&self) -> Result<ChannelConfig> {
        Ok(
            ChannelConfig::new(self.channels.clone(), self.sample_rate, self.block_size)?
                .with_input(self.input_mode, self.input_range)?,
        )
    }

    pub fn read_timeout(&self) -> Duration {
        secs_to_duration(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        secs_to_duration(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(secs_to_duration)
    }

    /// Frame settings for one session. `read_timeout` is the poll interval
    /// used to notice shutdown between commands.
    pub fn frame_config(&self, poll: Duration) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: Some(poll),
            write_timeout: Some(self.write_timeout()),
        }
    }
}

/// Out-of-range values (only reachable on an unvalidated config) saturate
/// instead of panicking.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}
