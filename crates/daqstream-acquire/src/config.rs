use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};

/// Highest analog input index accepted (MCC 128: 8 single-ended inputs).
pub const MAX_CHANNEL_INDEX: u8 = 7;

/// Slowest scan rate accepted, in Hz.
pub const MIN_SAMPLE_RATE: f64 = 1.0;

/// Fastest scan rate accepted, in Hz.
pub const MAX_SAMPLE_RATE: f64 = 1_000_000.0;

/// How each analog input is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Each input measured against ground.
    #[default]
    SingleEnded,
    /// Inputs paired as `CHn+` / `CHn-`; only half as many channels exist.
    Differential,
}

impl InputMode {
    pub fn max_channel_index(self) -> u8 {
        match self {
            InputMode::SingleEnded => MAX_CHANNEL_INDEX,
            InputMode::Differential => MAX_CHANNEL_INDEX / 2,
        }
    }
}

/// Bipolar full-scale input range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputRange {
    #[serde(rename = "bip_10v")]
    Bip10V,
    #[serde(rename = "bip_5v")]
    Bip5V,
    #[serde(rename = "bip_2v")]
    Bip2V,
    #[default]
    #[serde(rename = "bip_1v")]
    Bip1V,
}

impl InputRange {
    /// Largest magnitude the converter reports, in volts.
    pub fn full_scale(self) -> f64 {
        match self {
            InputRange::Bip10V => 10.0,
            InputRange::Bip5V => 5.0,
            InputRange::Bip2V => 2.0,
            InputRange::Bip1V => 1.0,
        }
    }
}

/// Channel set, input setup, sample rate and block size of one scan.
///
/// Immutable while a scan runs; changing any field goes through
/// [`AcquisitionEngine::reconfigure`](crate::AcquisitionEngine::reconfigure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Ordered, unique channel indices.
    pub channels: Vec<u8>,
    /// Samples per second per channel.
    pub sample_rate: f64,
    /// Samples per channel delivered by one read.
    pub block_size: usize,
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default)]
    pub input_range: InputRange,
}

impl ChannelConfig {
    /// Build a validated configuration.
    pub fn new(channels: Vec<u8>, sample_rate: f64, block_size: usize) -> Result<Self> {
        let config = Self {
            channels,
            sample_rate,
            block_size,
            input_mode: InputMode::default(),
            input_range: InputRange::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Same scan with a different input wiring and range, validated.
    pub fn with_input(mut self, input_mode: InputMode, input_range: InputRange) -> Result<Self> {
        self.input_mode = input_mode;
        self.input_range = input_range;
        self.validate()?;
        Ok(self)
    }

    /// Check rate, block size and channel set.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(AcquisitionError::InvalidConfig(format!(
                "sample rate must be within {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz (got {})",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(AcquisitionError::InvalidConfig(
                "block size must be positive".to_string(),
            ));
        }
        if self.channels.is_empty() {
            return Err(AcquisitionError::InvalidConfig(
                "channel set must not be empty".to_string(),
            ));
        }

        let max_channel = self.input_mode.max_channel_index();
        let mut seen = HashSet::with_capacity(self.channels.len());
        for &channel in &self.channels {
            if channel > max_channel {
                return Err(AcquisitionError::InvalidConfig(format!(
                    "channel {channel} out of range for {:?} input (max {max_channel})",
                    self.input_mode
                )));
            }
            if !seen.insert(channel) {
                return Err(AcquisitionError::InvalidConfig(format!(
                    "channel {channel} listed twice"
                )));
            }
        }
        Ok(())
    }

    /// Copy of this configuration with a new rate and block size.
    pub fn with_timing(&self, sample_rate: f64, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            ..self.clone()
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Channel bitmask as expected by scan-start calls of HAT-style devices.
    pub fn channel_mask(&self) -> u8 {
        self.channels
            .iter()
            .fold(0u8, |mask, &channel| mask | (1u8 << channel))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channels: vec![1],
            sample_rate: 10_000.0,
            block_size: 10_000,
            input_mode: InputMode::SingleEnded,
            input_range: InputRange::Bip1V,
        }
    }
}

/// What the engine does when the device reports a hardware overrun.
///
/// Buffer overruns always restart the scan. Hardware overruns mean samples
/// were lost inside the device itself; `Report` hands the degraded block to
/// the caller and keeps the scan going, `Restart` treats it like a buffer
/// overrun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareOverrunPolicy {
    #[default]
    Report,
    Restart,
}
