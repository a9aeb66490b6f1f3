use crate::config::ChannelConfig;

/// Value carried by a degraded (sentinel) block.
pub const SENTINEL_VALUE: f64 = 1.0;

/// Outcome of one read with respect to sample loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrunStatus {
    None,
    /// The device lost samples internally.
    HardwareOverrun,
    /// The host did not drain the device buffer fast enough.
    BufferOverrun,
}

impl OverrunStatus {
    pub fn is_overrun(self) -> bool {
        !matches!(self, OverrunStatus::None)
    }
}

/// One block of samples: `data[channel][sample]` plus the time of each sample.
///
/// Always rectangular. A sentinel block has one channel with one sample.
/// Each block carries the rate it was acquired at, so consumers never pair
/// it with a configuration that changed after the read.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    time: Vec<f64>,
    data: Vec<Vec<f64>>,
    sample_rate: f64,
}

impl SampleBlock {
    /// De-interleave a device read (`s0c0, s0c1, .., s1c0, ..`) into rows.
    ///
    /// `interleaved` must hold exactly `block_size * num_channels` values.
    pub fn from_interleaved(config: &ChannelConfig, interleaved: &[f64]) -> Self {
        let num_channels = config.num_channels();
        debug_assert_eq!(interleaved.len(), config.block_size * num_channels);

        let mut data: Vec<Vec<f64>> = (0..num_channels)
            .map(|_| Vec::with_capacity(config.block_size))
            .collect();
        for frame in interleaved.chunks_exact(num_channels) {
            for (row, &value) in data.iter_mut().zip(frame) {
                row.push(value);
            }
        }

        Self {
            time: time_axis(config.block_size, config.sample_rate),
            data,
            sample_rate: config.sample_rate,
        }
    }

    /// Degraded block returned in place of a lost read.
    pub fn sentinel() -> Self {
        Self {
            time: vec![SENTINEL_VALUE],
            data: vec![vec![SENTINEL_VALUE]],
            sample_rate: SENTINEL_VALUE,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.time.len() == 1 && self.data.len() == 1 && self.data[0] == [SENTINEL_VALUE]
    }

    /// Sample instants in seconds, starting at zero.
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Rate in Hz the block was acquired at.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Rows of samples, one per channel.
    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.data.get(index).map(Vec::as_slice)
    }

    pub fn num_channels(&self) -> usize {
        self.data.len()
    }

    pub fn samples_per_channel(&self) -> usize {
        self.time.len()
    }

    /// Row-major copy of the data, ready for framing.
    pub fn flatten(&self) -> Vec<f64> {
        self.data.iter().flatten().copied().collect()
    }
}

/// `n` sample instants `k / sample_rate` for `k = 0..n`.
pub fn time_axis(n: usize, sample_rate: f64) -> Vec<f64> {
    (0..n).map(|k| k as f64 / sample_rate).collect()
}
