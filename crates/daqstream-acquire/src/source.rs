use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::ChannelConfig;

/// Errors reported by a sample source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The device could not be found or opened.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// A read was issued before `start`.
    #[error("scan not started")]
    NotStarted,

    /// The device reported a fault.
    #[error("device fault: {0}")]
    Fault(String),
}

/// Result of one device read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRead {
    /// Samples interleaved by channel: `s0c0, s0c1, .., s1c0, ..`.
    pub data: Vec<f64>,
    pub hardware_overrun: bool,
    pub buffer_overrun: bool,
}

/// The device seam: anything that can run a continuous multi-channel scan.
///
/// Implementations wrap a physical driver; the engine owns one exclusively.
pub trait SampleSource: Send {
    /// Begin a continuous scan and return the rate the device actually
    /// runs at, which may differ from the requested one by clock rounding.
    fn start(&mut self, config: &ChannelConfig) -> Result<f64, SourceError>;

    /// Read `samples_per_channel` samples for every channel, waiting at most
    /// `timeout`. May return fewer samples when the timeout elapses.
    fn read(&mut self, samples_per_channel: usize, timeout: Duration)
        -> Result<RawRead, SourceError>;

    /// Stop the scan and release device buffers. Safe to call twice.
    fn stop(&mut self) -> Result<(), SourceError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "sample-source"
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveScan {
    num_channels: usize,
    sample_rate: f64,
    full_scale: f64,
    started_at: Instant,
}

/// Sine-wave generator standing in for an analog input board.
///
/// Channel `i` carries `amplitude * sin(2π f t + i·π/4)` plus optional
/// uniform noise, clipped to the configured input range. With `realtime`
/// pacing, reads block until the requested samples would have been acquired
/// by a real device at the scan rate.
#[derive(Debug)]
pub struct SimulatedSource {
    signal_hz: f64,
    amplitude: f64,
    noise: f64,
    realtime: bool,
    rng: StdRng,
    scan: Option<ActiveScan>,
    produced: u64,
}

impl SimulatedSource {
    pub fn new(signal_hz: f64, amplitude: f64) -> Self {
        Self {
            signal_hz,
            amplitude,
            noise: 0.0,
            realtime: false,
            rng: StdRng::seed_from_u64(0x5eed),
            scan: None,
            produced: 0,
        }
    }

    /// Add uniform noise in `[-noise, noise]`.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Pace reads to the scan rate instead of returning immediately.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Reseed the noise generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn is_running(&self) -> bool {
        self.scan.is_some()
    }

    fn sample(&mut self, index: u64, channel: usize, scan: &ActiveScan) -> f64 {
        let t = index as f64 / scan.sample_rate;
        let phase = channel as f64 * std::f64::consts::FRAC_PI_4;
        let clean = self.amplitude * (TAU * self.signal_hz * t + phase).sin();
        let value = if self.noise > 0.0 {
            clean + self.rng.gen_range(-self.noise..=self.noise)
        } else {
            clean
        };
        value.clamp(-scan.full_scale, scan.full_scale)
    }
}

impl SampleSource for SimulatedSource {
    fn start(&mut self, config: &ChannelConfig) -> Result<f64, SourceError> {
        if config.channels.is_empty() || config.sample_rate <= 0.0 {
            return Err(SourceError::Fault("invalid scan parameters".to_string()));
        }
        self.scan = Some(ActiveScan {
            num_channels: config.channels.len(),
            sample_rate: config.sample_rate,
            full_scale: config.input_range.full_scale(),
            started_at: Instant::now(),
        });
        self.produced = 0;
        debug!(
            channels = ?config.channels,
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            mode = ?config.input_mode,
            range = ?config.input_range,
            "simulated scan started"
        );
        Ok(config.sample_rate)
    }

    fn read(
        &mut self,
        samples_per_channel: usize,
        timeout: Duration,
    ) -> Result<RawRead, SourceError> {
        let scan = self.scan.ok_or(SourceError::NotStarted)?;

        let mut available = samples_per_channel;
        if self.realtime {
            let due_secs = (self.produced + samples_per_channel as u64) as f64 / scan.sample_rate;
            let due = Duration::try_from_secs_f64(due_secs).map_err(|err| {
                SourceError::Fault(format!("cannot pace {due_secs} s of samples: {err}"))
            })?;
            let elapsed = scan.started_at.elapsed();
            if due > elapsed {
                let wait = due - elapsed;
                if wait > timeout {
                    std::thread::sleep(timeout);
                    let reached = (scan.started_at.elapsed().as_secs_f64() * scan.sample_rate)
                        as u64;
                    available = reached.saturating_sub(self.produced) as usize;
                    available = available.min(samples_per_channel);
                } else {
                    std::thread::sleep(wait);
                }
            }
        }

        let mut data = Vec::with_capacity(available * scan.num_channels);
        for offset in 0..available as u64 {
            let index = self.produced + offset;
            for channel in 0..scan.num_channels {
                let value = self.sample(index, channel, &scan);
                data.push(value);
            }
        }
        self.produced += available as u64;

        Ok(RawRead {
            data,
            hardware_overrun: false,
            buffer_overrun: false,
        })
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        if self.scan.take().is_some() {
            debug!(produced = self.produced, "simulated scan stopped");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
