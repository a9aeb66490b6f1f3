use std::f64::consts::TAU;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::block::SampleBlock;
use crate::error::SpectrumError;

/// Welch power spectral density of every channel of one block.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumEstimate {
    /// Bin centres in Hz, `segment_length / 2 + 1` of them.
    pub frequencies: Arc<[f64]>,
    /// One density row per channel, aligned with `frequencies` (V²/Hz).
    pub power: Vec<Vec<f64>>,
}

impl SpectrumEstimate {
    pub fn num_bins(&self) -> usize {
        self.frequencies.len()
    }

    /// Row-major copy of the power rows, ready for framing.
    pub fn flatten_power(&self) -> Vec<f64> {
        self.power.iter().flatten().copied().collect()
    }

    /// Frequency of the strongest bin of `channel`.
    pub fn peak_frequency(&self, channel: usize) -> Option<f64> {
        let row = self.power.get(channel)?;
        let (index, _) = row
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))?;
        self.frequencies.get(index).copied()
    }
}

/// Welch estimator for a fixed segment length.
///
/// Segments overlap by half and are mean-detrended and Hann-windowed
/// (periodic). Periodograms use one-sided density scaling and are averaged.
/// The window and FFT plan are built once; the frequency axis is cached per
/// sample rate and shared between estimates.
pub struct WelchEstimator {
    segment_length: usize,
    window: Vec<f64>,
    window_power: f64,
    fft: Arc<dyn Fft<f64>>,
    frequencies: Mutex<Option<(f64, Arc<[f64]>)>>,
}

impl WelchEstimator {
    pub fn new(segment_length: usize) -> Result<Self, SpectrumError> {
        if segment_length == 0 {
            return Err(SpectrumError::InvalidSegment);
        }

        let window = hann_periodic(segment_length);
        let window_power = window.iter().map(|w| w * w).sum();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(segment_length);

        Ok(Self {
            segment_length,
            window,
            window_power,
            fft,
            frequencies: Mutex::new(None),
        })
    }

    pub fn segment_length(&self) -> usize {
        self.segment_length
    }

    /// Number of one-sided bins.
    pub fn num_bins(&self) -> usize {
        self.segment_length / 2 + 1
    }

    /// Bin centres `k * fs / segment_length`.
    pub fn frequencies(&self, sample_rate: f64) -> Result<Arc<[f64]>, SpectrumError> {
        check_rate(sample_rate)?;

        let mut cached = self
            .frequencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((rate, axis)) = cached.as_ref() {
            if *rate == sample_rate {
                return Ok(Arc::clone(axis));
            }
        }

        let step = sample_rate / self.segment_length as f64;
        let axis: Arc<[f64]> = (0..self.num_bins()).map(|k| k as f64 * step).collect();
        *cached = Some((sample_rate, Arc::clone(&axis)));
        Ok(axis)
    }

    /// Estimate every channel of `block`.
    pub fn estimate(
        &self,
        block: &SampleBlock,
        sample_rate: f64,
    ) -> Result<SpectrumEstimate, SpectrumError> {
        let frequencies = self.frequencies(sample_rate)?;
        let power = block
            .data()
            .iter()
            .map(|row| self.density(row, sample_rate))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SpectrumEstimate { frequencies, power })
    }

    /// One-sided power spectral density of a single channel.
    pub fn density(&self, samples: &[f64], sample_rate: f64) -> Result<Vec<f64>, SpectrumError> {
        check_rate(sample_rate)?;
        let n = self.segment_length;
        if samples.len() < n {
            return Err(SpectrumError::InsufficientSamples {
                segment_length: n,
                available: samples.len(),
            });
        }

        let step = n - n / 2;
        let segments = (samples.len() - n) / step + 1;
        let bins = self.num_bins();
        let mut accum = vec![0.0; bins];
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];

        for segment in samples.windows(n).step_by(step).take(segments) {
            let mean = segment.iter().sum::<f64>() / n as f64;
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex64::new((x - mean) * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (acc, bin) in accum.iter_mut().zip(&buffer) {
                *acc += bin.norm_sqr();
            }
        }

        let scale = 1.0 / (sample_rate * self.window_power * segments as f64);
        // Even lengths have an unpaired Nyquist bin.
        let doubled_end = if n % 2 == 0 { bins - 1 } else { bins };
        for (k, value) in accum.iter_mut().enumerate() {
            *value *= scale;
            if k > 0 && k < doubled_end {
                *value *= 2.0;
            }
        }
        Ok(accum)
    }
}

impl fmt::Debug for WelchEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WelchEstimator")
            .field("segment_length", &self.segment_length)
            .finish_non_exhaustive()
    }
}

/// One-shot estimate; builds a fresh [`WelchEstimator`].
pub fn estimate(
    block: &SampleBlock,
    sample_rate: f64,
    segment_length: usize,
) -> Result<SpectrumEstimate, SpectrumError> {
    WelchEstimator::new(segment_length)?.estimate(block, sample_rate)
}

fn hann_periodic(n: usize) -> Vec<f64> {
    // A one-point Hann window would be all zero.
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (TAU * i as f64 / n as f64).cos())
        .collect()
}

fn check_rate(sample_rate: f64) -> Result<(), SpectrumError> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(SpectrumError::InvalidSampleRate(sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;

    fn block_of(channels: &[Vec<f64>], rate: f64) -> SampleBlock {
        let samples = channels[0].len();
        let config = ChannelConfig::new((0..channels.len() as u8).collect(), rate, samples).unwrap();
        let interleaved: Vec<f64> = (0..samples)
            .flat_map(|i| channels.iter().map(move |row| row[i]))
            .collect();
        SampleBlock::from_interleaved(&config, &interleaved)
    }

    fn sine(freq: f64, amplitude: f64, offset: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| offset + amplitude * (TAU * freq * i as f64 / rate).sin())
            .collect()
    }

    #[test]
    fn sinusoid_peak_within_one_bin() {
        let rate = 1000.0;
        let block = block_of(&[sine(123.0, 1.0, 0.0, rate, 4096)], rate);

        let spectrum = estimate(&block, rate, 256).unwrap();
        let peak = spectrum.peak_frequency(0).unwrap();
        assert!((peak - 123.0).abs() <= rate / 256.0, "peak at {peak}");
    }

    #[test]
    fn shape_and_axis() {
        let rate = 8000.0;
        let block = block_of(&[vec![0.0; 1024], vec![0.0; 1024]], rate);
        let spectrum = estimate(&block, rate, 256).unwrap();

        assert_eq!(spectrum.num_bins(), 129);
        assert_eq!(spectrum.power.len(), 2);
        assert!(spectrum.power.iter().all(|row| row.len() == 129));
        assert_eq!(spectrum.frequencies[0], 0.0);
        assert_eq!(spectrum.frequencies[128], rate / 2.0);
        assert_eq!(spectrum.flatten_power().len(), 258);
    }

    #[test]
    fn constant_offset_is_detrended() {
        let rate = 1000.0;
        let block = block_of(&[vec![5.0; 2048]], rate);
        let spectrum = estimate(&block, rate, 128).unwrap();
        assert!(spectrum.power[0].iter().all(|p| p.abs() < 1e-20));
    }

    #[test]
    fn density_integrates_to_signal_power() {
        let rate = 2000.0;
        let amplitude = 2.0;
        let block = block_of(&[sine(250.0, amplitude, 0.3, rate, 8192)], rate);
        let spectrum = estimate(&block, rate, 512).unwrap();

        let df = rate / 512.0;
        let total: f64 = spectrum.power[0].iter().sum::<f64>() * df;
        let expected = amplitude * amplitude / 2.0;
        assert!((total - expected).abs() / expected < 0.02, "total {total}");
    }

    #[test]
    fn rejects_short_blocks_and_bad_parameters() {
        let block = block_of(&[vec![0.0; 100]], 1000.0);
        assert_eq!(
            estimate(&block, 1000.0, 256).unwrap_err(),
            SpectrumError::InsufficientSamples {
                segment_length: 256,
                available: 100
            }
        );
        assert_eq!(estimate(&block, 1000.0, 0).unwrap_err(), SpectrumError::InvalidSegment);
        assert_eq!(
            estimate(&block, 0.0, 64).unwrap_err(),
            SpectrumError::InvalidSampleRate(0.0)
        );
    }

    #[test]
    fn sentinel_block_is_insufficient() {
        let estimator = WelchEstimator::new(16).unwrap();
        let err = estimator.estimate(&SampleBlock::sentinel(), 1000.0).unwrap_err();
        assert!(matches!(err, SpectrumError::InsufficientSamples { available: 1, .. }));
    }

    #[test]
    fn frequency_axis_is_shared_per_rate() {
        let estimator = WelchEstimator::new(64).unwrap();
        let a = estimator.frequencies(1000.0).unwrap();
        let b = estimator.frequencies(1000.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = estimator.frequencies(2000.0).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c[1], 2000.0 / 64.0);
    }

    #[test]
    fn segment_equal_to_block_uses_one_segment() {
        let rate = 512.0;
        let block = block_of(&[sine(64.0, 1.0, 0.0, rate, 256)], rate);
        let spectrum = estimate(&block, rate, 256).unwrap();
        assert_eq!(spectrum.peak_frequency(0), Some(64.0));
    }

    #[test]
    fn single_sample_segments_stay_finite() {
        let rate = 1000.0;
        let block = block_of(&[sine(100.0, 1.0, 0.5, rate, 8)], rate);

        let spectrum = estimate(&block, rate, 1).unwrap();
        assert_eq!(spectrum.num_bins(), 1);
        assert_eq!(&spectrum.frequencies[..], &[0.0]);
        assert!(spectrum.power[0].iter().all(|p| p.is_finite()));
    }
}
