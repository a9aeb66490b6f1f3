use std::time::Duration;

use crate::source::SourceError;

/// Errors raised by the acquisition engine.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// No sample source could be bound or started.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Rate, block size or channel set is not acceptable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A read was issued while no scan is running.
    #[error("scan is not running")]
    NotRunning,

    /// The source did not deliver a full block before the timeout.
    #[error("read timed out after {timeout:?} ({received} of {requested} samples)")]
    ReadTimeout {
        requested: usize,
        received: usize,
        timeout: Duration,
    },

    /// The source reported a fault while reading.
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

/// Errors raised by the spectral estimator.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SpectrumError {
    /// The block holds fewer samples per channel than one segment.
    #[error("insufficient samples: segment length {segment_length} exceeds {available} samples")]
    InsufficientSamples {
        segment_length: usize,
        available: usize,
    },

    /// A zero-length segment was requested.
    #[error("segment length must be greater than zero")]
    InvalidSegment,

    /// The sample rate is not a positive finite number.
    #[error("sample rate must be positive and finite (got {0})")]
    InvalidSampleRate(f64),
}

/// Errors raised while recording samples to storage.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Writing the recording file failed.
    #[error("recording I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading from the engine failed.
    #[error("recording aborted: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Too many degraded blocks in a row.
    #[error("recording aborted after {0} consecutive overruns")]
    TooManyOverruns(usize),
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
