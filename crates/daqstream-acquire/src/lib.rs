//! Continuous multi-channel acquisition.
//!
//! - [`source`]: the device seam ([`SampleSource`]) and a simulated device
//! - [`engine`]: scan lifecycle, overrun recovery, live reconfiguration
//! - [`spectrum`]: Welch power spectral density per channel
//! - [`recorder`]: append-only text table of recorded samples

pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod recorder;
pub mod source;
pub mod spectrum;

pub use block::{OverrunStatus, SampleBlock, SENTINEL_VALUE};
pub use config::{
    ChannelConfig, HardwareOverrunPolicy, InputMode, InputRange, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
};
pub use engine::{AcquisitionEngine, ScanState};
pub use error::{AcquisitionError, RecordError, Result, SpectrumError};
pub use recorder::{format_sci, record, RecordSummary, RecordingSink, MAX_CONSECUTIVE_OVERRUNS};
pub use source::{RawRead, SampleSource, SimulatedSource, SourceError};
pub use spectrum::{estimate, SpectrumEstimate, WelchEstimator};
