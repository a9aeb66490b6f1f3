use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::block::{OverrunStatus, SampleBlock};
use crate::config::{ChannelConfig, HardwareOverrunPolicy};
use crate::error::{AcquisitionError, Result};
use crate::source::SampleSource;

/// Lifecycle of the scan owned by an [`AcquisitionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Stopped,
    Configuring,
    Running,
}

#[derive(Debug)]
struct Scan {
    state: ScanState,
    config: ChannelConfig,
}

/// Owns one sample source and runs a continuous scan on it.
///
/// Block reads hold a shared guard on the scan state for their whole
/// duration; `start`, `reconfigure` and `stop` take the exclusive guard, so a
/// reader never sees a block whose shape disagrees with the configuration it
/// was read under. The device itself is serialized behind a mutex.
///
/// Dropping the engine stops the scan.
pub struct AcquisitionEngine {
    scan: RwLock<Scan>,
    source: Mutex<Box<dyn SampleSource>>,
    policy: HardwareOverrunPolicy,
    restarts: AtomicU64,
}

impl AcquisitionEngine {
    /// Wrap a source. The scan stays stopped until [`start`](Self::start).
    pub fn new(source: impl SampleSource + 'static, policy: HardwareOverrunPolicy) -> Self {
        Self {
            scan: RwLock::new(Scan {
                state: ScanState::Stopped,
                config: ChannelConfig::default(),
            }),
            source: Mutex::new(Box::new(source)),
            policy,
            restarts: AtomicU64::new(0),
        }
    }

    /// Wrap a source and start scanning with `config`.
    pub fn open(
        source: impl SampleSource + 'static,
        config: ChannelConfig,
        policy: HardwareOverrunPolicy,
    ) -> Result<Self> {
        let engine = Self::new(source, policy);
        engine.start(config)?;
        Ok(engine)
    }

    /// Start (or restart) the scan with `config`.
    pub fn start(&self, config: ChannelConfig) -> Result<()> {
        config.validate()?;

        let mut scan = self.scan.write().unwrap_or_else(PoisonError::into_inner);
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);

        if scan.state != ScanState::Stopped {
            stop_source(source.as_mut());
        }
        scan.state = ScanState::Configuring;

        let actual_rate = match start_source(source.as_mut(), &config) {
            Ok(rate) => rate,
            Err(err) => {
                scan.state = ScanState::Stopped;
                return Err(err);
            }
        };

        info!(
            source = source.name(),
            channels = ?config.channels,
            mode = ?config.input_mode,
            range = ?config.input_range,
            rate = config.sample_rate,
            actual_rate,
            block_size = config.block_size,
            "scan started"
        );
        scan.config = config;
        scan.state = ScanState::Running;
        Ok(())
    }

    /// Read one block of `block_size` samples per channel.
    ///
    /// Overruns yield the sentinel block together with the overrun kind.
    /// A buffer overrun (and a hardware overrun under
    /// [`HardwareOverrunPolicy::Restart`]) restarts the scan with the same
    /// configuration before returning.
    pub fn read_block(&self, timeout: Duration) -> Result<(SampleBlock, OverrunStatus)> {
        let scan = self.scan.read().unwrap_or_else(PoisonError::into_inner);
        if scan.state != ScanState::Running {
            return Err(AcquisitionError::NotRunning);
        }
        let config = &scan.config;

        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = source.read(config.block_size, timeout)?;

        let status = if raw.buffer_overrun {
            OverrunStatus::BufferOverrun
        } else if raw.hardware_overrun {
            OverrunStatus::HardwareOverrun
        } else {
            OverrunStatus::None
        };

        if status.is_overrun() {
            warn!(
                source = source.name(),
                status = ?status,
                rate = config.sample_rate,
                block_size = config.block_size,
                "overrun detected"
            );
            let restart = status == OverrunStatus::BufferOverrun
                || self.policy == HardwareOverrunPolicy::Restart;
            if restart {
                stop_source(source.as_mut());
                if let Err(err) = start_source(source.as_mut(), config) {
                    drop(source);
                    drop(scan);
                    self.mark_stopped();
                    return Err(err);
                }
                let restarts = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                info!(restarts, "scan restarted after overrun");
            }
            return Ok((SampleBlock::sentinel(), status));
        }

        let expected = config.block_size * config.num_channels();
        if raw.data.len() < expected {
            return Err(AcquisitionError::ReadTimeout {
                requested: config.block_size,
                received: raw.data.len() / config.num_channels(),
                timeout,
            });
        }

        debug!(
            samples = config.block_size,
            channels = config.num_channels(),
            "block read"
        );
        Ok((
            SampleBlock::from_interleaved(config, &raw.data[..expected]),
            OverrunStatus::None,
        ))
    }

    /// Replace rate and block size while keeping the channel set.
    ///
    /// Rejected requests leave the previous configuration in place (and
    /// running, if it was). On success the scan is running with the new
    /// configuration, which is returned.
    pub fn reconfigure(&self, sample_rate: f64, block_size: usize) -> Result<ChannelConfig> {
        let mut scan = self.scan.write().unwrap_or_else(PoisonError::into_inner);
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = scan.config.clone();
        let was_running = scan.state == ScanState::Running;
        let requested = previous.with_timing(sample_rate, block_size);

        scan.state = ScanState::Configuring;
        if was_running {
            stop_source(source.as_mut());
        }

        let outcome = requested
            .validate()
            .and_then(|()| start_source(source.as_mut(), &requested));

        match outcome {
            Ok(actual_rate) => {
                info!(
                    rate = sample_rate,
                    actual_rate,
                    block_size,
                    previous_rate = previous.sample_rate,
                    previous_block_size = previous.block_size,
                    "scan reconfigured"
                );
                scan.config = requested.clone();
                scan.state = ScanState::Running;
                Ok(requested)
            }
            Err(err) => {
                warn!(rate = sample_rate, block_size, error = %err, "reconfigure rejected");
                scan.state = if was_running && start_source(source.as_mut(), &previous).is_ok() {
                    ScanState::Running
                } else {
                    ScanState::Stopped
                };
                Err(err)
            }
        }
    }

    /// Stop the scan. Calling it on a stopped engine does nothing.
    pub fn stop(&self) {
        let mut scan = self.scan.write().unwrap_or_else(PoisonError::into_inner);
        if scan.state == ScanState::Stopped {
            return;
        }
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        stop_source(source.as_mut());
        scan.state = ScanState::Stopped;
        info!(source = source.name(), "scan stopped");
    }

    /// Configuration of the current (or last) scan.
    pub fn config(&self) -> ChannelConfig {
        self.scan
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    pub fn state(&self) -> ScanState {
        self.scan.read().unwrap_or_else(PoisonError::into_inner).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ScanState::Running
    }

    pub fn policy(&self) -> HardwareOverrunPolicy {
        self.policy
    }

    /// Number of overrun-triggered restarts since construction.
    pub fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    fn mark_stopped(&self) {
        let mut scan = self.scan.write().unwrap_or_else(PoisonError::into_inner);
        scan.state = ScanState::Stopped;
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AcquisitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionEngine")
            .field("scan", &self.scan)
            .field("policy", &self.policy)
            .field("restarts", &self.restart_count())
            .finish_non_exhaustive()
    }
}

/// Start `source` and return the rate it reports.
fn start_source(source: &mut dyn SampleSource, config: &ChannelConfig) -> Result<f64> {
    source
        .start(config)
        .map_err(|err| AcquisitionError::DeviceUnavailable(err.to_string()))
}

fn stop_source(source: &mut dyn SampleSource) {
    if let Err(err) = source.stop() {
        warn!(source = source.name(), error = %err, "failed to stop scan cleanly");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::source::{RawRead, SourceError};

    #[derive(Debug, Clone, Copy)]
    enum Step {
        BufferOverrun,
        HardwareOverrun,
        Short,
    }

    #[derive(Debug, Default)]
    struct Log {
        starts: Vec<(Vec<u8>, f64, usize)>,
        stops: usize,
        script: VecDeque<Step>,
        refuse_start: bool,
    }

    /// Fills every sample with the block size it was started with.
    struct ScriptedSource {
        log: Arc<Mutex<Log>>,
        active: Option<(usize, usize)>,
    }

    impl ScriptedSource {
        fn new() -> (Self, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            (
                Self {
                    log: Arc::clone(&log),
                    active: None,
                },
                log,
            )
        }
    }

    impl SampleSource for ScriptedSource {
        fn start(&mut self, config: &ChannelConfig) -> std::result::Result<f64, SourceError> {
            let mut log = self.log.lock().unwrap();
            if log.refuse_start {
                return Err(SourceError::Unavailable("no board".to_string()));
            }
            log.starts
                .push((config.channels.clone(), config.sample_rate, config.block_size));
            self.active = Some((config.num_channels(), config.block_size));
            Ok(config.sample_rate)
        }

        fn read(&mut self, samples: usize, _timeout: Duration) -> std::result::Result<RawRead, SourceError> {
            let (channels, block) = self.active.ok_or(SourceError::NotStarted)?;
            assert_eq!(samples, block, "read size must follow the active scan");
            let step = self.log.lock().unwrap().script.pop_front();
            let mut read = RawRead {
                data: vec![block as f64; samples * channels],
                ..RawRead::default()
            };
            match step {
                Some(Step::BufferOverrun) => read.buffer_overrun = true,
                Some(Step::HardwareOverrun) => read.hardware_overrun = true,
                Some(Step::Short) => read.data.truncate(channels),
                None => {}
            }
            Ok(read)
        }

        fn stop(&mut self) -> std::result::Result<(), SourceError> {
            self.active = None;
            self.log.lock().unwrap().stops += 1;
            Ok(())
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn running_engine(policy: HardwareOverrunPolicy) -> (AcquisitionEngine, Arc<Mutex<Log>>) {
        let (source, log) = ScriptedSource::new();
        let config = ChannelConfig::new(vec![0, 1], 1000.0, 100).unwrap();
        let engine = AcquisitionEngine::open(source, config, policy).unwrap();
        (engine, log)
    }

    #[test]
    fn read_returns_full_block() {
        let (engine, _log) = running_engine(HardwareOverrunPolicy::Report);
        let (block, status) = engine.read_block(TIMEOUT).unwrap();

        assert_eq!(status, OverrunStatus::None);
        assert_eq!(block.num_channels(), 2);
        assert_eq!(block.samples_per_channel(), 100);
        assert!((block.time()[99] - 0.099).abs() < 1e-12);
    }

    #[test]
    fn read_before_start_is_not_running() {
        let (source, _log) = ScriptedSource::new();
        let engine = AcquisitionEngine::new(source, HardwareOverrunPolicy::Report);
        assert_eq!(engine.state(), ScanState::Stopped);
        assert!(matches!(
            engine.read_block(TIMEOUT),
            Err(AcquisitionError::NotRunning)
        ));
    }

    #[test]
    fn start_refused_by_device() {
        let (source, log) = ScriptedSource::new();
        log.lock().unwrap().refuse_start = true;
        let err = AcquisitionEngine::open(source, ChannelConfig::default(), HardwareOverrunPolicy::Report)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::DeviceUnavailable(_)));
    }

    #[test]
    fn start_rejects_invalid_config() {
        let (source, log) = ScriptedSource::new();
        let engine = AcquisitionEngine::new(source, HardwareOverrunPolicy::Report);
        let bad = ChannelConfig {
            channels: vec![0, 0],
            sample_rate: 1000.0,
            block_size: 10,
            ..ChannelConfig::default()
        };
        assert!(matches!(engine.start(bad), Err(AcquisitionError::InvalidConfig(_))));
        assert!(log.lock().unwrap().starts.is_empty());
    }

    #[test]
    fn buffer_overrun_restarts_with_same_config() {
        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        log.lock().unwrap().script.push_back(Step::BufferOverrun);

        let (block, status) = engine.read_block(TIMEOUT).unwrap();
        assert_eq!(status, OverrunStatus::BufferOverrun);
        assert!(block.is_sentinel());
        assert_eq!(engine.restart_count(), 1);

        {
            let log = log.lock().unwrap();
            assert_eq!(log.starts.len(), 2);
            assert_eq!(log.starts[0], log.starts[1]);
            assert_eq!(log.stops, 1);
        }

        let (block, status) = engine.read_block(TIMEOUT).unwrap();
        assert_eq!(status, OverrunStatus::None);
        assert_eq!(block.samples_per_channel(), 100);
        assert_eq!(engine.config().block_size, 100);
    }

    #[test]
    fn hardware_overrun_follows_policy() {
        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        log.lock().unwrap().script.push_back(Step::HardwareOverrun);
        let (block, status) = engine.read_block(TIMEOUT).unwrap();
        assert_eq!(status, OverrunStatus::HardwareOverrun);
        assert!(block.is_sentinel());
        assert_eq!(log.lock().unwrap().starts.len(), 1);

        let (engine, log) = running_engine(HardwareOverrunPolicy::Restart);
        log.lock().unwrap().script.push_back(Step::HardwareOverrun);
        let (_, status) = engine.read_block(TIMEOUT).unwrap();
        assert_eq!(status, OverrunStatus::HardwareOverrun);
        assert_eq!(log.lock().unwrap().starts.len(), 2);
        assert_eq!(engine.restart_count(), 1);
    }

    #[test]
    fn short_read_is_timeout() {
        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        log.lock().unwrap().script.push_back(Step::Short);

        let err = engine.read_block(TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::ReadTimeout {
                requested: 100,
                received: 1,
                ..
            }
        ));
        assert!(engine.is_running());
    }

    #[test]
    fn reconfigure_applies_new_timing() {
        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        let config = engine.reconfigure(2000.0, 50).unwrap();

        assert_eq!(config.channels, vec![0, 1]);
        assert_eq!(config.sample_rate, 2000.0);
        assert_eq!(engine.config(), config);
        assert_eq!(log.lock().unwrap().starts.last().unwrap().2, 50);

        let (block, _) = engine.read_block(TIMEOUT).unwrap();
        assert_eq!(block.samples_per_channel(), 50);
        assert!((block.time()[1] - 1.0 / 2000.0).abs() < 1e-12);
    }

    #[test]
    fn reconfigure_rejects_invalid_and_restores() {
        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        let before = engine.config();

        for (rate, block) in [(0.0, 100), (-5.0, 100), (1e-300, 16), (1e9, 100), (1000.0, 0)] {
            let err = engine.reconfigure(rate, block).unwrap_err();
            assert!(matches!(err, AcquisitionError::InvalidConfig(_)));
            assert_eq!(engine.config(), before);
            assert!(engine.is_running());
        }

        let log = log.lock().unwrap();
        let (channels, rate, block) = log.starts.last().unwrap();
        assert_eq!((channels.as_slice(), *rate, *block), (&[0u8, 1][..], 1000.0, 100));
    }

    #[test]
    fn paced_source_survives_absurd_rate_request() {
        let source = crate::source::SimulatedSource::new(10.0, 1.0).realtime(true);
        let config = ChannelConfig::new(vec![0], 1000.0, 20).unwrap();
        let engine = AcquisitionEngine::open(source, config.clone(), HardwareOverrunPolicy::Report)
            .unwrap();

        let err = engine.reconfigure(1e-300, 16).unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidConfig(_)));
        assert_eq!(engine.config(), config);

        let (block, status) = engine.read_block(TIMEOUT).unwrap();
        assert_eq!(status, OverrunStatus::None);
        assert_eq!(block.samples_per_channel(), 20);
        assert_eq!(block.sample_rate(), 1000.0);
    }

    #[test]
    fn reconfigure_is_atomic_under_concurrent_reads() {
        let (engine, _log) = running_engine(HardwareOverrunPolicy::Report);
        let engine = Arc::new(engine);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let (block, _) = engine.read_block(TIMEOUT).unwrap();
                        let samples = block.samples_per_channel();
                        // The scripted source stamps each sample with its block size,
                        // and the rate is always ten times the block size.
                        assert!(block.data().iter().all(|row| row.len() == samples));
                        assert!(block.data()[0].iter().all(|&v| v == samples as f64));
                        assert!((block.time()[1] * samples as f64 * 10.0 - 1.0).abs() < 1e-9);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let block = if i % 2 == 0 { 64 } else { 100 };
            engine.reconfigure(block as f64 * 10.0, block).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn stop_is_idempotent_and_drop_stops() {
        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), ScanState::Stopped);
        assert_eq!(log.lock().unwrap().stops, 1);
        drop(engine);
        assert_eq!(log.lock().unwrap().stops, 1);

        let (engine, log) = running_engine(HardwareOverrunPolicy::Report);
        drop(engine);
        assert_eq!(log.lock().unwrap().stops, 1);
    }
}
