use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::block::SampleBlock;
use crate::engine::AcquisitionEngine;
use crate::error::RecordError;

/// Consecutive overrun blocks tolerated before a recording gives up.
pub const MAX_CONSECUTIVE_OVERRUNS: usize = 8;

/// Append-only comma separated table of recorded samples.
///
/// Each row is the elapsed time in seconds followed by one value per
/// channel, formatted like C's `%e`. A header row is written when the file is
/// new or empty; existing contents are never truncated.
#[derive(Debug)]
pub struct RecordingSink {
    path: PathBuf,
    writer: BufWriter<File>,
    num_channels: usize,
    rows_written: u64,
}

impl RecordingSink {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn open(path: impl AsRef<Path>, num_channels: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut sink = Self {
            path,
            writer: BufWriter::new(file),
            num_channels,
            rows_written: 0,
        };
        if is_empty {
            sink.write_header()?;
        }
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Rows appended through this handle.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append the first `take` samples of `block`, stamping sample `i` with
    /// `start_secs + i / sample_rate`.
    pub fn append_block(
        &mut self,
        block: &SampleBlock,
        start_secs: f64,
        sample_rate: f64,
        take: usize,
    ) -> io::Result<usize> {
        if block.num_channels() != self.num_channels {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "block has {} channels, recording expects {}",
                    block.num_channels(),
                    self.num_channels
                ),
            ));
        }

        let take = take.min(block.samples_per_channel());
        let mut line = String::with_capacity(16 * (self.num_channels + 1));
        for i in 0..take {
            line.clear();
            line.push_str(&format_sci(start_secs + i as f64 / sample_rate));
            for row in block.data() {
                line.push(',');
                line.push_str(&format_sci(row[i]));
            }
            line.push('\n');
            self.writer.write_all(line.as_bytes())?;
        }
        self.rows_written += take as u64;
        Ok(take)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn write_header(&mut self) -> io::Result<()> {
        let mut header = String::from("Timestamp");
        for channel in 0..self.num_channels {
            header.push_str(&format!(",Sound Lvl ch.{channel} (V)"));
        }
        header.push('\n');
        self.writer.write_all(header.as_bytes())
    }
}

/// Outcome of one [`record`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub path: PathBuf,
    /// Samples written per channel.
    pub samples: usize,
    /// Overrun blocks dropped along the way.
    pub skipped_blocks: usize,
}

/// Read blocks from `engine` until `samples` samples per channel have been
/// appended to `sink`. The last block is truncated; overrun blocks are
/// skipped and do not count.
pub fn record(
    engine: &AcquisitionEngine,
    sink: &mut RecordingSink,
    samples: usize,
    timeout: Duration,
) -> Result<RecordSummary, RecordError> {
    info!(
        path = %sink.path().display(),
        samples,
        rate = engine.config().sample_rate,
        "recording started"
    );

    let mut written = 0;
    let mut elapsed_secs = 0.0;
    let mut skipped_blocks = 0;
    let mut consecutive = 0;

    while written < samples {
        let (block, status) = engine.read_block(timeout)?;
        if status.is_overrun() {
            skipped_blocks += 1;
            consecutive += 1;
            warn!(status = ?status, consecutive, "skipping degraded block while recording");
            if consecutive >= MAX_CONSECUTIVE_OVERRUNS {
                sink.flush()?;
                return Err(RecordError::TooManyOverruns(consecutive));
            }
            continue;
        }
        consecutive = 0;

        let rate = block.sample_rate();
        let appended = sink.append_block(&block, elapsed_secs, rate, samples - written)?;
        written += appended;
        elapsed_secs += appended as f64 / rate;
        debug!(appended, written, "recorded block");
    }
    sink.flush()?;

    info!(path = %sink.path().display(), samples = written, skipped_blocks, "recording finished");
    Ok(RecordSummary {
        path: sink.path().to_path_buf(),
        samples: written,
        skipped_blocks,
    })
}

/// Format like C's `%e`: six fractional digits and an exponent with an
/// explicit sign and at least two digits (`-1.250000e-03`).
pub fn format_sci(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let formatted = format!("{value:.6e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => formatted,
    }
}
