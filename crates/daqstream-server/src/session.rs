use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use daqstream_acquire::{
    record, AcquisitionEngine, RecordingSink, SampleBlock, WelchEstimator, SENTINEL_VALUE,
};
use daqstream_frame::{Frame, FrameError, FrameReader, FrameWriter};
use daqstream_transport::DaqStream;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::hello::{send_hello, ServerHello};

/// How often an idle session wakes up to check for shutdown.
pub const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// State shared by every session of one server.
#[derive(Debug)]
pub struct ServerContext {
    pub engine: Arc<AcquisitionEngine>,
    pub config: ServerConfig,
    estimator: WelchEstimator,
    running: Arc<AtomicBool>,
}

impl ServerContext {
    pub fn new(engine: Arc<AcquisitionEngine>, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let estimator = WelchEstimator::new(config.segment_length)?;
        Ok(Self {
            engine,
            config,
            estimator,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Flag cleared to stop accepting and to end idle sessions.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub commands: u64,
    pub degraded: u64,
    pub unknown: u64,
}

/// A two-frame reply.
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Arrays(Vec<f64>, Vec<f64>),
    Degraded,
}

/// One client connection: announce configuration, then serve commands until
/// the client leaves, the stream breaks or the server shuts down.
pub struct Session<'a> {
    ctx: &'a ServerContext,
    peer: SocketAddr,
    reader: FrameReader<DaqStream>,
    writer: FrameWriter<DaqStream>,
    summary: SessionSummary,
}

impl<'a> Session<'a> {
    pub fn new(ctx: &'a ServerContext, stream: DaqStream) -> Result<Self> {
        let peer = stream.peer_addr();
        let frame_config = ctx.config.frame_config(SESSION_POLL_INTERVAL);
        let reader_stream = stream.try_clone()?;

        let reader = FrameReader::with_config_stream(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_stream(stream, frame_config)?;

        Ok(Self {
            ctx,
            peer,
            reader,
            writer,
            summary: SessionSummary::default(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Run to completion. Clean disconnects and shutdown return `Ok`;
    /// protocol and I/O failures return the error after logging it.
    pub fn run(mut self) -> Result<SessionSummary> {
        let peer = self.peer;
        info!(%peer, "client connected");

        let result = self.serve();
        let _ = self.writer.get_ref().shutdown();

        match &result {
            Ok(()) => info!(
                %peer,
                commands = self.summary.commands,
                degraded = self.summary.degraded,
                "client disconnected"
            ),
            Err(err) => error!(%peer, error = %err, "session closed on error"),
        }
        result.map(|()| self.summary)
    }

    fn serve(&mut self) -> Result<()> {
        let hello = ServerHello::new(&self.ctx.engine.config(), self.ctx.config.segment_length);
        send_hello(&mut self.writer, &hello)?;
        debug!(peer = %self.peer, ?hello, "configuration sent");

        while let Some(frame) = self.next_frame()? {
            let command = Command::decode(&frame.payload)?;
            self.summary.commands += 1;
            self.dispatch(command)?;
        }
        Ok(())
    }

    /// Next command frame, or `None` when the client closed the stream, the
    /// idle timeout expired or the server is shutting down.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let idle_since = Instant::now();
        loop {
            match self.reader.read_frame() {
                Ok(frame) => return Ok(Some(frame)),
                Err(FrameError::ConnectionClosed) => return Ok(None),
                Err(FrameError::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    if !self.ctx.is_running() {
                        info!(peer = %self.peer, "closing session for shutdown");
                        return Ok(None);
                    }
                    if let Some(limit) = self.ctx.config.idle_timeout() {
                        if idle_since.elapsed() >= limit {
                            info!(peer = %self.peer, idle = ?limit, "closing idle session");
                            return Ok(None);
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        debug!(peer = %self.peer, tag = command.tag(), command = command.name(), "command");
        let reply = match command {
            Command::Stream => self.stream(),
            Command::Spectrum => self.spectrum(),
            Command::Reconfigure {
                sample_rate,
                block_size,
            } => self.reconfigure(sample_rate, block_size),
            Command::Save => {
                self.save();
                return Ok(());
            }
            Command::Unknown(tag) => {
                self.summary.unknown += 1;
                warn!(peer = %self.peer, tag, "ignoring unknown command tag");
                return Ok(());
            }
        };
        self.send_reply(reply)
    }

    fn send_reply(&mut self, reply: Reply) -> Result<()> {
        match reply {
            Reply::Arrays(first, second) => {
                self.writer.send_array(&first)?;
                self.writer.send_array(&second)?;
            }
            Reply::Degraded => {
                self.summary.degraded += 1;
                self.writer.send_array(&[SENTINEL_VALUE])?;
                self.writer.send_array(&[SENTINEL_VALUE])?;
            }
        }
        Ok(())
    }

    /// A full block, or `None` after logging why there is none.
    fn read_block(&self) -> Option<SampleBlock> {
        match self.ctx.engine.read_block(self.ctx.config.read_timeout()) {
            Ok((block, status)) if !status.is_overrun() => Some(block),
            Ok((_, status)) => {
                warn!(peer = %self.peer, ?status, "sending degraded block");
                None
            }
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "block read failed");
                None
            }
        }
    }

    fn stream(&self) -> Reply {
        match self.read_block() {
            Some(block) => Reply::Arrays(block.time().to_vec(), block.flatten()),
            None => Reply::Degraded,
        }
    }

    fn spectrum(&self) -> Reply {
        let Some(block) = self.read_block() else {
            return Reply::Degraded;
        };
        match self.ctx.estimator.estimate(&block, block.sample_rate()) {
            Ok(spectrum) => Reply::Arrays(spectrum.frequencies.to_vec(), spectrum.flatten_power()),
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "spectrum estimate failed");
                Reply::Degraded
            }
        }
    }

    fn reconfigure(&self, sample_rate: f64, block_size: usize) -> Reply {
        let segment_length = self.ctx.config.segment_length;
        if block_size < segment_length {
            warn!(
                peer = %self.peer,
                rate = sample_rate,
                block_size,
                segment_length,
                "reconfigure rejected: block shorter than spectrum segment"
            );
            return Reply::Degraded;
        }
        let payload = block_size.saturating_mul(self.ctx.engine.config().num_channels() * 8);
        if payload > self.ctx.config.max_payload_size {
            warn!(
                peer = %self.peer,
                block_size,
                max = self.ctx.config.max_payload_size,
                "reconfigure rejected: block exceeds frame limit"
            );
            return Reply::Degraded;
        }

        match self.ctx.engine.reconfigure(sample_rate, block_size) {
            Ok(config) => {
                info!(peer = %self.peer, rate = config.sample_rate, block_size = config.block_size, "reconfigured");
                self.stream()
            }
            Err(err) => {
                warn!(peer = %self.peer, rate = sample_rate, block_size, error = %err, "reconfigure rejected");
                Reply::Degraded
            }
        }
    }

    fn save(&self) {
        let config = &self.ctx.config;
        let num_channels = self.ctx.engine.config().num_channels();
        let mut sink = match RecordingSink::open(&config.record_path, num_channels) {
            Ok(sink) => sink,
            Err(err) => {
                warn!(
                    peer = %self.peer,
                    path = %config.record_path.display(),
                    error = %err,
                    "cannot open recording file"
                );
                return;
            }
        };

        match record(
            &self.ctx.engine,
            &mut sink,
            config.record_samples,
            config.read_timeout(),
        ) {
            Ok(summary) => info!(
                peer = %self.peer,
                samples = summary.samples,
                skipped = summary.skipped_blocks,
                "save complete"
            ),
            Err(err) => warn!(peer = %self.peer, error = %err, "save failed"),
        }
    }
}

/// Serve one accepted connection to completion.
pub fn serve_connection(ctx: &ServerContext, stream: DaqStream) -> Result<SessionSummary> {
    let peer = stream.peer_addr();
    Session::new(ctx, stream)
        .inspect_err(|err| error!(%peer, error = %err, "session setup failed"))?
        .run()
}
