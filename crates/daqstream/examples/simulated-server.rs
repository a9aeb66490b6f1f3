//! Serve a simulated four-channel board on 127.0.0.1:8000 until Ctrl-C.
//!
//! Run with:
//!   cargo run --example simulated-server
//!
//! In another terminal:
//!   cargo run --example spectrum-client

use std::sync::Arc;

use daqstream::acquire::{AcquisitionEngine, SimulatedSource};
use daqstream::server::{ServerConfig, StreamServer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig {
        bind: "127.0.0.1:8000".to_string(),
        channels: vec![0, 1, 2, 3],
        sample_rate: 4096.0,
        block_size: 4096,
        ..ServerConfig::default()
    };

    let source = SimulatedSource::new(440.0, 0.5).with_noise(0.01).realtime(true);
    let engine = AcquisitionEngine::open(
        source,
        config.channel_config()?,
        config.hardware_overrun,
    )?;

    let server = StreamServer::bind(config, Arc::new(engine))?;
    eprintln!("Listening on {}", server.local_addr());

    // Serve one client, then exit.
    let summary = server.serve_one()?;
    eprintln!(
        "Client left after {} command(s), {} degraded",
        summary.commands, summary.degraded
    );
    Ok(())
}
