//! Fetch one block and one spectrum from a running server.
//!
//! Run with:
//!   cargo run --example spectrum-client -- 127.0.0.1:8000

use daqstream::server::StreamClient;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8000".to_string());

    let mut client = StreamClient::connect(&addr)?;
    let hello = client.hello().clone();
    eprintln!(
        "Connected: channels={:?} rate={} block={}",
        hello.channels, hello.sample_rate, hello.block_size
    );

    let block = client.stream()?;
    for (channel, row) in hello.channels.iter().zip(block.rows(hello.num_channels())) {
        let rms = (row.iter().map(|v| v * v).sum::<f64>() / row.len() as f64).sqrt();
        eprintln!("ch.{channel}: {} samples, rms {rms:.4} V", row.len());
    }

    let spectrum = client.spectrum()?;
    for (channel, row) in hello.channels.iter().zip(spectrum.rows(hello.num_channels())) {
        let peak = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| spectrum.axis[bin]);
        eprintln!("ch.{channel}: peak at {peak:?} Hz");
    }

    client.close()?;
    Ok(())
}
