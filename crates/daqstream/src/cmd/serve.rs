use std::sync::Arc;

use daqstream_acquire::{AcquisitionEngine, SimulatedSource};
use daqstream_server::{ServerConfig, ServerHello, ShutdownHandle, StreamServer};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{acquisition_error, server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args)?;

    let source = SimulatedSource::new(args.signal_hz, args.amplitude)
        .with_noise(args.noise)
        .realtime(!args.no_pacing);
    let channel_config = config
        .channel_config()
        .map_err(|err| server_error("invalid configuration", err))?;
    let engine = AcquisitionEngine::open(source, channel_config, config.hardware_overrun)
        .map_err(|err| acquisition_error("acquisition start failed", err))?;
    let engine = Arc::new(engine);

    let hello = ServerHello::new(&engine.config(), config.segment_length);
    let server = StreamServer::bind(config, Arc::clone(&engine))
        .map_err(|err| server_error("bind failed", err))?;
    print_listening(server.local_addr(), &hello, format);

    install_ctrlc_handler(server.shutdown_handle())?;

    if args.once {
        server
            .serve_one()
            .map_err(|err| server_error("session failed", err))?;
    } else {
        server
            .serve()
            .map_err(|err| server_error("server failed", err))?;
    }

    drop(server);
    engine.stop();
    info!(restarts = engine.restart_count(), "acquisition stopped");
    Ok(SUCCESS)
}

/// Defaults, then the JSON file, then command-line flags.
fn load_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_json_file(path).map_err(|err| {
            server_error(&format!("cannot load {}", path.display()), err)
        })?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(channels) = &args.channels {
        config.channels = channels.clone();
    }
    if let Some(mode) = args.input_mode {
        config.input_mode = mode.into();
    }
    if let Some(range) = args.input_range {
        config.input_range = range.into();
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if let Some(segment_length) = args.segment_length {
        config.segment_length = segment_length;
    }
    if let Some(path) = &args.record_path {
        config.record_path = path.clone();
    }
    if let Some(samples) = args.record_samples {
        config.record_samples = samples;
    }
    if let Some(policy) = args.hardware_overrun {
        config.hardware_overrun = policy.into();
    }

    config
        .validate()
        .map_err(|err| server_error("invalid configuration", err))?;
    Ok(config)
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::exit::USAGE;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn args(extra: &[&str]) -> ServeArgs {
        let argv = std::iter::once("serve").chain(extra.iter().copied());
        Harness::parse_from(argv).args
    }

    #[test]
    fn flags_override_defaults() {
        let config = load_config(&args(&[
            "--bind",
            "127.0.0.1:0",
            "--channels",
            "0,1,2,3",
            "--block-size",
            "4096",
            "--hardware-overrun",
            "restart",
        ]))
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:0");
        assert_eq!(config.channels, vec![0, 1, 2, 3]);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.sample_rate, 10_000.0);
        assert_eq!(
            config.hardware_overrun,
            daqstream_acquire::HardwareOverrunPolicy::Restart
        );
    }

    #[test]
    fn input_flags_reach_scan_config() {
        let config = load_config(&args(&[
            "--channels",
            "0,3",
            "--input-mode",
            "differential",
            "--input-range",
            "bip-5v",
        ]))
        .unwrap();
        let scan = config.channel_config().unwrap();
        assert_eq!(scan.input_mode, daqstream_acquire::InputMode::Differential);
        assert_eq!(scan.input_range, daqstream_acquire::InputRange::Bip5V);

        let err = load_config(&args(&["--channels", "6", "--input-mode", "differential"]))
            .unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn segment_longer_than_block_is_usage_error() {
        let err = load_config(&args(&["--block-size", "100", "--segment-length", "256"]))
            .unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn file_then_flags() {
        let dir = std::env::temp_dir().join(format!("daqstream-serve-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.json");
        std::fs::write(&path, r#"{"sample_rate": 2000, "block_size": 1000}"#).unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let config = load_config(&args(&["--config", &path_arg, "--block-size", "512"])).unwrap();
        assert_eq!(config.sample_rate, 2000.0);
        assert_eq!(config.block_size, 512);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
