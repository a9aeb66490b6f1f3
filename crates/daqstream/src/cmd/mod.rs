use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use daqstream_acquire::{HardwareOverrunPolicy, InputMode, InputRange};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod fetch;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire from a simulated board and serve clients.
    Serve(ServeArgs),
    /// Connect to a server, send one command and print the reply.
    Fetch(FetchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Fetch(args) => fetch::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OverrunPolicyArg {
    Report,
    Restart,
}

impl From<OverrunPolicyArg> for HardwareOverrunPolicy {
    fn from(arg: OverrunPolicyArg) -> Self {
        match arg {
            OverrunPolicyArg::Report => HardwareOverrunPolicy::Report,
            OverrunPolicyArg::Restart => HardwareOverrunPolicy::Restart,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputModeArg {
    SingleEnded,
    Differential,
}

impl From<InputModeArg> for InputMode {
    fn from(arg: InputModeArg) -> Self {
        match arg {
            InputModeArg::SingleEnded => InputMode::SingleEnded,
            InputModeArg::Differential => InputMode::Differential,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputRangeArg {
    #[value(name = "bip-10v")]
    Bip10V,
    #[value(name = "bip-5v")]
    Bip5V,
    #[value(name = "bip-2v")]
    Bip2V,
    #[value(name = "bip-1v")]
    Bip1V,
}

impl From<InputRangeArg> for InputRange {
    fn from(arg: InputRangeArg) -> Self {
        match arg {
            InputRangeArg::Bip10V => InputRange::Bip10V,
            InputRangeArg::Bip5V => InputRange::Bip5V,
            InputRangeArg::Bip2V => InputRange::Bip2V,
            InputRangeArg::Bip1V => InputRange::Bip1V,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// JSON server configuration; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Listen address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Analog input channels (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    /// Input wiring.
    #[arg(long, value_enum)]
    pub input_mode: Option<InputModeArg>,
    /// Bipolar input range.
    #[arg(long, value_enum)]
    pub input_range: Option<InputRangeArg>,
    /// Samples per second per channel.
    #[arg(long)]
    pub sample_rate: Option<f64>,
    /// Samples per channel per block.
    #[arg(long)]
    pub block_size: Option<usize>,
    /// Welch segment length.
    #[arg(long)]
    pub segment_length: Option<usize>,
    /// Recording file appended to by Save.
    #[arg(long, value_name = "FILE")]
    pub record_path: Option<PathBuf>,
    /// Samples per channel written by one Save.
    #[arg(long)]
    pub record_samples: Option<usize>,
    /// Reaction to hardware overruns.
    #[arg(long, value_enum)]
    pub hardware_overrun: Option<OverrunPolicyArg>,
    /// Simulated tone frequency in Hz.
    #[arg(long, default_value = "50")]
    pub signal_hz: f64,
    /// Simulated tone amplitude in volts.
    #[arg(long, default_value = "1")]
    pub amplitude: f64,
    /// Uniform noise amplitude in volts.
    #[arg(long, default_value = "0")]
    pub noise: f64,
    /// Deliver blocks as fast as requested instead of at the scan rate.
    #[arg(long)]
    pub no_pacing: bool,
    /// Serve a single client, then exit.
    #[arg(long)]
    pub once: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FetchCommand {
    Stream,
    Spectrum,
    Save,
    Reconfigure,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Server address (host:port).
    pub addr: String,
    /// Command to send.
    #[arg(long, value_enum, default_value = "stream")]
    pub command: FetchCommand,
    /// New sample rate (reconfigure).
    #[arg(long, required_if_eq("command", "reconfigure"))]
    pub rate: Option<f64>,
    /// New block size (reconfigure).
    #[arg(long, required_if_eq("command", "reconfigure"))]
    pub block_size: Option<usize>,
    /// Connect and read timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
