mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "daqstream", version, about = "DAQ acquisition and streaming server")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::FetchCommand;

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "daqstream",
            "serve",
            "--bind",
            "127.0.0.1:9000",
            "--channels",
            "0,1",
            "--noise",
            "0.01",
        ])
        .expect("serve args should parse");

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.channels, Some(vec![0, 1]));
        assert_eq!(args.noise, 0.01);
        assert!(!args.once);
    }

    #[test]
    fn parses_fetch_reconfigure() {
        let cli = Cli::try_parse_from([
            "daqstream",
            "--format",
            "json",
            "fetch",
            "127.0.0.1:8000",
            "--command",
            "reconfigure",
            "--rate",
            "2000",
            "--block-size",
            "512",
        ])
        .expect("fetch args should parse");

        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.command, FetchCommand::Reconfigure);
        assert_eq!(args.block_size, Some(512));
    }

    #[test]
    fn reconfigure_requires_rate() {
        let err = Cli::try_parse_from([
            "daqstream",
            "fetch",
            "127.0.0.1:8000",
            "--command",
            "reconfigure",
            "--block-size",
            "512",
        ])
        .expect_err("missing --rate should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_unknown_overrun_policy() {
        let err = Cli::try_parse_from(["daqstream", "serve", "--hardware-overrun", "ignore"])
            .expect_err("unknown policy should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
