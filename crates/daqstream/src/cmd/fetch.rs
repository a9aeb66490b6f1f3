use daqstream_frame::FrameConfig;
use daqstream_server::{Command, StreamClient};

use crate::cmd::{parse_duration, FetchArgs, FetchCommand};
use crate::exit::{server_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_fetch, FetchOutput, OutputFormat};

pub fn run(args: FetchArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let command = to_command(&args)?;

    let frame_config = FrameConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
        ..FrameConfig::default()
    };
    let mut client = StreamClient::connect_with_config(&args.addr, timeout, frame_config)
        .map_err(|err| server_error("connect failed", err))?;

    let reply = client
        .request(command)
        .map_err(|err| server_error(&format!("{} failed", command.name()), err))?;
    let degraded = reply.as_ref().is_some_and(|reply| reply.is_degraded());

    let out = FetchOutput {
        server: client.hello().clone(),
        command: command.name(),
        degraded,
        reply,
    };
    print_fetch(&out, format);

    client
        .close()
        .map_err(|err| server_error("close failed", err))?;

    Ok(if degraded { FAILURE } else { SUCCESS })
}

fn to_command(args: &FetchArgs) -> CliResult<Command> {
    Ok(match args.command {
        FetchCommand::Stream => Command::Stream,
        FetchCommand::Spectrum => Command::Spectrum,
        FetchCommand::Save => Command::Save,
        FetchCommand::Reconfigure => {
            let (Some(sample_rate), Some(block_size)) = (args.rate, args.block_size) else {
                return Err(CliError::new(
                    USAGE,
                    "reconfigure needs --rate and --block-size",
                ));
            };
            Command::Reconfigure {
                sample_rate,
                block_size,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_args(command: FetchCommand, rate: Option<f64>, block_size: Option<usize>) -> FetchArgs {
        FetchArgs {
            addr: "127.0.0.1:8000".to_string(),
            command,
            rate,
            block_size,
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn maps_reconfigure_arguments() {
        let command =
            to_command(&fetch_args(FetchCommand::Reconfigure, Some(2000.0), Some(512))).unwrap();
        assert_eq!(
            command,
            Command::Reconfigure {
                sample_rate: 2000.0,
                block_size: 512
            }
        );
    }

    #[test]
    fn reconfigure_without_block_size_is_usage_error() {
        let err = to_command(&fetch_args(FetchCommand::Reconfigure, Some(2000.0), None)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn save_has_no_arguments() {
        assert_eq!(
            to_command(&fetch_args(FetchCommand::Save, None, None)).unwrap(),
            Command::Save
        );
    }
}
