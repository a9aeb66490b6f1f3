use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use daqstream_server::{Reply, ServerHello};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Per-channel digest of a reply, used by the table and pretty formats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub channel: u8,
    pub points: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
    /// Axis value of the largest point (Hz for spectra).
    pub peak_at: f64,
}

pub fn summarize(hello: &ServerHello, reply: &Reply) -> Vec<ChannelSummary> {
    hello
        .channels
        .iter()
        .zip(reply.rows(hello.num_channels()))
        .filter(|(_, row)| !row.is_empty())
        .map(|(&channel, row)| {
            let n = row.len() as f64;
            let (peak_index, _) = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                });
            ChannelSummary {
                channel,
                points: row.len(),
                min: row.iter().copied().fold(f64::INFINITY, f64::min),
                max: row.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean: row.iter().sum::<f64>() / n,
                rms: (row.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
                peak_at: reply.axis.get(peak_index).copied().unwrap_or(f64::NAN),
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    addr: String,
    server: &'a ServerHello,
}

pub fn print_listening(addr: SocketAddr, hello: &ServerHello, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                addr: addr.to_string(),
                server: hello,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = hello_table(hello);
            table.add_row(vec!["address".to_string(), addr.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "listening on {addr} channels={:?} rate={} block={} segment={} protocol=v{}",
                hello.channels,
                hello.sample_rate,
                hello.block_size,
                hello.segment_length,
                hello.protocol_version
            );
        }
    }
}

/// What `fetch` prints.
#[derive(Debug, Serialize)]
pub struct FetchOutput {
    pub server: ServerHello,
    pub command: &'static str,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<Reply>,
}

pub fn print_fetch(out: &FetchOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            println!("{}", hello_table(&out.server));
            let Some(reply) = &out.reply else {
                println!("{}: sent, no reply expected", out.command);
                return;
            };
            if out.degraded {
                println!("{}: degraded reply (overrun or rejected request)", out.command);
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "POINTS", "MIN", "MAX", "MEAN", "RMS", "PEAK AT"]);
            for row in summarize(&out.server, reply) {
                table.add_row(vec![
                    format!("ch.{}", row.channel),
                    row.points.to_string(),
                    format!("{:.6e}", row.min),
                    format!("{:.6e}", row.max),
                    format!("{:.6e}", row.mean),
                    format!("{:.6e}", row.rms),
                    format!("{:.4}", row.peak_at),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let Some(reply) = &out.reply else {
                println!("command={} reply=none", out.command);
                return;
            };
            if out.degraded {
                println!("command={} reply=degraded", out.command);
                return;
            }
            for row in summarize(&out.server, reply) {
                println!(
                    "command={} channel={} points={} min={:.6} max={:.6} rms={:.6} peak_at={:.4}",
                    out.command, row.channel, row.points, row.min, row.max, row.rms, row.peak_at
                );
            }
        }
    }
}

fn hello_table(hello: &ServerHello) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["SETTING", "VALUE"])
        .add_row(vec!["channels".to_string(), format!("{:?}", hello.channels)])
        .add_row(vec!["sample_rate".to_string(), hello.sample_rate.to_string()])
        .add_row(vec!["block_size".to_string(), hello.block_size.to_string()])
        .add_row(vec![
            "segment_length".to_string(),
            hello.segment_length.to_string(),
        ])
        .add_row(vec![
            "protocol".to_string(),
            format!("v{}", hello.protocol_version),
        ]);
    table
}
