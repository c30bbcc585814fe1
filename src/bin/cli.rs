use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser as ClapParser};
use tracing::{Level, info};

use dpiparse::{
    Bytes, ParseState, ParserConfig, ParserContext, format_debug, format_fields_only, format_json,
};

/// dpiparse CLI — streaming zero-copy DPI parser for HTTP and FTP flows.
///
/// Reads a raw application payload from a file, --raw string, or stdin,
/// slices it into packet-sized buffers and feeds them through one parser
/// context, then prints the detected protocol and extracted fields.
///
/// Escape sequences (\r, \n, \t, \\) in the --raw value are interpreted so
/// you can pass a full request as a single shell argument.
#[derive(ClapParser)]
#[command(name = "dpiparse-cli", version, about, long_about = None)]
struct Cli {
    /// Path to a file containing the raw flow payload.
    /// Reads from stdin when neither FILE nor --raw is given.
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Raw payload string (escape sequences \r \n \t \\ are expanded).
    #[arg(long)]
    raw: Option<String>,

    /// Output format.
    #[arg(short, long, default_value = "json", value_enum)]
    format: OutputFormat,

    /// Pretty-print JSON output (ignored for other formats).
    #[arg(short, long)]
    pretty: bool,

    /// Bytes per simulated packet; 0 feeds the whole payload at once.
    #[arg(long, default_value = "0")]
    packet_size: usize,

    /// Keep parsing further messages of the flow after each one completes.
    #[arg(long)]
    pipeline: bool,

    /// Longest HTTP line scanned before giving up.
    #[arg(long, default_value = "8192")]
    max_line_len: usize,

    /// Longest FTP command line scanned before giving up.
    #[arg(long, default_value = "512")]
    max_ftp_line_len: usize,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable debug output
    Debug,
    /// Field lines only
    Fields,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // When no input source is provided and stdin is a terminal (not piped),
    // show help instead of blocking.
    if cli.file.is_none() && cli.raw.is_none() && std::io::stdin().is_terminal() {
        Cli::command().print_help().ok();
        println!();
        process::exit(0);
    }

    let data = match read_input(&cli) {
        Ok(d) => Bytes::from(d),
        Err(e) => {
            eprintln!("Error reading input: {e}");
            process::exit(1);
        }
    };

    if data.is_empty() {
        eprintln!("Error: empty input");
        process::exit(1);
    }

    let config = ParserConfig {
        max_line_len: cli.max_line_len,
        max_ftp_line_len: cli.max_ftp_line_len,
        ..ParserConfig::default()
    };

    let mut ctx = match dpiparse::alloc_with_config(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let mut failed = false;
    for packet in packets(&data, cli.packet_size) {
        let mut offset = 0;
        while offset < packet.len() {
            match ctx.parse(&packet, offset) {
                ParseState::Done if cli.pipeline => {
                    print_context(&cli, &ctx);
                    offset = ctx.resume_offset().unwrap_or(packet.len());
                    ctx.reset();
                }
                ParseState::Error => {
                    failed = true;
                    break;
                }
                _ => break,
            }
        }
    }

    if !(cli.pipeline && ctx.state() == ParseState::Init) {
        print_context(&cli, &ctx);
    }
    info!(state = %ctx.state(), "flow finished");

    dpiparse::dealloc(ctx);
    if failed {
        process::exit(2);
    }
}

fn print_context(cli: &Cli, ctx: &ParserContext) {
    let output = match cli.format {
        OutputFormat::Json => format_json(ctx, cli.pretty) + "\n",
        OutputFormat::Debug => format_debug(ctx),
        OutputFormat::Fields => format_fields_only(ctx),
    };
    print!("{output}");
}

/// Split the payload into zero-copy packet views.
fn packets(data: &Bytes, packet_size: usize) -> Vec<Bytes> {
    if packet_size == 0 {
        return vec![data.clone()];
    }
    (0..data.len())
        .step_by(packet_size)
        .map(|start| data.slice(start..(start + packet_size).min(data.len())))
        .collect()
}

/// Read raw payload bytes from --raw, a file, or stdin.
fn read_input(cli: &Cli) -> Result<Vec<u8>, std::io::Error> {
    if let Some(raw) = &cli.raw {
        return Ok(unescape(raw).into_bytes());
    }
    match &cli.file {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Expand C-style escape sequences (`\r`, `\n`, `\t`, `\\`) in a string.
///
/// Any other `\X` sequence is kept as-is (both the backslash and `X`).
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('r') => out.push('\r'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}
