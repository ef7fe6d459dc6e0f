//! GBN Peer - interactive Go-Back-N file exchange
//!
//! Receives files from the configured remote for as long as it runs and
//! sends files on request.

use anyhow::Context;
use clap::Parser;
use gbn::{Endpoint, EndpointConfig, FileSink, Link, PeerId, TransferError, TIMELINE_TARGET};
use gbn_cli::{display_report, Config};
use gbn_io::GbnSocket;
use gbn_protocol::{ChannelSimulator, FrameError, SenderError};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gbn-peer")]
#[command(about = "Go-Back-N file transfer peer over UDP", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "gbn.toml")]
    config: PathBuf,

    /// Write an example configuration to the config path and exit
    #[arg(long)]
    init: bool,

    /// Debug-level console output
    #[arg(short, long)]
    verbose: bool,
}

/// Console output, plus the send/receive timeline copied to `timeline` if set
fn init_logging(verbose: bool, timeline: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = fmt::layer().with_filter(filter);

    let timeline = match timeline {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(Targets::new().with_target(TIMELINE_TARGET, Level::INFO));
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(timeline)
        .init();
    Ok(())
}

/// What the user asked for at a prompt
enum Input {
    Line(String),
    Exit,
}

fn prompt(lines: &mut impl BufRead, message: &str) -> io::Result<Input> {
    print!("{message}: ");
    io::stdout().flush()?;

    let mut line = String::new();
    if lines.read_line(&mut line)? == 0 {
        return Ok(Input::Exit);
    }
    match line.trim() {
        "0" => Ok(Input::Exit),
        text => Ok(Input::Line(text.to_string())),
    }
}

/// Send one file, reporting recoverable failures without stopping the peer
fn send(endpoint: &mut Endpoint, dest: PeerId, path: &Path) -> anyhow::Result<()> {
    match endpoint.send_file(dest, path) {
        Ok(report) => {
            display_report(&report);
            Ok(())
        }
        Err(TransferError::Io(e)) => {
            tracing::warn!(file = %path.display(), error = %e, "cannot read file");
            Ok(())
        }
        Err(TransferError::Sender(SenderError::Frame(FrameError::PeerIdentityCollision(id)))) => {
            tracing::warn!(peer = %id, "destination is this peer");
            Ok(())
        }
        Err(e) => Err(e).context("transfer failed"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        if args.config.exists() {
            anyhow::bail!("{} already exists", args.config.display());
        }
        Config::example().to_file(&args.config)?;
        println!("Wrote example configuration to {}", args.config.display());
        return Ok(());
    }

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;
    init_logging(args.verbose, config.log.file.as_deref())?;

    let protocol = config.protocol()?;
    let local_id = config.local_id()?;
    let configured_dest = config.dest_id()?;

    let socket = GbnSocket::bind(config.transport.bind, config.transport.peer)?;
    tracing::info!(
        local = %socket.local_addr()?,
        peer = %socket.peer_addr(),
        "GBN peer starting..."
    );

    let channel = match config.channel.seed {
        Some(seed) => {
            ChannelSimulator::seeded(config.channel.error_rate, config.channel.loss_rate, seed)
        }
        None => ChannelSimulator::new(config.channel.error_rate, config.channel.loss_rate),
    };
    let sink = FileSink::new(&config.transport.output_dir)?;

    let endpoint_config =
        EndpointConfig::new(protocol, local_id).with_idle_backoff(config.idle_backoff());
    let mut endpoint = Endpoint::start(endpoint_config, Link::new(socket, channel), sink)?;

    println!("Local peer id: {local_id}");
    println!(
        "Received files are written to {}",
        config.transport.output_dir.display()
    );

    if let (Some(dest), Some(file)) = (configured_dest, &config.transport.file) {
        send(&mut endpoint, dest, file)?;
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock();
    loop {
        let dest = match configured_dest {
            Some(dest) => dest,
            None => match prompt(&mut lines, "Destination peer id (0 to exit)")? {
                Input::Exit => break,
                Input::Line(text) => match text.parse::<PeerId>() {
                    Ok(id) if id == local_id => {
                        println!("That is this peer's own id");
                        continue;
                    }
                    Ok(id) => id,
                    Err(e) => {
                        println!("Invalid peer id: {e}");
                        continue;
                    }
                },
            },
        };

        let path = match prompt(&mut lines, "File to send (0 to exit)")? {
            Input::Exit => break,
            Input::Line(text) if text.is_empty() => continue,
            Input::Line(text) => PathBuf::from(text),
        };
        if !path.is_file() {
            println!("No such file: {}", path.display());
            continue;
        }

        send(&mut endpoint, dest, &path)?;
    }

    endpoint.shutdown();
    tracing::info!("GBN peer stopped");
    Ok(())
}
