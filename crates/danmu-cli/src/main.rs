//! Danmu CLI - Command-line client for live-room danmaku push servers
//!
//! Watch rooms, and encode or decode raw packets for inspection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use danmu_core::{codec, Command, Operation, ProtocolVersion};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod watch;

use config::{FileConfig, TransportKind, WatchFlags, WatchSettings};
use watch::WatchFilter;

/// danmu - live-room danmaku client
#[derive(Parser)]
#[command(name = "danmu")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to one or more rooms and print what they push
    Watch {
        /// Room ids
        rooms: Vec<u64>,

        /// Only print these commands (repeatable)
        #[arg(long = "cmd")]
        commands: Vec<String>,

        /// Auth token
        #[arg(short, long, env = "DANMU_TOKEN")]
        token: Option<String>,

        /// Transport to connect with
        #[arg(short = 'T', long, value_enum)]
        transport: Option<TransportKind>,

        /// Push server host
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port for the chosen transport
        #[arg(short = 'P', long)]
        port: Option<u16>,

        /// Heartbeat interval in seconds
        #[arg(long)]
        heartbeat_interval: Option<u64>,

        /// Body version to request (0 = JSON, 2 = deflate, 3 = brotli)
        #[arg(long)]
        protover: Option<u16>,

        /// Print raw frames as hex instead of decoded events
        #[arg(long)]
        raw: bool,
    },

    /// Encode a payload into a packet and print it as hex
    Encode {
        /// Payload text
        payload: String,

        /// Operation code
        #[arg(short, long, default_value = "5")]
        op: u32,
    },

    /// Decode a hex packet and print its events
    Decode {
        /// Packet bytes as hex
        hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    match cli.command {
        Commands::Watch {
            rooms,
            commands,
            token,
            transport,
            host,
            port,
            heartbeat_interval,
            protover,
            raw,
        } => {
            let flags = WatchFlags {
                rooms,
                token,
                transport,
                host,
                port,
                heartbeat_interval_secs: heartbeat_interval,
                protover,
            };
            let settings = WatchSettings::merge(flags, file)?;
            let filter = WatchFilter {
                commands: commands.iter().map(|c| Command::from(c.as_str())).collect(),
                raw,
            };

            println!(
                "{} Watching room(s) {:?} on {}",
                "DANMU".cyan().bold(),
                settings.rooms,
                settings.host.host
            );
            watch::run_watch(settings, filter, &mut shutdown_rx).await?;
        }

        Commands::Encode { payload, op } => {
            let packet = codec::encode(&payload, Operation::from_u32(op));
            println!("{}", hex::encode(&packet));
        }

        Commands::Decode { hex } => {
            decode_hex(&hex)?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn decode_hex(text: &str) -> Result<()> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(cleaned).context("Input is not valid hex")?;
    let packet = codec::decode(&bytes).context("Failed to decode packet")?;

    let header = &packet.header;
    println!(
        "{} len={} op={} version={} seq={}",
        "HEADER".green().bold(),
        header.packet_len,
        header.operation.as_u32(),
        version_name(header.version),
        header.sequence
    );
    for event in &packet.events {
        println!("{} {}", "EVENT".yellow(), event.to_json());
    }
    for failure in &packet.failures {
        println!("{} {}", "ERROR".red(), failure);
    }

    Ok(())
}

fn version_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::Json => "0 (json)".into(),
        ProtocolVersion::Legacy => "1 (json)".into(),
        ProtocolVersion::Deflate => "2 (deflate)".into(),
        ProtocolVersion::Brotli => "3 (brotli)".into(),
        ProtocolVersion::Unknown(v) => format!("{} (unknown)", v),
    }
}
