//! Config file loading and merging with command-line flags

use anyhow::{bail, Context, Result};
use danmu_core::{Host, ProtocolVersion};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Which transport to connect with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Secure WebSocket
    #[default]
    Websocket,
    /// Plain WebSocket
    Ws,
    /// Raw TCP
    Tcp,
}

/// Contents of a `--config` TOML file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub room_id: Option<u64>,
    pub token: Option<String>,
    pub transport: Option<TransportKind>,
    pub heartbeat_interval_secs: Option<u64>,
    pub protover: Option<u16>,
    pub host: Option<Host>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Flags given on the command line for `watch`
#[derive(Debug, Default)]
pub struct WatchFlags {
    pub rooms: Vec<u64>,
    pub token: Option<String>,
    pub transport: Option<TransportKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub heartbeat_interval_secs: Option<u64>,
    pub protover: Option<u16>,
}

/// Resolved settings; flags win over the file
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub rooms: Vec<u64>,
    pub token: Option<String>,
    pub transport: TransportKind,
    pub host: Host,
    pub heartbeat_interval: Duration,
    pub protover: ProtocolVersion,
}

impl WatchSettings {
    pub fn merge(flags: WatchFlags, file: FileConfig) -> Result<Self> {
        let rooms = if flags.rooms.is_empty() {
            file.room_id.into_iter().collect()
        } else {
            flags.rooms
        };
        if rooms.is_empty() {
            bail!("No room given; pass one on the command line or set room_id in the config file");
        }

        let transport = flags.transport.or(file.transport).unwrap_or_default();

        let mut host = file.host.unwrap_or_default();
        if let Some(name) = flags.host {
            host.host = name;
        }
        if let Some(port) = flags.port {
            match transport {
                TransportKind::Websocket => host.wss_port = port,
                TransportKind::Ws => host.ws_port = port,
                TransportKind::Tcp => host.port = port,
            }
        }

        let secs = flags
            .heartbeat_interval_secs
            .or(file.heartbeat_interval_secs)
            .unwrap_or(danmu_client::DEFAULT_HEARTBEAT_INTERVAL.as_secs());

        let protover = flags
            .protover
            .or(file.protover)
            .map(ProtocolVersion::from_u16)
            .unwrap_or(ProtocolVersion::Brotli);

        Ok(Self {
            rooms,
            token: flags.token.or(file.token),
            transport,
            host,
            heartbeat_interval: Duration::from_secs(secs.max(1)),
            protover,
        })
    }
}
