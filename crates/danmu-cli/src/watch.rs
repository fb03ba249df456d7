//! `danmu watch`: print what one or more rooms push

use anyhow::Result;
use colored::Colorize;
use danmu_client::{Connection, ConnectionBuilder, HeartbeatCoordinator};
use danmu_core::Command;
use danmu_transport::{
    TcpTransport, Transport, WebSocketConfig, WebSocketTransport,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{TransportKind, WatchSettings};

/// What to print for each room
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    /// Only print these commands; empty prints everything
    pub commands: HashSet<Command>,
    /// Print raw frames as hex instead of decoded events
    pub raw: bool,
}

impl WatchFilter {
    pub fn allows(&self, command: &Command) -> bool {
        self.commands.is_empty() || self.commands.contains(command)
    }
}

pub async fn run_watch(
    settings: WatchSettings,
    filter: WatchFilter,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    match settings.transport {
        TransportKind::Websocket => {
            watch_rooms(settings, filter, WebSocketTransport::new(), shutdown_rx).await
        }
        TransportKind::Ws => {
            let transport = WebSocketTransport::with_config(WebSocketConfig {
                secure: false,
                ..Default::default()
            });
            watch_rooms(settings, filter, transport, shutdown_rx).await
        }
        TransportKind::Tcp => {
            watch_rooms(settings, filter, TcpTransport::new(), shutdown_rx).await
        }
    }
}

async fn watch_rooms<T: Transport + Clone>(
    settings: WatchSettings,
    filter: WatchFilter,
    transport: T,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let coordinator = HeartbeatCoordinator::new(settings.heartbeat_interval);
    let filter = Arc::new(filter);
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<u64>();

    let mut connections = Vec::with_capacity(settings.rooms.len());
    for &room in &settings.rooms {
        let mut builder = ConnectionBuilder::new(room)
            .host(settings.host.clone())
            .protover(settings.protover)
            .buffer_only(filter.raw)
            .coordinator(coordinator.clone());
        if let Some(token) = &settings.token {
            builder = builder.token(token);
        }

        let conn = builder.build(transport.clone())?;
        attach_printers(&conn, room, filter.clone(), closed_tx.clone());
        conn.start();
        connections.push(conn);
    }

    info!(
        "Watching {} room(s) via {}",
        connections.len(),
        transport.name()
    );

    let mut open = connections.len();
    while open > 0 {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            Some(_) = closed_rx.recv() => open -= 1,
        }
    }

    for conn in &connections {
        conn.close();
    }
    Ok(())
}

fn attach_printers<T: Transport>(
    conn: &Connection<T>,
    room: u64,
    filter: Arc<WatchFilter>,
    closed_tx: mpsc::UnboundedSender<u64>,
) {
    let tag = format!("[{}]", room).cyan().to_string();

    let t = tag.clone();
    conn.on_open(move || println!("{} {}", t, "open".green().bold()));

    let t = tag.clone();
    conn.on_close(move || {
        println!("{} {}", t, "closed".red().bold());
        let _ = closed_tx.send(room);
    });

    if filter.raw {
        let t = tag;
        conn.on_buffer(move |data| println!("{} {}", t, hex::encode(data)));
        return;
    }

    conn.on_message(move |event, header| {
        let command = event
            .command()
            .unwrap_or_else(|| Command::Other(header.operation.as_u32().to_string()));
        if !filter.allows(&command) {
            return;
        }

        match event.online() {
            Some(online) => println!("{} {} {}", tag, "online".yellow(), online),
            None => println!("{} {} {}", tag, command.as_str().yellow(), event.to_json()),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter() {
        let all = WatchFilter::default();
        assert!(all.allows(&Command::DanmuMsg));

        let only = WatchFilter {
            commands: [Command::from("DANMU_MSG")].into_iter().collect(),
            raw: false,
        };
        assert!(only.allows(&Command::DanmuMsg));
        assert!(!only.allows(&Command::SendGift));
        assert!(!only.allows(&Command::Other("5".into())));
    }
}
