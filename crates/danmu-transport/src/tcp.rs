//! TCP transport implementation
//!
//! Raw TCP transport. The server writes packets back to back on the
//! stream; the read side feeds every chunk through a [`Reassembler`] and
//! only forwards whole packets. Outgoing packets already carry their own
//! length and are written unchanged.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use danmu_core::stream::DEFAULT_MAX_PACKET_SIZE;
use danmu_core::{Host, Reassembler};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

/// Default channel buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Largest packet accepted from the server
    pub max_packet_size: usize,
    /// Read buffer size
    pub read_buffer_size: usize,
    /// Keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_buffer_size: 8192,
            keepalive_secs: 30,
        }
    }
}

/// TCP transport
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn connect(&self, host: &Host) -> Result<(TcpSender, TcpReceiver)> {
        let addr = host.tcp_addr();
        info!("Connecting to TCP: {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // Enable TCP keepalive if configured
        if self.config.keepalive_secs > 0 {
            let socket = socket2::SockRef::from(&stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(std::time::Duration::from_secs(self.config.keepalive_secs));
            let _ = socket.set_tcp_keepalive(&keepalive);
        }

        let connected = Arc::new(Mutex::new(true));
        let shutdown = Arc::new(Notify::new());
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
        let (incoming_tx, incoming_rx) =
            mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

        let _ = incoming_tx.send(TransportEvent::Connected).await;

        let sender = TcpSender {
            tx: outgoing_tx,
            connected: connected.clone(),
            shutdown: shutdown.clone(),
        };

        let receiver = TcpReceiver { rx: incoming_rx };

        let reassembler = Reassembler::with_max_packet_size(self.config.max_packet_size);
        let read_buffer_size = self.config.read_buffer_size;

        // Spawn reader/writer task
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            run_tcp_io_loop(
                reader,
                writer,
                outgoing_rx,
                incoming_tx,
                reassembler,
                read_buffer_size,
                shutdown,
            )
            .await;
            *connected.lock() = false;
        });

        info!("TCP connected to {}", addr);
        Ok((sender, receiver))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// IO loop for one TCP connection
async fn run_tcp_io_loop(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    mut reassembler: Reassembler,
    read_buffer_size: usize,
    shutdown: Arc<Notify>,
) {
    let mut read_buf = BytesMut::with_capacity(read_buffer_size);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("TCP connection shut down locally");
                let _ = writer.shutdown().await;
                break;
            }

            outgoing = outgoing_rx.recv() => {
                let Some(data) = outgoing else {
                    // Sender dropped
                    let _ = writer.shutdown().await;
                    break;
                };
                if let Err(e) = writer.write_all(&data).await {
                    error!("TCP write error: {}", e);
                    report(&incoming_tx, TransportError::Io(e)).await;
                    break;
                }
            }

            result = reader.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("TCP connection closed");
                        let _ = incoming_tx.send(TransportEvent::Disconnected { reason: None }).await;
                        break;
                    }
                    Ok(_) => {
                        let pushed = reassembler.push(&read_buf);
                        read_buf.clear();
                        match pushed {
                            Ok(packets) => {
                                for packet in packets {
                                    if incoming_tx.send(TransportEvent::Data(packet)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("TCP stream desynchronized: {}", e);
                                report(&incoming_tx, TransportError::Protocol(e)).await;
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        error!("TCP read error: {}", e);
                        report(&incoming_tx, TransportError::Io(e)).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Surface a fatal stream error as `Error` followed by `Disconnected`
async fn report(incoming_tx: &mpsc::Sender<TransportEvent>, err: TransportError) {
    let reason = err.to_string();
    let _ = incoming_tx.send(TransportEvent::Error(reason.clone())).await;
    let _ = incoming_tx
        .send(TransportEvent::Disconnected {
            reason: Some(reason),
        })
        .await;
}

/// TCP sender for writing packets
pub struct TcpSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<Mutex<bool>>,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::SendFailed("Channel closed".into()))
    }

    fn try_send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
        })
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        self.shutdown.notify_one();
        Ok(())
    }
}

/// TCP receiver for reading packets
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.max_packet_size, 16 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.keepalive_secs, 30);
    }

    #[test]
    fn test_tcp_transport_creation() {
        let transport = TcpTransport::new();
        assert_eq!(transport.name(), "tcp");
        assert_eq!(transport.config().keepalive_secs, 30);
    }
}
