//! WebSocket transport implementation
//!
//! The push server delivers one packet batch per binary message, so no
//! reassembly is needed here.

use async_trait::async_trait;
use bytes::Bytes;
use danmu_core::{Host, WS_PATH};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

/// Default channel buffer size for WebSocket connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 100;

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Use `wss://` on the host's secure port instead of `ws://`
    pub secure: bool,
    /// Endpoint path
    pub path: String,
    /// Channel capacity for outgoing messages and incoming events
    pub channel_buffer_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            secure: true,
            path: WS_PATH.to_string(),
            channel_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
        }
    }
}

/// WebSocket transport
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Endpoint URL for `host` under this configuration
    pub fn url(&self, host: &Host) -> String {
        if self.config.secure {
            format!("wss://{}:{}{}", host.host, host.wss_port, self.config.path)
        } else {
            format!("ws://{}:{}{}", host.host, host.ws_port, self.config.path)
        }
    }
}

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(WsMessage::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn try_send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .try_send(WsMessage::Binary(data.to_vec()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
            })
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(&self, host: &Host) -> Result<(Self::Sender, Self::Receiver)> {
        let url = self.url(host);
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        // Split the WebSocket stream
        let (write, read) = ws_stream.split();

        // Create channels
        let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(self.config.channel_buffer_size);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.config.channel_buffer_size);

        let connected = Arc::new(Mutex::new(true));
        let connected_write = connected.clone();
        let connected_read = connected.clone();

        // Spawn writer task
        tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = send_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("WebSocket write error: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            *connected_write.lock() = false;
        });

        // Spawn reader task
        tokio::spawn(async move {
            let mut read = read;

            // Send connected event
            let _ = event_tx.send(TransportEvent::Connected).await;

            while let Some(result) = read.next().await {
                match result {
                    Ok(WsMessage::Binary(data)) => {
                        if event_tx
                            .send(TransportEvent::Data(Bytes::from(data)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(WsMessage::Text(text)) => {
                        warn!("Received text message, converting to bytes");
                        let _ = event_tx.send(TransportEvent::Data(Bytes::from(text))).await;
                    }
                    Ok(WsMessage::Ping(_)) => {
                        // Pong is handled automatically by tungstenite
                        debug!("Received ping");
                    }
                    Ok(WsMessage::Pong(_)) => {
                        debug!("Received pong");
                    }
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        info!("WebSocket closed: {:?}", reason);
                        let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
                        break;
                    }
                    Ok(WsMessage::Frame(_)) => {}
                    Err(e) => {
                        error!("WebSocket read error: {}", e);
                        let reason = TransportError::from(e).to_string();
                        let _ = event_tx.send(TransportEvent::Error(reason.clone())).await;
                        let _ = event_tx
                            .send(TransportEvent::Disconnected {
                                reason: Some(reason),
                            })
                            .await;
                        break;
                    }
                }
            }

            *connected_read.lock() = false;
        });

        let sender = WebSocketSender {
            tx: send_tx,
            connected,
        };

        let receiver = WebSocketReceiver { rx: event_rx };

        Ok((sender, receiver))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}
