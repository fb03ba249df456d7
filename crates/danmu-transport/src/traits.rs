//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use danmu_core::Host;

use crate::error::Result;

/// Events that can occur on a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// One delivery: a whole packet batch, never a partial packet
    Data(Bytes),
    /// Error occurred
    Error(String),
}

/// Trait for sending data
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send data
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Queue data without waiting
    fn try_send(&self, data: Bytes) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the sender and tear the connection down
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// A way of reaching a push server
///
/// Each call to [`Transport::connect`] produces a fresh, independent
/// connection; the caller owns both halves exclusively.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The sender type for this transport
    type Sender: TransportSender + 'static;
    /// The receiver type for this transport
    type Receiver: TransportReceiver + 'static;

    /// Connect to the push server described by `host`
    async fn connect(&self, host: &Host) -> Result<(Self::Sender, Self::Receiver)>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
