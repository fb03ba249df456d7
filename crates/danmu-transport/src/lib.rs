//! Danmu Transport Layer
//!
//! This crate provides the transports a connection can drive:
//! - WebSocket (message-oriented, one packet batch per message)
//! - TCP (byte stream, reassembled into packets)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};

#[cfg(feature = "tcp")]
pub use tcp::{TcpConfig, TcpTransport};
