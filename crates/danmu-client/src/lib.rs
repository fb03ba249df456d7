//! Danmu Client Library
//!
//! Connection lifecycle and shared heartbeats for live-room danmaku
//! push servers.
//!
//! # Example
//!
//! ```ignore
//! use danmu_client::prelude::*;
//! use danmu_transport::WebSocketTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let conn = ConnectionBuilder::new(5440).build(WebSocketTransport::new())?;
//!
//!     conn.on_command("DANMU_MSG", |event, _header| {
//!         println!("{}", event.to_json());
//!     });
//!     conn.on_close(|| println!("closed"));
//!
//!     conn.start();
//!     tokio::signal::ctrl_c().await?;
//!     conn.close();
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod notify;

pub use builder::ConnectionBuilder;
pub use config::{ConnectionConfig, HeartbeatPolicy};
pub use connection::{Connection, ConnectionState, OFFLINE};
pub use error::{ClientError, Result};
pub use heartbeat::{
    aligned_delay, HeartbeatCoordinator, HeartbeatId, HeartbeatSink, DEFAULT_HEARTBEAT_INTERVAL,
};
pub use notify::{Handler, Notification, SubscriptionId, Topic};

/// Connection over WebSocket
#[cfg(feature = "websocket")]
pub type WsConnection = Connection<danmu_transport::WebSocketTransport>;

/// Connection over raw TCP
#[cfg(feature = "tcp")]
pub type TcpConnection = Connection<danmu_transport::TcpTransport>;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::ConnectionBuilder;
    pub use crate::config::{ConnectionConfig, HeartbeatPolicy};
    pub use crate::connection::{Connection, ConnectionState};
    pub use crate::error::{ClientError, Result};
    pub use crate::heartbeat::HeartbeatCoordinator;
    pub use crate::notify::{Notification, Topic};
    pub use danmu_core::{Command, Event, Header, Host, Operation, ProtocolVersion};
}
