//! Connection builder pattern

use danmu_core::{Host, ProtocolVersion};
use danmu_transport::Transport;

use crate::config::{ConnectionConfig, HeartbeatPolicy};
use crate::heartbeat::HeartbeatCoordinator;
use crate::{Connection, Result};

/// Builder for [`Connection`]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    coordinator: Option<HeartbeatCoordinator>,
}

impl ConnectionBuilder {
    /// Create a new builder for a room
    pub fn new(room_id: u64) -> Self {
        Self {
            config: ConnectionConfig::new(room_id),
            coordinator: None,
        }
    }

    /// Set authentication token
    pub fn token(mut self, token: &str) -> Self {
        self.config.token = Some(token.to_string());
        self
    }

    /// Set the push server
    pub fn host(mut self, host: Host) -> Self {
        self.config.host = host;
        self
    }

    /// Body version to request from the server
    pub fn protover(mut self, protover: ProtocolVersion) -> Self {
        self.config.protover = protover;
        self
    }

    /// Only emit raw buffers
    pub fn buffer_only(mut self, enabled: bool) -> Self {
        self.config.buffer_only = enabled;
        self
    }

    pub fn heartbeat_policy(mut self, policy: HeartbeatPolicy) -> Self {
        self.config.heartbeat_policy = policy;
        self
    }

    /// Share a heartbeat schedule with other connections
    pub fn coordinator(mut self, coordinator: HeartbeatCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Build without connecting
    pub fn build<T: Transport>(self, transport: T) -> Result<Connection<T>> {
        Connection::new(self.config, transport, self.coordinator.unwrap_or_default())
    }

    /// Build and start connecting; must be called within a tokio runtime
    pub fn start<T: Transport>(self, transport: T) -> Result<Connection<T>> {
        let connection = self.build(transport)?;
        connection.start();
        Ok(connection)
    }
}
