//! Connection configuration

use danmu_core::{Host, ProtocolVersion};

use crate::error::{ClientError, Result};

/// When a connection joins the shared heartbeat schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatPolicy {
    /// After the first inbound packet proves the server is talking
    #[default]
    AfterFirstData,
    /// Right after the transport opens; silent connections are closed
    /// on the following tick
    OnOpen,
}

/// Everything a connection needs besides its transport
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub room_id: u64,
    pub token: Option<String>,
    pub host: Host,
    /// Body version requested from the server in the auth packet
    pub protover: ProtocolVersion,
    /// Emit raw buffers only; skip decoding and message dispatch
    pub buffer_only: bool,
    pub heartbeat_policy: HeartbeatPolicy,
}

impl ConnectionConfig {
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            token: None,
            host: Host::default(),
            protover: ProtocolVersion::Brotli,
            buffer_only: false,
            heartbeat_policy: HeartbeatPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.room_id == 0 {
            return Err(ClientError::InvalidConfig("room id must be non-zero".into()));
        }
        if self.host.host.is_empty() {
            return Err(ClientError::InvalidConfig("host must not be empty".into()));
        }
        match self.protover {
            ProtocolVersion::Json | ProtocolVersion::Deflate | ProtocolVersion::Brotli => Ok(()),
            other => Err(ClientError::InvalidConfig(format!(
                "unsupported protover {}",
                other.as_u16()
            ))),
        }
    }
}
