//! Host descriptor and auth payload

use crate::{ProtocolVersion, AUTH_PLATFORM, DEFAULT_HOST, DEFAULT_TCP_PORT, DEFAULT_WSS_PORT, DEFAULT_WS_PORT};
use serde::{Deserialize, Serialize};

/// Push server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub host: String,
    /// Plain TCP port
    pub port: u16,
    pub ws_port: u16,
    pub wss_port: u16,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_TCP_PORT,
            ws_port: DEFAULT_WS_PORT,
            wss_port: DEFAULT_WSS_PORT,
        }
    }
}

impl Host {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// `host:port` for the plain TCP endpoint
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Body of the auth packet sent right after the transport opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub roomid: u64,
    pub platform: String,
    pub protover: u16,
    pub uid: u64,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl AuthPayload {
    pub fn new(room_id: u64, protover: ProtocolVersion, token: Option<&str>) -> Self {
        Self {
            roomid: room_id,
            platform: AUTH_PLATFORM.to_string(),
            protover: protover.as_u16(),
            uid: 0,
            kind: 2,
            key: token.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and integers always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}
