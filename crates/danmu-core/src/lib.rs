//! Danmu Core
//!
//! Wire types, packet encoding, and stream framing for the live-room
//! danmaku push protocol.
//!
//! This crate provides:
//! - Packet headers ([`Header`], [`Operation`], [`ProtocolVersion`])
//! - Packet encoding/decoding with nested decompression ([`codec`])
//! - Decoded events and command names ([`Event`], [`Command`])
//! - Byte-stream reassembly into whole packets ([`Reassembler`])
//! - Host descriptors and the auth payload ([`Host`], [`AuthPayload`])

pub mod codec;
pub mod error;
pub mod event;
pub mod header;
pub mod stream;
pub mod types;

pub use codec::{decode, encode, Packet};
pub use error::{Error, Result};
pub use event::{Command, Event};
pub use header::{Header, Operation, ProtocolVersion, HEADER_SIZE};
pub use stream::Reassembler;
pub use types::{AuthPayload, Host};

/// Sequence id written into every client-built packet
pub const DEFAULT_SEQUENCE: u32 = 1;

/// Body sent with every heartbeat packet
pub const HEARTBEAT_PAYLOAD: &str = "[object Object]";

/// Platform string announced in the auth payload
pub const AUTH_PLATFORM: &str = "web";

/// Default plain TCP port
pub const DEFAULT_TCP_PORT: u16 = 2243;

/// Default plain WebSocket port
pub const DEFAULT_WS_PORT: u16 = 2244;

/// Default secure WebSocket port
pub const DEFAULT_WSS_PORT: u16 = 443;

/// Default push server host
pub const DEFAULT_HOST: &str = "broadcastlv.chat.bilibili.com";

/// WebSocket endpoint path
pub const WS_PATH: &str = "/sub";
