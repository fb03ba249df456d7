//! Packet header encoding/decoding
//!
//! Every packet starts with a fixed 16-byte header, all fields big-endian:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Bytes 0-3:   Total packet length (u32, header included)         │
//! │ Bytes 4-5:   Header length (u16, always 16)                     │
//! │ Bytes 6-7:   Body protocol version (u16)                        │
//! │              0=json 1=legacy json 2=deflate 3=brotli            │
//! │ Bytes 8-11:  Operation (u32)                                    │
//! │              1=default 2=heartbeat 3=heartbeat reply            │
//! │              5=message 7=auth 8=auth ack                        │
//! │ Bytes 12-15: Sequence id (u32, 1 for client packets)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Body (version-dependent)                                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::{Error, Result, DEFAULT_SEQUENCE};
use bytes::{Buf, BufMut, BytesMut};

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Packet operation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operation {
    #[default]
    Default,
    Heartbeat,
    HeartbeatReply,
    Message,
    Auth,
    AuthAck,
    Unknown(u32),
}

impl Operation {
    pub fn from_u32(code: u32) -> Self {
        match code {
            1 => Operation::Default,
            2 => Operation::Heartbeat,
            3 => Operation::HeartbeatReply,
            5 => Operation::Message,
            7 => Operation::Auth,
            8 => Operation::AuthAck,
            other => Operation::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Operation::Default => 1,
            Operation::Heartbeat => 2,
            Operation::HeartbeatReply => 3,
            Operation::Message => 5,
            Operation::Auth => 7,
            Operation::AuthAck => 8,
            Operation::Unknown(code) => code,
        }
    }
}

/// Body protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Plain JSON body
    Json,
    /// Header default; bodies are plain JSON
    #[default]
    Legacy,
    /// zlib-compressed nested packet
    Deflate,
    /// brotli-compressed nested packet
    Brotli,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(version: u16) -> Self {
        match version {
            0 => ProtocolVersion::Json,
            1 => ProtocolVersion::Legacy,
            2 => ProtocolVersion::Deflate,
            3 => ProtocolVersion::Brotli,
            other => ProtocolVersion::Unknown(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            ProtocolVersion::Json => 0,
            ProtocolVersion::Legacy => 1,
            ProtocolVersion::Deflate => 2,
            ProtocolVersion::Brotli => 3,
            ProtocolVersion::Unknown(v) => v,
        }
    }
}

/// A parsed packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub packet_len: u32,
    pub header_len: u16,
    pub version: ProtocolVersion,
    pub operation: Operation,
    pub sequence: u32,
}

impl Header {
    /// Header for a client-built packet carrying `body_len` bytes of body
    pub fn new(operation: Operation, body_len: usize) -> Self {
        Self {
            packet_len: (HEADER_SIZE + body_len) as u32,
            header_len: HEADER_SIZE as u16,
            version: ProtocolVersion::default(),
            operation,
            sequence: DEFAULT_SEQUENCE,
        }
    }

    /// Length of the body that follows this header
    pub fn body_len(&self) -> usize {
        (self.packet_len as usize).saturating_sub(HEADER_SIZE)
    }

    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u32(self.packet_len);
        buf.put_u16(self.header_len);
        buf.put_u16(self.version.as_u16());
        buf.put_u32(self.operation.as_u32());
        buf.put_u32(self.sequence);
    }

    /// Parse the header at the start of `buf`
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                needed: HEADER_SIZE,
                have: buf.remaining(),
            });
        }

        let packet_len = buf.get_u32();
        let header_len = buf.get_u16();
        if header_len as usize != HEADER_SIZE {
            return Err(Error::InvalidHeaderLength(header_len));
        }
        let version = ProtocolVersion::from_u16(buf.get_u16());
        let operation = Operation::from_u32(buf.get_u32());
        let sequence = buf.get_u32();

        Ok(Self {
            packet_len,
            header_len,
            version,
            operation,
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header::new(Operation::Auth, 10);
        let mut buf = BytesMut::new();
        header.encode_to(&mut buf);

        assert_eq!(
            &buf[..],
            &[0, 0, 0, 26, 0, 16, 0, 1, 0, 0, 0, 7, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_header_decode_rejects_bad_header_len() {
        let mut raw = [0u8; 16];
        raw[3] = 16;
        raw[5] = 12;
        assert!(matches!(
            Header::decode(&raw),
            Err(Error::InvalidHeaderLength(12))
        ));
    }

    #[test]
    fn test_header_decode_short() {
        assert!(matches!(
            Header::decode(&[0, 0, 0, 16]),
            Err(Error::BufferTooSmall { needed: 16, have: 4 })
        ));
    }

    #[test]
    fn test_unknown_codes_preserved() {
        assert_eq!(Operation::from_u32(42), Operation::Unknown(42));
        assert_eq!(Operation::Unknown(42).as_u32(), 42);
        assert_eq!(ProtocolVersion::from_u16(9).as_u16(), 9);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Operation::default(), Operation::Default);
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::Legacy);
        assert_eq!(Header::new(Operation::Message, 0).version.as_u16(), 1);
    }
}
