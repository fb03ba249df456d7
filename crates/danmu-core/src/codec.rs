//! Packet codec
//!
//! Encodes client packets and decodes server deliveries into [`Event`]s.
//!
//! A delivery may hold several packets back to back, and a compressed
//! body is itself a complete delivery, so decoding recurses into
//! decompressed bodies and flattens the result in arrival order.
//!
//! Decoding is failure-tolerant below the outer header: a sub-packet that
//! cannot be decoded is recorded in [`Packet::failures`] and its siblings
//! are still returned.

use crate::header::{Header, Operation, ProtocolVersion, HEADER_SIZE};
use crate::{AuthPayload, Error, Event, Result, HEARTBEAT_PAYLOAD};
use bytes::{Bytes, BytesMut};
use std::io::Read;
use tracing::trace;

/// Maximum depth of compressed bodies nested inside one another
pub const MAX_NESTING_DEPTH: usize = 8;

/// Buffer size handed to the brotli decompressor
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Result of decoding one delivery
#[derive(Debug)]
pub struct Packet {
    /// Header of the first packet in the delivery
    pub header: Header,
    /// Events from every sub-packet, in arrival order
    pub events: Vec<Event>,
    /// Sub-packets that failed to decode
    pub failures: Vec<Error>,
}

impl Packet {
    /// True when every sub-packet decoded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode a text payload into a packet with the default body version
#[inline]
pub fn encode(payload: &str, operation: Operation) -> Bytes {
    encode_packet(payload.as_bytes(), operation, ProtocolVersion::default())
}

/// Encode raw body bytes with an explicit body version
pub fn encode_packet(body: &[u8], operation: Operation, version: ProtocolVersion) -> Bytes {
    let mut header = Header::new(operation, body.len());
    header.version = version;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    header.encode_to(&mut buf);
    buf.extend_from_slice(body);
    buf.freeze()
}

/// The heartbeat packet sent to keep a session alive
pub fn heartbeat_packet() -> Bytes {
    encode(HEARTBEAT_PAYLOAD, Operation::Heartbeat)
}

/// The auth packet sent right after the transport opens
pub fn auth_packet(auth: &AuthPayload) -> Bytes {
    encode(&auth.to_json(), Operation::Auth)
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode one delivery
///
/// Fails only when the leading header cannot be read; everything after
/// that is reported per sub-packet in [`Packet::failures`].
pub fn decode(buf: &[u8]) -> Result<Packet> {
    let header = Header::decode(buf)?;

    let mut decoder = Decoder::default();
    decoder.feed(buf, 0);

    Ok(Packet {
        header,
        events: decoder.events,
        failures: decoder.failures,
    })
}

#[derive(Default)]
struct Decoder {
    events: Vec<Event>,
    failures: Vec<Error>,
}

impl Decoder {
    /// Walk the length-prefixed packets in `buf`
    fn feed(&mut self, buf: &[u8], depth: usize) {
        let mut offset = 0;

        while offset < buf.len() {
            let rest = &buf[offset..];

            let header = match Header::decode(rest) {
                Ok(header) => header,
                Err(e) => {
                    // Without a readable length there is no next packet to find
                    self.failures.push(e);
                    return;
                }
            };

            let len = header.packet_len as usize;
            if len < HEADER_SIZE || len > rest.len() {
                self.failures.push(Error::InvalidPacketLength {
                    declared: header.packet_len,
                    offset,
                    available: rest.len(),
                });
                return;
            }

            let body = &rest[HEADER_SIZE..len];
            if let Err(e) = self.feed_body(&header, body, depth) {
                self.failures.push(e);
            }

            offset += len;
        }
    }

    fn feed_body(&mut self, header: &Header, body: &[u8], depth: usize) -> Result<()> {
        if header.operation == Operation::HeartbeatReply {
            if body.len() < 4 {
                return Err(Error::BufferTooSmall {
                    needed: 4,
                    have: body.len(),
                });
            }
            let online = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            self.events.push(Event::Heartbeat { online });
            return Ok(());
        }

        match header.version {
            ProtocolVersion::Json | ProtocolVersion::Legacy => {
                let value = serde_json::from_slice(body)?;
                self.events.push(Event::Json(value));
            }
            ProtocolVersion::Deflate => {
                let inner = inflate(body)?;
                self.feed_nested(&inner, depth)?;
            }
            ProtocolVersion::Brotli => {
                let inner = brotli_decompress(body)?;
                self.feed_nested(&inner, depth)?;
            }
            ProtocolVersion::Unknown(v) => return Err(Error::UnsupportedVersion(v)),
        }

        Ok(())
    }

    fn feed_nested(&mut self, inner: &[u8], depth: usize) -> Result<()> {
        if depth + 1 >= MAX_NESTING_DEPTH {
            return Err(Error::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        trace!(len = inner.len(), depth, "decoding decompressed body");
        self.feed(inner, depth + 1);
        Ok(())
    }
}

fn inflate(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len() * 4);
    flate2::read::ZlibDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompress(e.to_string()))?;
    Ok(out)
}

fn brotli_decompress(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len() * 4);
    brotli::Decompressor::new(body, BROTLI_BUFFER_SIZE)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompress(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use serde_json::json;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn json_packet(value: serde_json::Value) -> Bytes {
        encode_packet(
            value.to_string().as_bytes(),
            Operation::Message,
            ProtocolVersion::Json,
        )
    }

    #[test]
    fn test_encode_layout() {
        let packet = encode("{}", Operation::Auth);
        assert_eq!(packet.len(), 18);

        let header = Header::decode(&packet).unwrap();
        assert_eq!(header.packet_len, 18);
        assert_eq!(header.header_len, 16);
        assert_eq!(header.version, ProtocolVersion::Legacy);
        assert_eq!(header.operation, Operation::Auth);
        assert_eq!(header.sequence, 1);
        assert_eq!(&packet[16..], b"{}");
    }

    #[test]
    fn test_heartbeat_reply() {
        let mut buf = BytesMut::new();
        Header::new(Operation::HeartbeatReply, 4).encode_to(&mut buf);
        buf.put_slice(&[0, 0, 0, 42]);

        let packet = decode(&buf).unwrap();
        assert_eq!(packet.header.operation, Operation::HeartbeatReply);
        assert_eq!(packet.events, vec![Event::Heartbeat { online: 42 }]);
        assert!(packet.is_clean());
    }

    #[test]
    fn test_heartbeat_reply_short_body() {
        let mut buf = BytesMut::new();
        Header::new(Operation::HeartbeatReply, 2).encode_to(&mut buf);
        buf.put_slice(&[0, 1]);

        let packet = decode(&buf).unwrap();
        assert!(packet.events.is_empty());
        assert!(matches!(packet.failures[0], Error::BufferTooSmall { needed: 4, have: 2 }));
    }

    #[test]
    fn test_deflate_nested_batch() {
        let mut inner = BytesMut::new();
        inner.extend_from_slice(&json_packet(json!({"cmd": "A"})));
        inner.extend_from_slice(&json_packet(json!({"cmd": "B"})));

        let outer = encode_packet(&deflate(&inner), Operation::Message, ProtocolVersion::Deflate);
        let packet = decode(&outer).unwrap();

        assert_eq!(packet.header.version, ProtocolVersion::Deflate);
        assert_eq!(
            packet.events,
            vec![Event::Json(json!({"cmd": "A"})), Event::Json(json!({"cmd": "B"}))]
        );
    }

    #[test]
    fn test_bad_json_isolated() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_packet(b"{nope", Operation::Message, ProtocolVersion::Json));
        buf.extend_from_slice(&json_packet(json!({"cmd": "OK"})));

        let packet = decode(&buf).unwrap();
        assert_eq!(packet.events, vec![Event::Json(json!({"cmd": "OK"}))]);
        assert_eq!(packet.failures.len(), 1);
        assert!(matches!(packet.failures[0], Error::Json(_)));
    }

    #[test]
    fn test_unsupported_version_isolated() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_packet(b"{}", Operation::Message, ProtocolVersion::Unknown(7)));
        buf.extend_from_slice(&json_packet(json!({"cmd": "OK"})));

        let packet = decode(&buf).unwrap();
        assert_eq!(packet.events.len(), 1);
        assert!(matches!(packet.failures[0], Error::UnsupportedVersion(7)));
    }

    #[test]
    fn test_corrupt_deflate() {
        let outer = encode_packet(b"not zlib", Operation::Message, ProtocolVersion::Deflate);
        let packet = decode(&outer).unwrap();
        assert!(packet.events.is_empty());
        assert!(matches!(packet.failures[0], Error::Decompress(_)));
    }

    #[test]
    fn test_nesting_bound() {
        let mut data = json_packet(json!({"cmd": "DEEP"})).to_vec();
        for _ in 0..MAX_NESTING_DEPTH + 1 {
            data = encode_packet(&deflate(&data), Operation::Message, ProtocolVersion::Deflate)
                .to_vec();
        }

        let packet = decode(&data).unwrap();
        assert!(packet.events.is_empty());
        assert!(matches!(packet.failures[0], Error::NestingTooDeep(_)));
    }
}
