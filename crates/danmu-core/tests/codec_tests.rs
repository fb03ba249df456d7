//! Codec tests for danmu core

use bytes::{BufMut, Bytes, BytesMut};
use danmu_core::codec::{self, encode_packet};
use danmu_core::{Command, Event, Header, Operation, ProtocolVersion, HEADER_SIZE};
use serde_json::json;
use std::io::Write;

fn brotli(data: &[u8]) -> Vec<u8> {
    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
    writer.write_all(data).expect("brotli write failed");
    writer.into_inner()
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).expect("deflate write failed");
    enc.finish().expect("deflate finish failed")
}

/// A realistic batch: three JSON packets back to back
fn plain_batch() -> Bytes {
    let mut buf = BytesMut::new();
    for value in [
        json!({"cmd": "DANMU_MSG", "info": [[0, 1, 25], "hello", [1, "viewer"]]}),
        json!({"cmd": "SEND_GIFT", "data": {"giftName": "flower", "num": 3}}),
        json!({"cmd": "INTERACT_WORD", "data": {"uname": "someone"}}),
    ] {
        buf.extend_from_slice(&encode_packet(
            value.to_string().as_bytes(),
            Operation::Message,
            ProtocolVersion::Json,
        ));
    }
    buf.freeze()
}

#[test]
fn test_encode_decode_header_fields() {
    let payloads = ["", "{}", "{\"roomid\":1}", "弹幕 payload with unicode"];
    let ops = [
        Operation::Default,
        Operation::Heartbeat,
        Operation::Message,
        Operation::Auth,
        Operation::Unknown(99),
    ];

    for payload in payloads {
        for op in ops {
            let encoded = codec::encode(payload, op);
            let header = Header::decode(&encoded).expect("decode failed");

            assert_eq!(header.header_len as usize, HEADER_SIZE);
            assert_eq!(header.operation, op);
            assert_eq!(header.packet_len as usize, encoded.len());
            assert!(header.packet_len as usize >= HEADER_SIZE);
            assert_eq!(&encoded[HEADER_SIZE..], payload.as_bytes());
        }
    }
}

#[test]
fn test_decode_plain_batch_preserves_order() {
    let packet = codec::decode(&plain_batch()).expect("decode failed");

    let commands: Vec<_> = packet.events.iter().filter_map(Event::command).collect();
    assert_eq!(
        commands,
        vec![Command::DanmuMsg, Command::SendGift, Command::InteractWord]
    );
    assert!(packet.is_clean());
}

#[test]
fn test_brotli_matches_plain() {
    let plain = plain_batch();
    let compressed = encode_packet(&brotli(&plain), Operation::Message, ProtocolVersion::Brotli);

    let expected = codec::decode(&plain).expect("plain decode failed");
    let actual = codec::decode(&compressed).expect("brotli decode failed");

    assert_eq!(actual.header.version, ProtocolVersion::Brotli);
    assert_eq!(actual.events, expected.events);
    assert!(actual.is_clean());
}

#[test]
fn test_deflate_matches_plain() {
    let plain = plain_batch();
    let compressed = encode_packet(&deflate(&plain), Operation::Message, ProtocolVersion::Deflate);

    let expected = codec::decode(&plain).expect("plain decode failed");
    let actual = codec::decode(&compressed).expect("deflate decode failed");
    assert_eq!(actual.events, expected.events);
}

#[test]
fn test_compressed_packets_batched_with_plain() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode_packet(
        &brotli(&plain_batch()),
        Operation::Message,
        ProtocolVersion::Brotli,
    ));
    buf.extend_from_slice(&encode_packet(
        json!({"cmd": "LIVE"}).to_string().as_bytes(),
        Operation::Message,
        ProtocolVersion::Json,
    ));

    let packet = codec::decode(&buf).expect("decode failed");
    assert_eq!(packet.events.len(), 4);
    assert_eq!(packet.events[3].command(), Some(Command::Live));
}

#[test]
fn test_heartbeat_reply_online_count() {
    let mut buf = BytesMut::new();
    Header::new(Operation::HeartbeatReply, 4).encode_to(&mut buf);
    buf.put_slice(&[0, 0, 0, 42]);

    let packet = codec::decode(&buf).expect("decode failed");
    assert_eq!(packet.events, vec![Event::Heartbeat { online: 42 }]);
    assert_eq!(packet.events[0].online(), Some(42));
}

#[test]
fn test_auth_ack_body() {
    let ack = encode_packet(b"{\"code\":0}", Operation::AuthAck, ProtocolVersion::Legacy);
    let packet = codec::decode(&ack).expect("decode failed");

    assert_eq!(packet.header.operation, Operation::AuthAck);
    assert_eq!(packet.events, vec![Event::Json(json!({"code": 0}))]);
    assert_eq!(packet.events[0].command(), None);
}

#[test]
fn test_truncated_header_is_error() {
    assert!(codec::decode(&[0, 0, 0, 20, 0, 16]).is_err());
}

#[test]
fn test_length_past_buffer_is_failure() {
    let mut buf = plain_batch().to_vec();
    // Claim the last packet is longer than what was delivered
    let last = buf.len() - 10;
    buf.truncate(last);

    let packet = codec::decode(&buf).expect("decode failed");
    assert_eq!(packet.events.len(), 2);
    assert!(matches!(
        packet.failures[0],
        danmu_core::Error::InvalidPacketLength { .. }
    ));
}

#[test]
fn test_heartbeat_packet_shape() {
    let packet = codec::heartbeat_packet();
    let header = Header::decode(&packet).expect("decode failed");
    assert_eq!(header.operation, Operation::Heartbeat);
    assert_eq!(&packet[HEADER_SIZE..], danmu_core::HEARTBEAT_PAYLOAD.as_bytes());
}
