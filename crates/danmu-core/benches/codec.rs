//! Codec benchmarks

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use danmu_core::codec::{self, encode_packet};
use danmu_core::{Operation, ProtocolVersion, Reassembler};
use std::io::Write;

fn batch() -> BytesMut {
    let mut buf = BytesMut::new();
    for i in 0..32 {
        let body = format!(
            "{{\"cmd\":\"DANMU_MSG\",\"info\":[[0,1,25,16777215],\"message {}\",[{},\"viewer\"]]}}",
            i, i
        );
        buf.extend_from_slice(&encode_packet(
            body.as_bytes(),
            Operation::Message,
            ProtocolVersion::Json,
        ));
    }
    buf
}

fn encode_benchmark(c: &mut Criterion) {
    let auth = "{\"roomid\":5440,\"platform\":\"web\",\"protover\":3,\"uid\":0,\"type\":2}";

    c.bench_function("encode_auth_packet", |b| {
        b.iter(|| black_box(codec::encode(auth, Operation::Auth)))
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let plain = batch();

    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
    writer.write_all(&plain).unwrap();
    let compressed = encode_packet(&writer.into_inner(), Operation::Message, ProtocolVersion::Brotli);

    c.bench_function("decode_plain_batch", |b| {
        b.iter(|| black_box(codec::decode(&plain).unwrap()))
    });

    c.bench_function("decode_brotli_batch", |b| {
        b.iter(|| black_box(codec::decode(&compressed).unwrap()))
    });
}

fn reassembly_benchmark(c: &mut Criterion) {
    let plain = batch();

    c.bench_function("reassemble_small_chunks", |b| {
        b.iter(|| {
            let mut r = Reassembler::new();
            for chunk in plain.chunks(100) {
                black_box(r.push(chunk).unwrap());
            }
        })
    });
}

criterion_group!(benches, encode_benchmark, decode_benchmark, reassembly_benchmark);
criterion_main!(benches);
