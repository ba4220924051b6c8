//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, ClientFrame, EventType, ServerFrame};

fn bench_encode_event(c: &mut Criterion) {
    let frame = ServerFrame::chat(EventType::Message, "alice", 1_700_000_000, "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("event_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_decode_chat(c: &mut Criterion) {
    let frame = ClientFrame::chat("alice", 1_700_000_000, "x".repeat(64));
    let encoded = codec::encode_client(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("chat_64B", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_decode_encoded_string(c: &mut Criterion) {
    let inner = r#"{"user":"alice","timestamp":1700000000,"message":"hello there"}"#;
    let text = serde_json::json!({ "event": "chat", "data": inner }).to_string();

    c.bench_function("decode_chat_string_payload", |b| {
        b.iter(|| codec::decode(black_box(&text)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_event,
    bench_decode_chat,
    bench_decode_encoded_string
);
criterion_main!(benches);
