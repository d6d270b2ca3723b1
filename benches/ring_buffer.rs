use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use vban_stream::audio::RingBuffer;
use vban_stream::codec::{decode, encode_audio};
use vban_stream::protocol::{AudioFormat, DataType};

fn ring_write_and_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");

    for &payload_len in &[128usize, 512, 1436] {
        let payload = vec![0x5Au8; payload_len];
        group.throughput(Throughput::Bytes(payload_len as u64));
        group.bench_with_input(
            BenchmarkId::new("write_then_chunk_32", payload_len),
            &payload,
            |b, payload| {
                let mut ring = RingBuffer::new(4096).unwrap();
                b.iter(|| {
                    ring.write(black_box(payload)).unwrap();
                    while ring.len() >= 32 {
                        black_box(&ring.readable()[..32]);
                        ring.consume(32).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn packet_decode(c: &mut Criterion) {
    let format = AudioFormat::from_hz(48000, 2, DataType::I16);
    let datagram = encode_audio(&format, &[0u8; 1024], "Bench", 0).unwrap();

    c.bench_function("decode_1024_byte_payload", |b| {
        b.iter(|| decode(black_box(&datagram)).unwrap())
    });
}

criterion_group!(benches, ring_write_and_chunk, packet_decode);
criterion_main!(benches);
