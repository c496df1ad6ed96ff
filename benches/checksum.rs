//! 체크섬, 분할, 프레이밍 벤치마크

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sft::codec;
use sft::segment::fragment_default;
use sft::{checksum, Packet, SegmentData, SEGMENT_SIZE};

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in [SEGMENT_SIZE - 1, SEGMENT_SIZE, 64 * 1024] {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| checksum::compute(black_box(data)))
        });
    }
    group.finish();
}

fn bench_fragment(c: &mut Criterion) {
    let data = Bytes::from(vec![0x5Au8; 1024 * 1024]);
    let mut group = c.benchmark_group("fragment");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("1MiB", |b| b.iter(|| fragment_default(black_box(&data))));
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let packet = Packet::SegmentData(SegmentData::new(
        42,
        Bytes::from(vec![0xA5u8; SEGMENT_SIZE]),
        false,
    ));
    c.bench_function("encode_segment", |b| {
        b.iter(|| codec::encode(black_box(&packet)))
    });

    let frame = codec::encode(&packet).unwrap();
    c.bench_function("decode_segment", |b| {
        b.iter(|| codec::decode_payload(black_box(&frame[codec::LENGTH_PREFIX_SIZE..])))
    });
}

criterion_group!(benches, bench_checksum, bench_fragment, bench_encode);
criterion_main!(benches);
