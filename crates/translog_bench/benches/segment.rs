//! Segment and packet benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use translog_core::{
    compute_crc32, Encoding, Entry, Packet, Segment, SegmentMode, SerialNumRange,
    VersionHeaderContext,
};

/// Create deterministic data of given size.
fn test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn packet(first: u64, entries: u64, entry_size: usize) -> Packet {
    let data = test_data(entry_size);
    Packet::from_entries((first..first + entries).map(|s| Entry::new(s, 1, data.clone()))).unwrap()
}

fn open_segment(dir: &TempDir, encoding: Encoding) -> Segment {
    Segment::open(
        "bench",
        dir.path(),
        1,
        encoding,
        9,
        &VersionHeaderContext,
        SegmentMode::Append,
    )
    .unwrap()
}

/// Benchmark packet encoding.
fn bench_packet_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode");

    for entries in [1u64, 16, 128].iter() {
        let packet = packet(1, *entries, 256);
        group.throughput(Throughput::Bytes(packet.size_bytes() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &packet, |b, packet| {
            b.iter(|| black_box(packet.encode()));
        });
    }

    group.finish();
}

/// Benchmark packet decoding.
fn bench_packet_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_decode");

    for entries in [1u64, 16, 128].iter() {
        let encoded = packet(1, *entries, 256).encode();
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &encoded, |b, encoded| {
            b.iter(|| black_box(Packet::decode(black_box(encoded)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark block checksums.
fn bench_crc32(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32");

    for size in [256, 4096, 65536].iter() {
        let data = test_data(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(compute_crc32(black_box(data))));
        });
    }

    group.finish();
}

/// Benchmark segment appends per checksum scheme.
fn bench_segment_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_commit");
    group.sample_size(50);

    for encoding in [Encoding::None, Encoding::Crc32] {
        group.bench_function(BenchmarkId::from_parameter(encoding), |b| {
            let dir = TempDir::new().unwrap();
            let segment = open_segment(&dir, encoding);
            let mut next = 1u64;

            b.iter(|| {
                segment.commit(&packet(next, 16, 128)).unwrap();
                next += 16;
            });
        });
    }

    group.finish();
}

/// Benchmark a full segment scan.
fn bench_segment_visit(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_visit");

    for blocks in [10u64, 100].iter() {
        let dir = TempDir::new().unwrap();
        let segment = open_segment(&dir, Encoding::Crc32);
        for b in 0..*blocks {
            segment.commit(&packet(b * 16 + 1, 16, 128)).unwrap();
        }
        group.throughput(Throughput::Elements(blocks * 16));
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &segment, |b, segment| {
            b.iter(|| {
                let mut seen = 0usize;
                segment
                    .visit(SerialNumRange::tail(0), |packet| {
                        seen += packet.len();
                        true
                    })
                    .unwrap();
                black_box(seen);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_packet_encode,
    bench_packet_decode,
    bench_crc32,
    bench_segment_commit,
    bench_segment_visit,
);

criterion_main!(benches);
