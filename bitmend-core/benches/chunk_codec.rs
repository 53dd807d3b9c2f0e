//! Benchmarks for the chunk codec
//!
//! Run with: cargo bench --package bitmend-core

use bitmend_core::chunk::{decode, encode, encode_parallel};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_encode");

    for size in [
        64 * 1024,        // 64 KB, a typical photo body
        1024 * 1024,      // 1 MB
        16 * 1024 * 1024, // 16 MB
    ] {
        let data = generate_data(size + 123); // force a padded last chunk

        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("sequential", format!("{}KB", size / 1024)),
            &data,
            |b, data| b.iter(|| encode(black_box(data), 4096)),
        );
        group.bench_with_input(
            BenchmarkId::new("parallel", format!("{}KB", size / 1024)),
            &data,
            |b, data| b.iter(|| encode_parallel(black_box(data), 4096)),
        );
    }

    group.finish();
}

/// Decode cost across chunk sizes for a fixed body
fn bench_decode(c: &mut Criterion) {
    let data = generate_data(4 * 1024 * 1024 + 77);
    let mut group = c.benchmark_group("chunk_decode");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [512u32, 4096, 65536] {
        let set = encode(&data, chunk_size).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &set, |b, set| {
            b.iter(|| decode(black_box(set)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
