//! Benchmarks for bit flipping and recovery statistics
//!
//! Run with: cargo bench --package bitmend-core --bench recovery

use bitmend_core::chunk::ChunkId;
use bitmend_core::flipper::{BitFlipper, InProcessFlipper};
use bitmend_core::recovery::{bit_diff_stats, recovery_stats};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 256) as u8).collect()
}

fn bench_flip(c: &mut Criterion) {
    let flipper = InProcessFlipper::new(42);
    let id = ChunkId::new("image_0001", 0);
    let data = generate_data(4096);

    let mut group = c.benchmark_group("in_process_flip");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for percent in [0.05, 0.5, 5.0] {
        group.bench_with_input(BenchmarkId::from_parameter(percent), &percent, |b, &p| {
            b.iter(|| flipper.flip(&id, black_box(&data), p))
        });
    }
    group.finish();
}

fn bench_stats(c: &mut Criterion) {
    let flipper = InProcessFlipper::new(7);
    let mut group = c.benchmark_group("recovery_stats");

    for size in [
        4 * 1024,        // one chunk
        1024 * 1024,     // 1 MB
        8 * 1024 * 1024, // 8 MB
    ] {
        let original = generate_data(size);
        let corrupted = flipper
            .flip(&ChunkId::new("bench", 0), &original, 0.5)
            .unwrap();
        let repaired = flipper
            .flip(&ChunkId::new("bench", 1), &corrupted, 0.1)
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("two_way", format!("{}KB", size / 1024)),
            &(&original, &corrupted),
            |b, (o, c)| b.iter(|| bit_diff_stats(black_box(o), black_box(c))),
        );
        group.bench_with_input(
            BenchmarkId::new("three_way", format!("{}KB", size / 1024)),
            &(&original, &corrupted, &repaired),
            |b, (o, c, r)| b.iter(|| recovery_stats(black_box(o), black_box(c), black_box(r))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_flip, bench_stats);
criterion_main!(benches);
