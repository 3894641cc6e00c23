//! Benchmarks for buffer views, synchronization, and strided extraction

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vellum_backend::{BackendTag, DeviceId, EmulatedBackend};
use vellum_dual::MirroredBuffer;

fn bench_backend(tag: u64) -> Arc<EmulatedBackend<f64>> {
    Arc::new(EmulatedBackend::new(
        BackendTag::from_raw(tag),
        DeviceId::from_raw(0),
    ))
}

fn slice_benchmark(c: &mut Criterion) {
    let backend = bench_backend(0xB000);
    let mut buffer = MirroredBuffer::from_vec(vec![1.0f64; 1 << 20], backend);

    c.bench_function("slice_1m", |b| {
        b.iter(|| {
            let view = buffer.slice(1024, 4096).unwrap();
            black_box(view);
        });
    });
}

fn sync_round_trip_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_round_trip");

    for size in &[1024usize, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes((size * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let backend = bench_backend(0xB001);
            let mut buffer = MirroredBuffer::from_vec(vec![0.0f64; size], backend);
            buffer.device_buffer().unwrap();

            b.iter(|| {
                buffer.mark_host_modified();
                buffer.sync_host_to_device().unwrap();
                buffer.mark_device_modified();
                buffer.sync_device_to_host().unwrap();
            });
        });
    }

    group.finish();
}

fn stacked_benchmark(c: &mut Criterion) {
    let backend = bench_backend(0xB002);
    let rows = 512;
    let cols = 512;
    let mut matrix = MirroredBuffer::from_vec(vec![1.0f64; rows * cols], backend);

    c.bench_function("stacked_256x256_of_512x512", |b| {
        b.iter(|| {
            let packed = matrix
                .stacked(rows, cols, 128, 383, 128, 383)
                .unwrap();
            black_box(packed);
        });
    });
}

criterion_group!(
    benches,
    slice_benchmark,
    sync_round_trip_benchmark,
    stacked_benchmark
);
criterion_main!(benches);
