//! Allocator benchmarks: pooled heap allocation against frame-arena bumps.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use gfxmem::prelude::*;

fn bench_heap_allocate_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap");

    group.bench_function("allocate_free_256b", |b| {
        let device = Arc::new(SoftwareDevice::with_default_classes());
        let mut heap = DeviceHeapAllocator::new(device, HeapConfig::renderer()).unwrap();

        b.iter(|| {
            let allocation = heap.allocate(0, 256, 16).unwrap();
            black_box(allocation.offset());
            heap.free(allocation).unwrap();
        });

        heap.destroy().unwrap();
    });

    // Interleaved lifetimes exercise the coalescing paths.
    group.bench_function("churn_64_live", |b| {
        let device = Arc::new(SoftwareDevice::with_default_classes());
        let mut heap = DeviceHeapAllocator::new(device, HeapConfig::renderer()).unwrap();
        let mut live: Vec<DeviceHeapAllocation> = (0..64)
            .map(|_| heap.allocate(0, 1024, 64).unwrap())
            .collect();

        let mut cursor = 0usize;
        b.iter(|| {
            let old = live.swap_remove(cursor % live.len());
            heap.free(old).unwrap();
            live.push(heap.allocate(0, 1024, 64).unwrap());
            cursor = cursor.wrapping_add(17);
        });

        for allocation in live.drain(..) {
            heap.free(allocation).unwrap();
        }
        heap.destroy().unwrap();
    });

    group.finish();
}

fn bench_frame_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_arena");
    group.throughput(Throughput::Elements(128));

    group.bench_function("bump_128x64b", |b| {
        let device = Arc::new(SoftwareDevice::with_default_classes());
        let mut arena = FrameArena::new(
            device,
            ArenaConfig {
                memory_class: 1,
                capacity: 64 * 1024,
                ..ArenaConfig::default()
            },
        )
        .unwrap();

        b.iter(|| {
            for _ in 0..128 {
                let slice = arena.allocate(64, 16).unwrap();
                black_box(slice.offset());
            }
            arena.end_frame();
            arena.end_frame();
        });

        arena.destroy().unwrap();
    });

    group.finish();
}

fn bench_handle_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_table");

    group.bench_function("create_get_remove", |b| {
        let mut table: HandleTable<u64> = HandleTable::with_capacity(1024);

        b.iter(|| {
            let handle = table.create(black_box(42));
            black_box(table.get(handle).unwrap());
            table.remove(handle).unwrap();
        });

        table.destroy().unwrap();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_heap_allocate_free,
    bench_frame_arena,
    bench_handle_table
);
criterion_main!(benches);
