//! Object allocator benchmarks
//!
//! Compares pooled, instrumented and pass-through configurations against the
//! system allocator.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use objalloc::prelude::*;
use std::alloc::Layout;
use std::hint::black_box;

const OBJECT_SIZE: usize = 64;

fn pooled(config: AllocatorConfig) -> ObjectAllocator {
    ObjectAllocator::new(OBJECT_SIZE, config.with_objects_per_page(256).with_max_pages(0)).unwrap()
}

/// Benchmark single allocation/deallocation cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");

    let configs = [
        ("pool", AllocatorConfig::production()),
        ("pool_basic_header", AllocatorConfig::production().with_header(HeaderBlock::Basic)),
        ("pool_debug", AllocatorConfig::debug()),
        ("bypass", AllocatorConfig::system()),
    ];
    for (name, config) in configs {
        group.bench_function(name, |b| {
            let mut oa = pooled(config);
            b.iter(|| unsafe {
                let ptr = oa.allocate(None).unwrap();
                oa.free(black_box(ptr)).unwrap();
            });
        });
    }

    // System allocator (baseline)
    group.bench_function("system", |b| {
        let layout = Layout::from_size_align(OBJECT_SIZE, 8).unwrap();

        b.iter(|| unsafe {
            let ptr = std::alloc::alloc(layout);
            std::alloc::dealloc(black_box(ptr), layout);
        });
    });

    group.finish();
}

/// Benchmark batch allocations followed by a full release
fn bench_batch_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocations");

    for count in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("pool", count), &count, |b, &count| {
            let mut oa = pooled(AllocatorConfig::production());
            let mut blocks = Vec::with_capacity(count);
            b.iter(|| unsafe {
                for _ in 0..count {
                    blocks.push(oa.allocate(None).unwrap());
                }
                for block in blocks.drain(..) {
                    oa.free(block).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("pool_external", count), &count, |b, &count| {
            let mut oa = pooled(AllocatorConfig::production().with_header(HeaderBlock::External));
            let mut blocks = Vec::with_capacity(count);
            b.iter(|| unsafe {
                for _ in 0..count {
                    blocks.push(oa.allocate(Some("bench")).unwrap());
                }
                for block in blocks.drain(..) {
                    oa.free(block).unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark the diagnostic walks over a populated allocator
fn bench_diagnostics(c: &mut Criterion) {
    let mut group = c.benchmark_group("diagnostics");

    let mut oa = pooled(AllocatorConfig::debug());
    let blocks: Vec<_> = (0..1024).map(|_| oa.allocate(None).unwrap()).collect();
    for block in blocks.iter().step_by(2) {
        unsafe { oa.free(*block).unwrap() };
    }

    group.bench_function("dump_memory_in_use", |b| {
        b.iter(|| black_box(oa.dump_memory_in_use(|ptr, size| {
            black_box((ptr, size));
        })));
    });

    group.bench_function("validate_pages", |b| {
        b.iter(|| black_box(oa.validate_pages(|_, _| {})));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_batch_allocations,
    bench_diagnostics
);
criterion_main!(benches);
