//! Pool throughput benchmarks
//!
//! Compares request-scoped allocation through a region pool against the
//! system heap.

use std::alloc::{Layout, alloc, dealloc};
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nebula_region::prelude::*;

const REQUESTS_PER_CYCLE: usize = 64;

/// Many small allocations, reclaimed in bulk
fn bench_small_reset_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("small_reset_cycle");
    group.throughput(Throughput::Elements(REQUESTS_PER_CYCLE as u64));

    for size in [16_usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("spin_pool", size), &size, |b, &size| {
            let pool = SpinPool::with_defaults().unwrap();
            b.iter(|| {
                for _ in 0..REQUESTS_PER_CYCLE {
                    black_box(pool.alloc(size).unwrap().addr());
                }
                pool.reset();
            });
        });

        group.bench_with_input(
            BenchmarkId::new("non_blocking_pool", size),
            &size,
            |b, &size| {
                let pool = NonBlockingPool::with_defaults().unwrap();
                b.iter(|| {
                    for _ in 0..REQUESTS_PER_CYCLE {
                        black_box(pool.alloc(size).unwrap().addr());
                    }
                    pool.reset();
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
            let layout = Layout::from_size_align(size, 8).unwrap();
            let mut ptrs = Vec::with_capacity(REQUESTS_PER_CYCLE);
            b.iter(|| unsafe {
                for _ in 0..REQUESTS_PER_CYCLE {
                    ptrs.push(black_box(alloc(layout)));
                }
                for ptr in ptrs.drain(..) {
                    dealloc(ptr, layout);
                }
            });
        });
    }

    group.finish();
}

/// Large allocations freed one by one
fn bench_large_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_free");

    group.bench_function("spin_pool", |b| {
        let pool = SpinPool::with_defaults().unwrap();
        b.iter(|| {
            let region = pool.alloc(64 * 1024).unwrap();
            black_box(region.addr());
            pool.free(region).unwrap();
        });
    });

    group.bench_function("system", |b| {
        let layout = Layout::from_size_align(64 * 1024, 16).unwrap();
        b.iter(|| unsafe {
            let ptr = alloc(layout);
            black_box(ptr);
            dealloc(ptr, layout);
        });
    });

    group.finish();
}

/// Pool creation and teardown
fn bench_create_destroy(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_destroy");

    group.bench_function("page_pool", |b| {
        b.iter(|| {
            let pool = SpinPool::with_block_size(4096).unwrap();
            black_box(pool.alloc(128).unwrap().addr());
            pool.destroy();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_small_reset_cycle,
    bench_large_free,
    bench_create_destroy
);
criterion_main!(benches);
