//! Multi-threaded tests for the exclusion strategies

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use nebula_region::prelude::*;

const THREADS: usize = 8;
const PER_THREAD: usize = 1000;

fn assert_disjoint(mut spans: Vec<Range<usize>>) {
    spans.sort_by_key(|span| span.start);
    for pair in spans.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "regions overlap: {:#x?} and {:#x?}",
            pair[0],
            pair[1]
        );
    }
}

fn hammer<E: ExclusionStrategy>(pool: &Pool<E>) -> (Vec<Range<usize>>, usize) {
    let failures = AtomicUsize::new(0);

    let spans = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let failures = &failures;
                scope.spawn(move || {
                    let mut spans = Vec::with_capacity(PER_THREAD);
                    for i in 0..PER_THREAD {
                        let size = 8 + (worker + i) % 57;
                        match pool.alloc(size) {
                            Ok(region) => {
                                // SAFETY: no reset happens while workers run
                                unsafe { region.as_mut_slice().fill(worker as u8) };
                                spans.push(region.span());
                            }
                            Err(PoolError::Busy) => {
                                failures.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => panic!("unexpected allocation error: {e}"),
                        }
                    }
                    spans
                })
            })
            .collect();

        workers
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    (spans, failures.into_inner())
}

#[test]
fn test_spin_pool_regions_are_distinct() {
    let pool = SpinPool::with_defaults().unwrap();
    let (spans, failures) = hammer(&pool);

    assert_eq!(failures, 0);
    assert_eq!(spans.len(), THREADS * PER_THREAD);
    assert_disjoint(spans);
    assert_eq!(
        pool.stats().small_allocations,
        (THREADS * PER_THREAD) as u64
    );
}

#[cfg(feature = "parking")]
#[test]
fn test_parking_pool_regions_are_distinct() {
    let pool = ParkingPool::with_defaults().unwrap();
    let (spans, failures) = hammer(&pool);

    assert_eq!(failures, 0);
    assert_eq!(spans.len(), THREADS * PER_THREAD);
    assert_disjoint(spans);
}

#[test]
fn test_non_blocking_pool_accounts_every_attempt() {
    let pool = NonBlockingPool::with_defaults().unwrap();
    let (spans, busy) = hammer(&pool);

    assert_eq!(spans.len() + busy, THREADS * PER_THREAD);
    assert_disjoint(spans);

    let stats = pool.stats();
    assert_eq!(stats.busy_rejections, busy as u64);

    // Every entry was released, so an idle pool is never busy
    assert!(pool.alloc(8).is_ok());
}

#[test]
fn test_shared_pool_through_arc() {
    let pool = Arc::new(SpinPool::with_block_size(1024).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..200 {
                    let large = pool.alloc(8192).unwrap();
                    pool.free(large).unwrap();
                    let _ = pool.alloc(32).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.large_live, 0);
    assert_eq!(stats.frees, 800);
    assert!(stats.large_slots <= 4);
}

#[test]
fn test_reset_concurrent_with_allocation() {
    let pool = SpinPool::with_block_size(512).unwrap();
    let resets = 50;

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..500 {
                    let _ = pool.alloc(48).unwrap();
                    let _ = pool.alloc(2048).unwrap();
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..resets {
                pool.reset();
                thread::yield_now();
            }
        });
    });

    let stats = pool.stats();
    assert_eq!(stats.generation, resets);
    assert_eq!(stats.resets, resets);

    pool.reset();
    let base = pool.block_spans()[0].start;
    assert_eq!(pool.alloc(8).unwrap().addr(), base);
}

#[test]
fn test_non_blocking_reset_waits() {
    let pool = NonBlockingPool::with_block_size(256).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..500 {
                    let _ = pool.alloc(16);
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..20 {
                pool.reset();
            }
        });
    });

    assert_eq!(pool.generation(), 20);
}
