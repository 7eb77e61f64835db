//! Allocation scenarios
//!
//! Each scenario runs against a pool with strategy `E` in `Mode::Pool`, or
//! against the system heap in `Mode::System`. Allocation failures are counted
//! rather than treated as fatal; only pool creation aborts a run.

use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result};
use nebula_region::{ExclusionStrategy, Pool, PoolConfig, PoolStats};
use tracing::{debug, warn};

use crate::Mode;

/// Block size of the pools built by the create/destroy scenario
const CREATE_DESTROY_BLOCK_SIZE: usize = 4096;

/// Loop geometry shared by every scenario
#[derive(Debug, Clone)]
pub struct Workload {
    pub mode: Mode,
    pub threads: usize,
    pub outer: usize,
    pub inner: usize,
    pub size: usize,
    pub block_size: Option<usize>,
}

impl Workload {
    /// Allocation attempts across all threads
    pub fn attempted(&self) -> usize {
        self.threads * self.outer * self.inner
    }

    fn pool_config(&self, default_block: Option<usize>) -> PoolConfig {
        match self.block_size.or(default_block) {
            Some(block_size) => PoolConfig::default().with_block_size(block_size),
            None => PoolConfig::default(),
        }
    }
}

/// Result of one run
#[derive(Debug, Default)]
pub struct Outcome {
    pub failures: usize,
    pub stats: Option<PoolStats>,
}

/// One pool, `inner` allocations per iteration, reset after each iteration
pub fn reset_loop<E: ExclusionStrategy>(workload: &Workload) -> Result<Outcome> {
    if workload.mode == Mode::System {
        return Ok(Outcome {
            failures: system_iterations(workload),
            stats: None,
        });
    }

    let pool = Pool::<E>::new(workload.pool_config(None)).context("creating pool")?;
    let mut failures = 0;

    for _ in 0..workload.outer {
        failures += pool_iteration(&pool, workload);
        pool.reset();
    }

    Ok(Outcome {
        failures,
        stats: Some(pool.stats()),
    })
}

/// A fresh 4 KiB pool per iteration, destroyed at the end of it
pub fn create_destroy<E: ExclusionStrategy>(workload: &Workload) -> Result<Outcome> {
    if workload.mode == Mode::System {
        return Ok(Outcome {
            failures: system_iterations(workload),
            stats: None,
        });
    }

    let config = workload.pool_config(Some(CREATE_DESTROY_BLOCK_SIZE));
    let mut failures = 0;

    for _ in 0..workload.outer {
        let pool = Pool::<E>::new(config.clone()).context("creating pool")?;
        failures += pool_iteration(&pool, workload);
        pool.destroy();
    }

    Ok(Outcome {
        failures,
        stats: None,
    })
}

/// Worker threads sharing one pool; each worker resets it when finished
pub fn shared_pool<E: ExclusionStrategy>(workload: &Workload) -> Result<Outcome> {
    let failures = AtomicUsize::new(0);

    if workload.mode == Mode::System {
        thread::scope(|scope| {
            for _ in 0..workload.threads {
                scope.spawn(|| {
                    failures.fetch_add(system_iterations(workload), Ordering::Relaxed);
                });
            }
        });
        return Ok(Outcome {
            failures: failures.into_inner(),
            stats: None,
        });
    }

    let pool = Pool::<E>::new(workload.pool_config(None)).context("creating pool")?;

    thread::scope(|scope| {
        for worker in 0..workload.threads {
            let pool = &pool;
            let failures = &failures;
            scope.spawn(move || {
                let mut local = 0;
                for _ in 0..workload.outer {
                    local += pool_iteration(pool, workload);
                }
                pool.reset();
                debug!(worker, failures = local, "worker finished");
                failures.fetch_add(local, Ordering::Relaxed);
            });
        }
    });

    Ok(Outcome {
        failures: failures.into_inner(),
        stats: Some(pool.stats()),
    })
}

/// Runs `inner` pool allocations and returns how many failed
fn pool_iteration<E: ExclusionStrategy>(pool: &Pool<E>, workload: &Workload) -> usize {
    let mut failures = 0;
    for _ in 0..workload.inner {
        match pool.alloc(workload.size) {
            Ok(region) => {
                black_box(region.addr());
            }
            Err(err) if err.is_retryable() => failures += 1,
            Err(err) => {
                warn!(error = %err, code = err.code(), "allocation failed");
                failures += 1;
            }
        }
    }
    failures
}

/// Runs every iteration against the system heap and returns the failures
fn system_iterations(workload: &Workload) -> usize {
    let mut failures = 0;
    let mut live: Vec<Vec<u8>> = Vec::with_capacity(workload.inner);

    for _ in 0..workload.outer {
        for _ in 0..workload.inner {
            let mut buffer = Vec::new();
            if buffer.try_reserve_exact(workload.size).is_err() {
                failures += 1;
                continue;
            }
            black_box(buffer.as_ptr());
            live.push(buffer);
        }
        live.clear();
    }

    failures
}
