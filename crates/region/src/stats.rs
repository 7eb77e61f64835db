//! Statistics tracking for region pools

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters shared by every caller of a pool
///
/// Updated with relaxed ordering; the counters are advisory and are never
/// used to make allocation decisions.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    small_allocations: AtomicU64,
    large_allocations: AtomicU64,
    frees: AtomicU64,
    resets: AtomicU64,
    busy_rejections: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn record_small(&self) {
        self.small_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_large(&self) {
        self.large_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_busy(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn small_allocations(&self) -> u64 {
        self.small_allocations.load(Ordering::Relaxed)
    }

    pub(crate) fn large_allocations(&self) -> u64 {
        self.large_allocations.load(Ordering::Relaxed)
    }

    pub(crate) fn frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }

    pub(crate) fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub(crate) fn busy_rejections(&self) -> u64 {
        self.busy_rejections.load(Ordering::Relaxed)
    }
}

/// Immutable snapshot of pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    /// Exclusion strategy name
    pub strategy: &'static str,
    pub block_size: usize,
    pub threshold: usize,
    /// Blocks in the chain
    pub blocks: usize,
    /// Index of the first block still probed for small allocations
    pub current_block: usize,
    /// Bytes reserved by the chain
    pub capacity: usize,
    /// Bytes consumed in the chain, alignment padding included
    pub small_used: usize,
    pub large_live: usize,
    pub large_bytes: usize,
    /// Large slot records, empty ones included
    pub large_slots: usize,
    pub small_allocations: u64,
    pub large_allocations: u64,
    pub frees: u64,
    pub resets: u64,
    pub busy_rejections: u64,
    pub generation: u64,
}

impl PoolStats {
    /// Fraction of chain capacity in use (0..1)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.small_used as f64 / self.capacity as f64
        }
    }

    /// Blocks passed over by the skip-ahead heuristic
    pub fn skipped_blocks(&self) -> usize {
        self.current_block
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool Statistics ({}):", self.strategy)?;
        writeln!(f, "  Chain:")?;
        writeln!(
            f,
            "    Blocks: {} x {} bytes (current {})",
            self.blocks, self.block_size, self.current_block
        )?;
        writeln!(
            f,
            "    Used: {} / {} bytes ({:.1}%)",
            self.small_used,
            self.capacity,
            self.utilization() * 100.0
        )?;
        writeln!(f, "  Large:")?;
        writeln!(
            f,
            "    Live: {} ({} bytes) in {} slots",
            self.large_live, self.large_bytes, self.large_slots
        )?;
        writeln!(f, "  Operations:")?;
        writeln!(
            f,
            "    Small: {}, Large: {}, Frees: {}",
            self.small_allocations, self.large_allocations, self.frees
        )?;
        writeln!(
            f,
            "    Resets: {} (generation {}), Busy: {}",
            self.resets, self.generation, self.busy_rejections
        )
    }
}
