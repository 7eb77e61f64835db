//! Pool configuration

use crate::error::{PoolError, PoolResult};
use crate::platform;

/// Alignment of every block and every large allocation
pub const POOL_ALIGNMENT: usize = 16;

/// Alignment of an aligned small allocation (one machine word)
pub const WORD_ALIGNMENT: usize = size_of::<usize>();

/// Smallest accepted block size
pub const MIN_BLOCK_SIZE: usize = 64;

/// Block size of the large-block preset
pub const DEFAULT_POOL_SIZE: usize = 16 * 1024;

/// Number of most recent large slots probed for reuse before a new slot is added
pub const LARGE_SLOT_SEARCH: usize = 4;

/// Block bytes charged for each new large slot record (pointer plus link)
pub const LARGE_SLOT_RECORD_SIZE: usize = 2 * size_of::<usize>();

/// Failed probes a block tolerates before the search start skips past it
pub const FAILED_BLOCK_BUDGET: usize = 5;

/// Configuration for a region pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size in bytes of every block in the chain
    pub block_size: usize,

    /// Alignment of block memory (power of two, at least one word)
    pub block_alignment: usize,

    /// Upper bound for small allocations; `None` means one byte below a page
    pub max_small_alloc: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size: platform::page_size(),
            block_alignment: POOL_ALIGNMENT,
            max_small_alloc: None,
        }
    }
}

impl PoolConfig {
    /// Creates new config with default values (one page per block)
    pub fn new() -> Self {
        Self::default()
    }

    /// Larger blocks for handlers that allocate many small objects per burst
    #[must_use]
    pub fn large_blocks() -> Self {
        Self::default().with_block_size(DEFAULT_POOL_SIZE)
    }

    /// Tiny blocks for tests that exercise chain growth
    #[must_use]
    pub fn tiny() -> Self {
        Self::default().with_block_size(MIN_BLOCK_SIZE)
    }

    /// Sets the block size
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the block alignment
    #[must_use]
    pub fn with_block_alignment(mut self, alignment: usize) -> Self {
        self.block_alignment = alignment;
        self
    }

    /// Overrides the small/large threshold cap
    #[must_use]
    pub fn with_max_small_alloc(mut self, max: usize) -> Self {
        self.max_small_alloc = Some(max);
        self
    }

    /// Largest request size served from the block chain
    ///
    /// Block metadata is kept beside the block buffer, so the whole block is
    /// usable and the threshold is the block size clamped to the cap.
    pub fn threshold(&self) -> usize {
        let cap = self
            .max_small_alloc
            .unwrap_or_else(platform::max_alloc_from_pool);
        self.block_size.min(cap)
    }

    /// Validates the configuration
    pub fn validate(&self) -> PoolResult<()> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(PoolError::invalid_config(&format!(
                "block_size {} is below the minimum of {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }

        if !self.block_alignment.is_power_of_two() || self.block_alignment < WORD_ALIGNMENT {
            return Err(PoolError::invalid_config(&format!(
                "block_alignment {} must be a power of two of at least {WORD_ALIGNMENT}",
                self.block_alignment
            )));
        }

        if self.block_alignment > self.block_size {
            return Err(PoolError::invalid_config(
                "block_alignment cannot exceed block_size",
            ));
        }

        if self.max_small_alloc == Some(0) {
            return Err(PoolError::invalid_config("max_small_alloc must be non-zero"));
        }

        if core::alloc::Layout::from_size_align(self.block_size, self.block_alignment).is_err() {
            return Err(PoolError::invalid_config("block_size overflows isize::MAX"));
        }

        Ok(())
    }
}
