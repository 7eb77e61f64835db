//! Region pool: size routing, reset and teardown over the block chain and
//! the large registry
//!
//! # Safety
//!
//! All pool state lives in one [`SyncUnsafeCell`]. It is dereferenced only
//! through an [`ExclusiveState`] guard, which holds the pool's
//! [`ExclusionStrategy`] for as long as the reference lives. `Drop` reaches
//! the state through `get_mut`, which needs `&mut self` and so cannot race.

use core::fmt;
use core::ops::Range;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::block::BlockChain;
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
#[cfg(feature = "parking")]
use crate::exclusion::ParkingLock;
use crate::exclusion::{ExclusionStrategy, ExclusiveState, ReentrancyGuard, SpinLock};
use crate::large::LargeRegistry;
use crate::region::{Alignment, Region, RegionKind};
use crate::stats::{PoolCounters, PoolStats};
use crate::sync_cell::SyncUnsafeCell;

/// Pool internals guarded by the exclusion strategy
struct PoolState {
    // Declared first so large allocations are released before the blocks.
    large: LargeRegistry,
    chain: BlockChain,
}

/// Region-based memory pool
///
/// Small requests (up to [`threshold`](Self::threshold) bytes) are
/// bump-allocated from a chain of fixed-size blocks; larger ones come from the
/// system heap and are tracked so they can be freed one by one. Everything is
/// reclaimed at once by [`reset`](Self::reset), which keeps the blocks for
/// reuse, or by [`destroy`](Self::destroy).
///
/// `E` picks how concurrent callers are kept apart; see
/// [`exclusion`](crate::exclusion).
///
/// # Examples
///
/// ```
/// use nebula_region::prelude::*;
///
/// let pool = SpinPool::with_block_size(4096)?;
/// let header = pool.alloc(64)?;
/// let body = pool.alloc_unaligned(3)?;
/// assert_ne!(header.addr(), body.addr());
///
/// pool.reset();
/// pool.destroy();
/// # Ok::<(), PoolError>(())
/// ```
///
/// Regions borrow their pool, so nothing can use one after `destroy`:
///
/// ```compile_fail
/// use nebula_region::prelude::*;
///
/// let pool = SpinPool::with_defaults().unwrap();
/// let region = pool.alloc(16).unwrap();
/// pool.destroy();
/// let _ = region.addr();
/// ```
pub struct Pool<E: ExclusionStrategy = SpinLock> {
    state: SyncUnsafeCell<PoolState>,
    exclusion: E,
    counters: PoolCounters,
    generation: AtomicU64,
    threshold: usize,
    block_size: usize,
}

/// Pool whose operations are linearized by a spin lock
pub type SpinPool = Pool<SpinLock>;

/// Pool whose allocation paths report [`PoolError::Busy`] instead of waiting
pub type NonBlockingPool = Pool<ReentrancyGuard>;

/// Pool whose callers park on a mutex while waiting
#[cfg(feature = "parking")]
pub type ParkingPool = Pool<ParkingLock>;

impl<E: ExclusionStrategy> Pool<E> {
    /// Creates a pool holding one block
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let chain = BlockChain::new(config.block_size, config.block_alignment)?;
        let threshold = config.threshold();

        debug!(
            block_size = config.block_size,
            threshold,
            strategy = E::NAME,
            "region pool created"
        );

        Ok(Self {
            state: SyncUnsafeCell::new(PoolState {
                large: LargeRegistry::new(),
                chain,
            }),
            exclusion: E::default(),
            counters: PoolCounters::default(),
            generation: AtomicU64::new(0),
            threshold,
            block_size: config.block_size,
        })
    }

    /// Creates a pool with the given block size and default settings otherwise
    pub fn with_block_size(block_size: usize) -> PoolResult<Self> {
        Self::new(PoolConfig::default().with_block_size(block_size))
    }

    /// Creates a pool with page-sized blocks
    pub fn with_defaults() -> PoolResult<Self> {
        Self::new(PoolConfig::default())
    }

    /// Allocates `size` bytes
    ///
    /// Requests up to the threshold are served from the block chain, with
    /// `align` deciding whether the address is word aligned. Larger requests
    /// go to the system heap with 16-byte alignment.
    ///
    /// # Errors
    ///
    /// - [`PoolError::OutOfMemory`] when the system heap refuses a block, a
    ///   large allocation or a slot record
    /// - [`PoolError::InvalidLayout`] when `size` is too large for any
    ///   allocation to describe (it exceeds `isize::MAX` once aligned)
    /// - [`PoolError::Busy`] when another caller is inside a
    ///   [`NonBlockingPool`]
    pub fn allocate(&self, size: usize, align: Alignment) -> PoolResult<Region<'_>> {
        let mut state = self.enter()?;
        let (ptr, kind) = self.route(&mut state, size, align)?;
        Ok(Region::new(ptr, size, self.current_generation(), kind))
    }

    /// Allocates `size` word-aligned bytes
    #[inline]
    pub fn alloc(&self, size: usize) -> PoolResult<Region<'_>> {
        self.allocate(size, Alignment::Word)
    }

    /// Allocates `size` bytes with no alignment padding
    #[inline]
    pub fn alloc_unaligned(&self, size: usize) -> PoolResult<Region<'_>> {
        self.allocate(size, Alignment::Unaligned)
    }

    /// Allocates `size` word-aligned bytes, all set to zero
    pub fn alloc_zeroed(&self, size: usize) -> PoolResult<Region<'_>> {
        let mut state = self.enter()?;
        let (ptr, kind) = self.route(&mut state, size, Alignment::Word)?;

        // SAFETY: Zeroing freshly issued memory.
        // - ptr..ptr + size lies inside a block or a large allocation
        // - The exclusion is still held and the region is not yet published
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };

        Ok(Region::new(ptr, size, self.current_generation(), kind))
    }

    /// Frees one large allocation ahead of the next reset
    ///
    /// Fails with [`PoolError::NotFound`] for small regions and for regions
    /// issued before the last reset.
    pub fn free(&self, region: Region<'_>) -> PoolResult<()> {
        let addr = region.addr();
        let mut state = self.enter()?;

        if region.kind() != RegionKind::Large || region.generation() != self.current_generation()
        {
            return Err(PoolError::not_found(addr));
        }

        self.release(&mut state, addr)
    }

    /// Frees the large allocation that starts at `addr`
    ///
    /// Matches by address alone, without the generation check of
    /// [`free`](Self::free).
    pub fn free_addr(&self, addr: usize) -> PoolResult<()> {
        let mut state = self.enter()?;
        self.release(&mut state, addr)
    }

    /// Releases every large allocation and rewinds every block
    ///
    /// Blocks are kept. Every region issued so far becomes invalid. Waits for
    /// in-flight operations under every strategy.
    pub fn reset(&self) {
        let mut state = self.wait();

        let large = state.large.live();
        state.large.clear();
        state.chain.rewind();

        let generation = self.generation.fetch_add(1, Ordering::Release) + 1;
        self.counters.record_reset();

        trace!(
            generation,
            blocks = state.chain.len(),
            large,
            "region pool reset"
        );
    }

    /// Releases every large allocation and every block
    pub fn destroy(self) {
        drop(self);
    }

    /// Largest request served from the block chain
    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of resets so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.current_generation()
    }

    /// Snapshot of pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.wait();

        PoolStats {
            strategy: E::NAME,
            block_size: self.block_size,
            threshold: self.threshold,
            blocks: state.chain.len(),
            current_block: state.chain.current(),
            capacity: state.chain.capacity(),
            small_used: state.chain.used(),
            large_live: state.large.live(),
            large_bytes: state.large.live_bytes(),
            large_slots: state.large.slots(),
            small_allocations: self.counters.small_allocations(),
            large_allocations: self.counters.large_allocations(),
            frees: self.counters.frees(),
            resets: self.counters.resets(),
            busy_rejections: self.counters.busy_rejections(),
            generation: self.current_generation(),
        }
    }

    /// Address range of every block, in chain order
    pub fn block_spans(&self) -> Vec<Range<usize>> {
        self.wait().chain.spans()
    }

    #[inline]
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn enter(&self) -> PoolResult<ExclusiveState<'_, E, PoolState>> {
        ExclusiveState::enter(&self.exclusion, &self.state).inspect_err(|_| {
            self.counters.record_busy();
        })
    }

    fn wait(&self) -> ExclusiveState<'_, E, PoolState> {
        ExclusiveState::wait(&self.exclusion, &self.state)
    }

    fn route(
        &self,
        state: &mut PoolState,
        size: usize,
        align: Alignment,
    ) -> PoolResult<(NonNull<u8>, RegionKind)> {
        if size <= self.threshold {
            let ptr = state.chain.allocate(size, align.bytes())?;
            self.counters.record_small();
            Ok((ptr, RegionKind::Small))
        } else {
            let ptr = state.large.allocate(size, &mut state.chain)?;
            self.counters.record_large();
            Ok((ptr, RegionKind::Large))
        }
    }

    fn release(&self, state: &mut PoolState, addr: usize) -> PoolResult<()> {
        if state.large.release(addr) {
            self.counters.record_free();
            Ok(())
        } else {
            Err(PoolError::not_found(addr))
        }
    }
}

impl<E: ExclusionStrategy> Drop for Pool<E> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug!(
            strategy = E::NAME,
            blocks = state.chain.len(),
            large = state.large.live(),
            small_allocations = self.counters.small_allocations(),
            large_allocations = self.counters.large_allocations(),
            resets = self.counters.resets(),
            "region pool destroyed"
        );
    }
}

impl<E: ExclusionStrategy> fmt::Debug for Pool<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("strategy", &E::NAME)
            .field("block_size", &self.block_size)
            .field("threshold", &self.threshold)
            .field("generation", &self.current_generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MIN_BLOCK_SIZE, POOL_ALIGNMENT, WORD_ALIGNMENT};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pools_are_send_and_sync() {
        assert_send_sync::<SpinPool>();
        assert_send_sync::<NonBlockingPool>();
        #[cfg(feature = "parking")]
        assert_send_sync::<ParkingPool>();
    }

    #[test]
    fn routes_by_threshold() {
        let pool = SpinPool::new(PoolConfig::tiny()).unwrap();
        assert_eq!(pool.threshold(), MIN_BLOCK_SIZE);

        let small = pool.alloc(MIN_BLOCK_SIZE).unwrap();
        let large = pool.alloc(MIN_BLOCK_SIZE + 1).unwrap();
        assert_eq!(small.kind(), RegionKind::Small);
        assert_eq!(large.kind(), RegionKind::Large);

        let stats = pool.stats();
        assert_eq!(stats.small_allocations, 1);
        assert_eq!(stats.large_allocations, 1);
        assert_eq!(stats.large_live, 1);
    }

    #[test]
    fn busy_when_guard_is_held() {
        let pool = NonBlockingPool::with_block_size(1024).unwrap();
        pool.exclusion.acquire();

        assert_eq!(pool.alloc(8).unwrap_err(), PoolError::Busy);
        assert_eq!(pool.alloc_zeroed(8).unwrap_err(), PoolError::Busy);
        assert!(pool.free_addr(0x1000).unwrap_err().is_retryable());

        unsafe { pool.exclusion.release() };
        let region = pool.alloc(8).unwrap();
        assert_eq!(region.addr() % WORD_ALIGNMENT, 0);
        assert_eq!(pool.stats().busy_rejections, 3);
    }

    #[test]
    fn guard_is_released_on_every_path() {
        let pool = NonBlockingPool::with_block_size(MIN_BLOCK_SIZE).unwrap();

        let _ = pool.alloc(MIN_BLOCK_SIZE).unwrap(); // fits
        let _ = pool.alloc(MIN_BLOCK_SIZE).unwrap(); // grows the chain
        let large = pool.alloc(MIN_BLOCK_SIZE * 4).unwrap(); // large registry
        pool.free(large).unwrap();
        assert!(pool.free_addr(1).is_err()); // not found

        assert!(pool.alloc(8).is_ok());
        assert_eq!(pool.stats().busy_rejections, 0);
    }

    #[test]
    fn guard_is_released_after_exhaustion() {
        let pool = NonBlockingPool::with_block_size(1024).unwrap();

        let err = pool.alloc(isize::MAX as usize - 4096).unwrap_err();
        assert!(matches!(err, PoolError::OutOfMemory { .. }));
        assert!(!err.is_retryable());

        assert!(pool.alloc(8).is_ok());
        let stats = pool.stats();
        assert_eq!(stats.busy_rejections, 0);
        assert_eq!(stats.large_live, 0);
        assert_eq!(stats.large_slots, 0);
    }

    #[test]
    fn unrepresentable_size_is_invalid_layout() {
        let pool = SpinPool::with_defaults().unwrap();
        let err = pool.alloc(usize::MAX).unwrap_err();
        assert_eq!(
            err,
            PoolError::InvalidLayout {
                size: usize::MAX,
                align: POOL_ALIGNMENT
            }
        );
        assert!(pool.alloc(8).is_ok());
    }

    #[test]
    fn reset_bumps_generation() {
        let pool = SpinPool::with_defaults().unwrap();
        assert_eq!(pool.generation(), 0);

        let region = pool.alloc(8).unwrap();
        assert_eq!(region.generation(), 0);

        pool.reset();
        assert_eq!(pool.generation(), 1);
        assert_eq!(pool.alloc(8).unwrap().generation(), 1);
        assert_eq!(pool.stats().resets, 1);
    }

    #[test]
    fn small_regions_are_not_freeable() {
        let pool = SpinPool::with_defaults().unwrap();
        let region = pool.alloc(32).unwrap();
        let addr = region.addr();

        assert_eq!(pool.free(region), Err(PoolError::NotFound { addr }));
    }

    #[test]
    fn rejects_invalid_config() {
        let err = SpinPool::with_block_size(1).unwrap_err();
        assert_eq!(err.code(), "REGION:CONFIG:INVALID");
    }
}
