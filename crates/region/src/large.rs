//! Large allocation registry
//!
//! Requests above the pool threshold go straight to the system heap. Each one
//! is tracked in a slot so that it can be freed individually or in bulk on
//! reset. Emptied slots are reused, but only the most recent
//! [`LARGE_SLOT_SEARCH`] slots are probed, which keeps bookkeeping constant
//! no matter how many large allocations are live.
//!
//! A new slot record is paid for in the block chain: each one bump-allocates
//! [`LARGE_SLOT_RECORD_SIZE`] word-aligned bytes, so slot growth consumes
//! block space and can grow the chain like any small request.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use tracing::trace;

use crate::block::BlockChain;
use crate::config::{LARGE_SLOT_RECORD_SIZE, LARGE_SLOT_SEARCH, POOL_ALIGNMENT, WORD_ALIGNMENT};
use crate::error::{PoolError, PoolResult};

/// One system-heap allocation owned by the registry
struct LargeAlloc {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: LargeAlloc exclusively owns its buffer and is only touched under
// the pool's exclusion.
unsafe impl Send for LargeAlloc {}

impl LargeAlloc {
    fn new(size: usize) -> PoolResult<Self> {
        let layout = Layout::from_size_align(size, POOL_ALIGNMENT)
            .map_err(|_| PoolError::invalid_layout(size, POOL_ALIGNMENT))?;
        debug_assert!(layout.size() > 0);

        // SAFETY: Allocating from the global allocator.
        // - layout has non-zero size (large requests exceed a non-zero threshold)
        // - null is mapped to OutOfMemory below
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| PoolError::out_of_memory_with_layout(layout))?;

        Ok(Self { ptr, layout })
    }

    #[inline]
    fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl Drop for LargeAlloc {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in new() with this layout and is released once.
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

/// Slot record; `None` marks a reusable empty slot
struct LargeSlot {
    alloc: Option<LargeAlloc>,
}

/// Registry of large allocations, newest slot last
#[derive(Default)]
pub(crate) struct LargeRegistry {
    slots: Vec<LargeSlot>,
}

impl LargeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocates `size` bytes from the system heap and records them
    ///
    /// When no recent slot is empty, the record for the new slot is reserved
    /// from `chain`.
    pub(crate) fn allocate(
        &mut self,
        size: usize,
        chain: &mut BlockChain,
    ) -> PoolResult<NonNull<u8>> {
        let large = LargeAlloc::new(size)?;
        let ptr = large.ptr;

        for slot in self.slots.iter_mut().rev().take(LARGE_SLOT_SEARCH) {
            if slot.alloc.is_none() {
                slot.alloc = Some(large);
                return Ok(ptr);
            }
        }

        // Dropping `large` on failure hands the fresh allocation back.
        chain.allocate(LARGE_SLOT_RECORD_SIZE, WORD_ALIGNMENT)?;
        self.slots
            .try_reserve(1)
            .map_err(|_| PoolError::out_of_memory_with_layout(Layout::new::<LargeSlot>()))?;
        self.slots.push(LargeSlot { alloc: Some(large) });

        trace!(size, slots = self.slots.len(), "large slot added");
        Ok(ptr)
    }

    /// Frees the allocation starting at `addr`, leaving its slot empty
    ///
    /// Returns `false` if no live slot holds `addr`.
    pub(crate) fn release(&mut self, addr: usize) -> bool {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.alloc.as_ref().is_some_and(|large| large.addr() == addr));

        match slot {
            Some(slot) => {
                slot.alloc = None;
                true
            }
            None => false,
        }
    }

    /// Frees every allocation and forgets every slot
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of slot records, empty ones included
    pub(crate) fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of live allocations
    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.alloc.is_some()).count()
    }

    /// Bytes held by live allocations
    pub(crate) fn live_bytes(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.alloc.as_ref())
            .map(|large| large.layout.size())
            .sum()
    }
}
