//! Block chain: bump allocation over a chain of fixed-size blocks
//!
//! # Safety
//!
//! Blocks are raw system-heap buffers owned by the chain:
//! - Each block is allocated via `std::alloc::alloc` with the pool's block layout
//! - Each block is deallocated exactly once in `Drop`
//! - The only pointer arithmetic is `Block::ptr_at`, which is handed an offset
//!   the caller has already bounds-checked against the block capacity
//!
//! ## Invariants
//!
//! - `last <= capacity` for every block
//! - `last` only moves forward between rewinds
//! - Blocks are only appended; indices are stable until the chain is dropped
//! - `current < blocks.len()`

use std::alloc::{Layout, alloc, dealloc};
use std::ops::Range;
use std::ptr::NonNull;

use tracing::trace;

use crate::config::FAILED_BLOCK_BUDGET;
use crate::error::{PoolError, PoolResult};
use crate::utils::checked_align_up;

/// One fixed-size buffer of the chain
pub(crate) struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
    /// First free byte offset
    last: usize,
    /// Times this block was passed over while the chain had to grow
    failed: usize,
}

// SAFETY: Block exclusively owns its buffer; the raw pointer is never shared
// outside the pool, and the pool serializes all mutation.
unsafe impl Send for Block {}

impl Block {
    /// Allocates a new block with the given layout
    fn new(layout: Layout) -> PoolResult<Self> {
        debug_assert!(layout.size() > 0);

        // SAFETY: Allocating a block from the global allocator.
        // - layout has non-zero size (validated by PoolConfig::validate)
        // - alloc returns null on failure (handled below)
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| PoolError::out_of_memory_with_layout(layout))?;

        Ok(Self {
            ptr,
            layout,
            last: 0,
            failed: 0,
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Reserves `size` bytes at an offset aligned to `align`
    ///
    /// Block memory is aligned to the pool alignment, which is at least the
    /// requested alignment, so aligning the offset aligns the address.
    #[inline]
    fn try_bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let candidate = checked_align_up(self.last, align)?;
        if candidate > self.capacity() || self.capacity() - candidate < size {
            return None;
        }

        self.last = candidate + size;
        debug_assert!(self.last <= self.capacity());
        Some(self.ptr_at(candidate))
    }

    /// Pointer to `offset` bytes into the block
    #[inline]
    fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.capacity(), "offset past end of block");
        // SAFETY: Pointer arithmetic within the block allocation.
        // - offset <= capacity (asserted above), so the result is in bounds
        //   or one past the end, both valid for `add`
        // - ptr is non-null, so ptr + offset is non-null
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }

    /// Rewinds the cursor to the start of the block
    #[inline]
    fn rewind(&mut self) {
        self.last = 0;
        self.failed = 0;
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: Deallocating block memory.
        // - ptr was allocated via alloc() in new() with this exact layout
        // - This is called exactly once (Drop guarantee)
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

/// Append-only chain of blocks addressed by index
pub(crate) struct BlockChain {
    blocks: Vec<Block>,
    /// First block still worth probing
    current: usize,
    layout: Layout,
}

impl BlockChain {
    /// Creates a chain holding a single block
    pub(crate) fn new(block_size: usize, block_alignment: usize) -> PoolResult<Self> {
        let layout = Layout::from_size_align(block_size, block_alignment)
            .map_err(|_| PoolError::invalid_layout(block_size, block_alignment))?;

        let mut blocks = Vec::new();
        blocks
            .try_reserve(1)
            .map_err(|_| PoolError::out_of_memory_with_layout(Layout::new::<Block>()))?;
        blocks.push(Block::new(layout)?);

        Ok(Self {
            blocks,
            current: 0,
            layout,
        })
    }

    /// Bump-allocates `size` bytes aligned to `align`, growing the chain when
    /// no block from `current` onwards has room.
    pub(crate) fn allocate(&mut self, size: usize, align: usize) -> PoolResult<NonNull<u8>> {
        debug_assert!(size <= self.layout.size());
        debug_assert!(align <= self.layout.align());

        for block in &mut self.blocks[self.current..] {
            if let Some(ptr) = block.try_bump(size, align) {
                return Ok(ptr);
            }
        }

        self.grow(size)
    }

    /// Appends a block with the first `size` bytes already handed out
    fn grow(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let mut block = Block::new(self.layout)?;
        self.blocks
            .try_reserve(1)
            .map_err(|_| PoolError::out_of_memory_with_layout(Layout::new::<Block>()))?;

        // Every block the walk passed over, except the old tail, takes a
        // failure; blocks over budget are skipped by later searches.
        let tail = self.blocks.len() - 1;
        for index in self.current..tail {
            let block = &mut self.blocks[index];
            let failed = block.failed;
            block.failed += 1;
            if failed >= FAILED_BLOCK_BUDGET {
                self.current = index + 1;
            }
        }

        block.last = size;
        let ptr = block.ptr_at(0);
        self.blocks.push(block);

        trace!(
            blocks = self.blocks.len(),
            current = self.current,
            "block chain grew"
        );

        Ok(ptr)
    }

    /// Rewinds every block and restarts the search at the first block
    pub(crate) fn rewind(&mut self) {
        for block in &mut self.blocks {
            block.rewind();
        }
        self.current = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn current(&self) -> usize {
        self.current
    }

    /// Total bytes reserved by the chain
    pub(crate) fn capacity(&self) -> usize {
        self.blocks.len() * self.layout.size()
    }

    /// Bytes consumed by small allocations, alignment padding included
    pub(crate) fn used(&self) -> usize {
        self.blocks.iter().map(|block| block.last).sum()
    }

    /// Address range of every block in chain order
    pub(crate) fn spans(&self) -> Vec<Range<usize>> {
        self.blocks
            .iter()
            .map(|block| block.base()..block.base() + block.capacity())
            .collect()
    }
}
