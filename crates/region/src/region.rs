//! Handles to memory issued by a pool

use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::slice;

use crate::config::WORD_ALIGNMENT;

/// Address alignment requested for a small allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    /// Machine word alignment (`size_of::<usize>()`)
    #[default]
    Word,
    /// Byte-dense placement with no padding
    Unaligned,
}

impl Alignment {
    /// Alignment in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Word => WORD_ALIGNMENT,
            Self::Unaligned => 1,
        }
    }
}

/// Which path served an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Bump-allocated from a block
    Small,
    /// Obtained from the system heap and tracked in the large registry
    Large,
}

/// Memory issued by a pool
///
/// The lifetime ties the region to the pool that issued it, so it cannot
/// outlive the pool. Its bytes stay valid until the pool is next reset.
pub struct Region<'pool> {
    ptr: NonNull<u8>,
    len: usize,
    generation: u64,
    kind: RegionKind,
    _pool: PhantomData<&'pool ()>,
}

// SAFETY: a Region is an address plus bookkeeping. Access to its bytes goes
// through the unsafe slice accessors, whose contract covers synchronization.
unsafe impl Send for Region<'_> {}
// SAFETY: see Send
unsafe impl Sync for Region<'_> {}

impl<'pool> Region<'pool> {
    pub(crate) fn new(ptr: NonNull<u8>, len: usize, generation: u64, kind: RegionKind) -> Self {
        Self {
            ptr,
            len,
            generation,
            kind,
            _pool: PhantomData,
        }
    }

    /// Start of the region
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Start address of the region
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset generation of the pool when the region was issued
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    #[inline]
    pub fn is_large(&self) -> bool {
        self.kind == RegionKind::Large
    }

    /// Byte range `[addr, addr + len)`
    #[inline]
    pub fn span(&self) -> core::ops::Range<usize> {
        self.addr()..self.addr() + self.len
    }

    /// Views the region as bytes
    ///
    /// # Safety
    ///
    /// - The owning pool must not have been reset since the region was issued
    /// - The bytes must have been initialized (always true for `alloc_zeroed`)
    /// - No `as_mut_slice` borrow of the same region may be live
    #[inline]
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: the region lies inside a live block or large allocation
        // (caller contract), and ptr is non-null.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Views the region as mutable bytes
    ///
    /// # Safety
    ///
    /// - The owning pool must not have been reset since the region was issued
    /// - No other borrow of the same region may be live
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        // SAFETY: regions issued by a pool never overlap, so exclusivity is
        // the caller's contract above.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len)
            .field("generation", &self.generation)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_bytes() {
        assert_eq!(Alignment::Word.bytes(), size_of::<usize>());
        assert_eq!(Alignment::Unaligned.bytes(), 1);
        assert_eq!(Alignment::default(), Alignment::Word);
    }

    #[test]
    fn region_accessors() {
        let mut backing = [0_u8; 32];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let region = Region::new(ptr, 32, 3, RegionKind::Small);

        assert_eq!(region.len(), 32);
        assert!(!region.is_empty());
        assert_eq!(region.generation(), 3);
        assert!(!region.is_large());
        assert_eq!(region.span().len(), 32);

        unsafe { region.as_mut_slice()[0] = 7 };
        assert_eq!(unsafe { region.as_slice() }[0], 7);
        assert!(format!("{region:?}").contains("Small"));
    }
}
