//! Platform page-size discovery
//!
//! The default block size of a pool is one memory page, and the small/large
//! threshold is capped just below it. The value is queried once per process.

use std::sync::OnceLock;

/// Page size assumed when the platform cannot be queried
pub const FALLBACK_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Returns the system memory page size in bytes
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(query_page_size)
}

/// Largest request served from a block instead of the system heap
///
/// One byte below a page, so a small allocation never straddles more than
/// one page of a page-sized block.
#[inline]
pub fn max_alloc_from_pool() -> usize {
    page_size() - 1
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no preconditions and does not touch caller memory.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(raw)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let size = page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn max_alloc_is_below_page() {
        assert_eq!(max_alloc_from_pool(), page_size() - 1);
    }
}
