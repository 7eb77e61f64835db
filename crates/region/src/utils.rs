//! Alignment helpers for bump offsets and address checks.

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a power of two. Returns `None` when rounding would overflow.
#[inline(always)]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(bumped) => Some(bumped & !(align - 1)),
        None => None,
    }
}

/// Check if an address is aligned to `align`
#[inline(always)]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    addr & (align - 1) == 0
}
