//! Exclusion strategies guarding pool state
//!
//! A [`Pool`](crate::Pool) is generic over one [`ExclusionStrategy`], chosen
//! when the pool type is named:
//!
//! - [`SpinLock`]: test-and-set flag; waiting callers yield between attempts.
//!   Every pool operation is linearized.
//! - [`ReentrancyGuard`]: non-blocking. Allocation paths that find the pool
//!   occupied fail with [`PoolError::Busy`] instead of waiting.
//! - [`ParkingLock`] (feature `parking`): parking_lot's raw mutex, for
//!   deployments where callers should sleep rather than spin.
//!
//! Reset and statistics always wait, whatever the strategy, so a reset can
//! never overlap an in-flight allocation.

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::error::{PoolError, PoolResult};
use crate::sync_cell::SyncUnsafeCell;

/// Mutual exclusion used by a pool around its mutating operations
///
/// # Safety
///
/// Implementors must guarantee that between a successful `acquire` or
/// `try_acquire` and the matching `release`, no other caller can acquire.
/// The pool hands out `&mut` to its state on that guarantee alone.
pub unsafe trait ExclusionStrategy: Default + Send + Sync + fmt::Debug {
    /// Name used in logs and statistics
    const NAME: &'static str;

    /// Blocks until exclusion is held
    fn acquire(&self);

    /// Takes exclusion if it is free, without waiting
    fn try_acquire(&self) -> bool;

    /// Gives exclusion back
    ///
    /// # Safety
    ///
    /// The caller must hold exclusion from a successful `acquire` or
    /// `try_acquire` that has not been released yet.
    unsafe fn release(&self);

    /// Entry used by allocation paths; returns `false` to report busy
    ///
    /// Waits by default.
    #[inline]
    fn enter(&self) -> bool {
        self.acquire();
        true
    }
}

// ============================================================================
// Spin lock
// ============================================================================

/// Test-and-set spin lock that yields the processor while it waits
#[derive(Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spin lock
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Whether some caller currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

// SAFETY: the swap from false to true succeeds for exactly one caller until
// the holder stores false again.
unsafe impl ExclusionStrategy for SpinLock {
    const NAME: &'static str = "spin";

    #[inline]
    fn acquire(&self) {
        while self.locked.swap(true, Ordering::Acquire) {
            thread::yield_now();
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

// ============================================================================
// Reentrancy guard
// ============================================================================

/// Non-blocking guard: a counter of callers inside the pool
///
/// Allocation paths take the counter from 0 to 1 or report busy. Every
/// successful entry is released exactly once, whichever path the operation
/// took, so the counter is always back at 0 when the pool is idle.
#[derive(Default)]
pub struct ReentrancyGuard {
    inside: AtomicUsize,
}

impl ReentrancyGuard {
    /// Creates an idle guard
    pub const fn new() -> Self {
        Self {
            inside: AtomicUsize::new(0),
        }
    }

    /// Callers currently inside the pool (0 or 1)
    pub fn inside(&self) -> usize {
        self.inside.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ReentrancyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentrancyGuard")
            .field("inside", &self.inside())
            .finish()
    }
}

// SAFETY: the compare-exchange from 0 to 1 succeeds for exactly one caller
// until the holder decrements back to 0.
unsafe impl ExclusionStrategy for ReentrancyGuard {
    const NAME: &'static str = "reentrancy";

    fn acquire(&self) {
        while !self.try_acquire() {
            thread::yield_now();
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.inside
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn release(&self) {
        let previous = self.inside.fetch_sub(1, Ordering::Release);
        debug_assert_eq!(previous, 1, "unbalanced reentrancy guard release");
    }

    #[inline]
    fn enter(&self) -> bool {
        self.try_acquire()
    }
}

// ============================================================================
// Parking lock
// ============================================================================

/// Blocking lock that parks waiting threads
#[cfg(feature = "parking")]
pub struct ParkingLock {
    raw: parking_lot::RawMutex,
}

#[cfg(feature = "parking")]
impl Default for ParkingLock {
    fn default() -> Self {
        use parking_lot::lock_api::RawMutex as _;

        Self {
            raw: parking_lot::RawMutex::INIT,
        }
    }
}

#[cfg(feature = "parking")]
impl fmt::Debug for ParkingLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use parking_lot::lock_api::RawMutex as _;

        f.debug_struct("ParkingLock")
            .field("locked", &self.raw.is_locked())
            .finish()
    }
}

// SAFETY: parking_lot's RawMutex provides mutual exclusion between lock and
// unlock.
#[cfg(feature = "parking")]
unsafe impl ExclusionStrategy for ParkingLock {
    const NAME: &'static str = "parking";

    #[inline]
    fn acquire(&self) {
        use parking_lot::lock_api::RawMutex as _;
        self.raw.lock();
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        use parking_lot::lock_api::RawMutex as _;
        self.raw.try_lock()
    }

    #[inline]
    unsafe fn release(&self) {
        use parking_lot::lock_api::RawMutex as _;
        // SAFETY: forwarded from the caller, who holds the lock.
        unsafe { self.raw.unlock() };
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Exclusive access to state behind a `SyncUnsafeCell`
///
/// Holds the strategy for its whole life and releases it on drop.
pub(crate) struct ExclusiveState<'a, E: ExclusionStrategy, T> {
    strategy: &'a E,
    state: &'a mut T,
}

impl<'a, E: ExclusionStrategy, T> ExclusiveState<'a, E, T> {
    /// Waits for exclusion
    pub(crate) fn wait(strategy: &'a E, cell: &'a SyncUnsafeCell<T>) -> Self {
        strategy.acquire();
        // SAFETY: exclusion was just acquired
        unsafe { Self::held(strategy, cell) }
    }

    /// Enters through the allocation-path policy of the strategy
    pub(crate) fn enter(strategy: &'a E, cell: &'a SyncUnsafeCell<T>) -> PoolResult<Self> {
        if !strategy.enter() {
            return Err(PoolError::busy());
        }
        // SAFETY: exclusion was just acquired
        Ok(unsafe { Self::held(strategy, cell) })
    }

    /// # Safety
    ///
    /// `strategy` must be held by the caller and `cell` must only ever be
    /// dereferenced under that strategy.
    unsafe fn held(strategy: &'a E, cell: &'a SyncUnsafeCell<T>) -> Self {
        // SAFETY: Creating the only live reference to the pool state.
        // - Exclusion is held, so no other guard exists
        // - The reference dies with this guard, before exclusion is released
        let state = unsafe { &mut *cell.get() };
        Self { strategy, state }
    }
}

impl<E: ExclusionStrategy, T> Deref for ExclusiveState<'_, E, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.state
    }
}

impl<E: ExclusionStrategy, T> DerefMut for ExclusiveState<'_, E, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.state
    }
}

impl<E: ExclusionStrategy, T> Drop for ExclusiveState<'_, E, T> {
    fn drop(&mut self) {
        // SAFETY: constructed only after acquiring, released exactly once here
        unsafe { self.strategy.release() };
    }
}
