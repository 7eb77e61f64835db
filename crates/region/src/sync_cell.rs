//! Interior mutability for pool state shared across threads.
//!
//! `SyncUnsafeCell` holds the pool's block chain and large registry. It is
//! only dereferenced while the pool's exclusion strategy is held, which is
//! what makes handing out `&mut` to the inner state sound.

use core::cell::UnsafeCell;

/// A wrapper around `UnsafeCell<T>` that implements `Sync`.
///
/// # Safety
///
/// The caller must ensure that access to the inner value is properly synchronized.
/// `Pool` guarantees this by dereferencing the cell only through an
/// `ExclusiveState` guard.
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T: ?Sized>(UnsafeCell<T>);

// SAFETY: SyncUnsafeCell<T> is Sync if T is Send.
// - The UnsafeCell wrapper doesn't add thread-local state
// - Every dereference happens under the pool's exclusion strategy
// - T: Send ensures the value can be transferred between threads
unsafe impl<T: ?Sized + Send> Sync for SyncUnsafeCell<T> {}

// SAFETY: SyncUnsafeCell<T> is Send if T is Send.
// - Wrapper is repr(transparent), same layout as UnsafeCell<T>
// - No thread-local state in wrapper
unsafe impl<T: ?Sized + Send> Send for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    /// Creates a new `SyncUnsafeCell` containing the given value.
    #[inline]
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }
}

impl<T: ?Sized> SyncUnsafeCell<T> {
    /// Gets a mutable pointer to the wrapped value.
    #[inline]
    pub(crate) const fn get(&self) -> *mut T {
        self.0.get()
    }

    /// Gets a mutable reference through exclusive ownership of the cell.
    #[inline]
    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}
