//! Region-based memory pools for Nebula request handlers
//!
//! A [`Pool`] serves many short-lived allocations and reclaims them all at
//! once. Small requests are bump-allocated from a chain of fixed-size
//! blocks; requests above the pool threshold go to the system heap and can be
//! freed individually. [`Pool::reset`] rewinds the blocks for reuse and
//! [`Pool::destroy`] tears everything down.
//!
//! Pools are shared between threads by reference. The exclusion strategy is
//! a type parameter:
//!
//! - [`SpinPool`]: spin lock, every operation linearized
//! - [`NonBlockingPool`]: allocation paths fail with [`PoolError::Busy`]
//!   under contention instead of waiting
//! - [`ParkingPool`]: parking_lot mutex (feature `parking`)
//!
//! # Features
//!
//! - `parking` (default): enables [`ParkingPool`]
//!
//! # Example
//!
//! ```
//! use nebula_region::prelude::*;
//!
//! fn handle_request(pool: &SpinPool) -> PoolResult<()> {
//!     let scratch = pool.alloc_zeroed(256)?;
//!     let payload = pool.alloc(64 * 1024)?;
//!     assert!(payload.is_large());
//!
//!     // SAFETY: the pool is not reset while the slice is alive
//!     let bytes = unsafe { scratch.as_mut_slice() };
//!     bytes[0] = 1;
//!
//!     pool.free(payload)?;
//!     Ok(())
//! }
//!
//! let pool = SpinPool::with_defaults()?;
//! for _ in 0..3 {
//!     handle_request(&pool)?;
//!     pool.reset();
//! }
//! # Ok::<(), PoolError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]

// Core modules
pub mod config;
pub mod error;
pub mod exclusion;
pub mod platform;
pub mod pool;
pub mod region;
pub mod stats;
pub mod utils;

mod block;
mod large;
mod sync_cell;

// Re-export common types for convenience
pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
#[cfg(feature = "parking")]
pub use exclusion::ParkingLock;
pub use exclusion::{ExclusionStrategy, ReentrancyGuard, SpinLock};
#[cfg(feature = "parking")]
pub use pool::ParkingPool;
pub use pool::{NonBlockingPool, Pool, SpinPool};
pub use region::{Alignment, Region, RegionKind};
pub use stats::PoolStats;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude with the types most callers need
pub mod prelude {
    #[cfg(feature = "parking")]
    pub use crate::pool::ParkingPool;
    pub use crate::{
        Alignment, ExclusionStrategy, NonBlockingPool, Pool, PoolConfig, PoolError, PoolResult,
        PoolStats, Region, RegionKind, SpinPool,
    };
}
