//! Standalone error types for nebula-region
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use core::alloc::Layout;
use thiserror::Error;
use tracing::warn;

// ============================================================================
// Main Error Type
// ============================================================================

/// Pool operation errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The system heap refused a new block or a large allocation.
    #[error("Pool allocation failed: {size} bytes with {align} byte alignment")]
    OutOfMemory { size: usize, align: usize },

    /// Another caller is inside the pool (non-blocking exclusion only).
    #[error("Pool is busy with a concurrent operation")]
    Busy,

    /// The address is not a live large allocation of this pool.
    #[error("Address {addr:#x} is not a tracked large allocation")]
    NotFound { addr: usize },

    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid memory layout: {size} bytes with {align} byte alignment")]
    InvalidLayout { size: usize, align: usize },
}

impl PoolError {
    /// Check if error is retryable
    ///
    /// Only contention is retryable; the pool never retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Check if this is a `NotFound` from an explicit free
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "REGION:ALLOC:OOM",
            Self::Busy => "REGION:SYNC:BUSY",
            Self::NotFound { .. } => "REGION:FREE:NOT_FOUND",
            Self::InvalidConfig { .. } => "REGION:CONFIG:INVALID",
            Self::InvalidLayout { .. } => "REGION:ALLOC:LAYOUT",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create out of memory error
    pub fn out_of_memory(size: usize, align: usize) -> Self {
        warn!(size, align, "system heap refused pool allocation");
        Self::OutOfMemory { size, align }
    }

    /// Create out of memory error from layout
    pub fn out_of_memory_with_layout(layout: Layout) -> Self {
        Self::out_of_memory(layout.size(), layout.align())
    }

    /// Create busy error
    pub fn busy() -> Self {
        Self::Busy
    }

    /// Create not found error
    pub fn not_found(addr: usize) -> Self {
        Self::NotFound { addr }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create invalid layout error
    pub fn invalid_layout(size: usize, align: usize) -> Self {
        Self::InvalidLayout { size, align }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;
