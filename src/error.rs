//! Error types for gfxmem
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Every variant here describes a programming or environment error: the
//! allocators never retry and callers are not expected to recover from
//! `PoolExhausted` or `StaleHandle` in normal operation. The typed errors
//! exist so failures are inspectable instead of aborting the process.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

/// Errors produced by the device-heap allocator, frame arenas and handle
/// tables.
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GfxMemError {
    // --- Heap errors ---
    #[error(
        "device heap exhausted: memory class {memory_class}, {requested} bytes \
         with {align} byte alignment"
    )]
    PoolExhausted {
        memory_class: usize,
        requested: u64,
        align: u64,
    },

    #[error("free() does not match a tracked allocation: offset {offset}, size {size}")]
    InvalidFree { offset: u64, size: u64 },

    // --- Frame arena errors ---
    #[error("arena '{arena_id}' exhausted: requested {requested} bytes, available {available}")]
    ArenaExhausted {
        arena_id: &'static str,
        requested: u64,
        available: u64,
    },

    // --- Handle errors ---
    #[error("stale handle: index {index}, generation {generation}")]
    StaleHandle { index: u32, generation: u32 },

    // --- Device errors ---
    #[error("device call '{call}' failed: {detail}")]
    DeviceApi { call: &'static str, detail: String },

    // --- Lifecycle errors ---
    #[error("{component} destroyed with {live} live allocation(s)")]
    TeardownViolation { component: &'static str, live: u64 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl GfxMemError {
    /// Stable error code for categorization and log filtering.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PoolExhausted { .. } => "GFX:HEAP:EXHAUSTED",
            Self::InvalidFree { .. } => "GFX:HEAP:INVALID_FREE",
            Self::ArenaExhausted { .. } => "GFX:ARENA:EXHAUSTED",
            Self::StaleHandle { .. } => "GFX:HANDLE:STALE",
            Self::DeviceApi { .. } => "GFX:DEVICE:FAILED",
            Self::TeardownViolation { .. } => "GFX:LIFECYCLE:TEARDOWN",
            Self::InvalidConfig { .. } => "GFX:CONFIG:INVALID",
        }
    }

    /// True for errors that indicate a bug in calling code rather than an
    /// environment failure. A correct caller never observes these.
    #[must_use]
    pub fn is_caller_bug(&self) -> bool {
        !matches!(self, Self::DeviceApi { .. })
    }

    // --- Convenience constructors ---

    /// Create a pool exhausted error
    pub fn pool_exhausted(memory_class: usize, requested: u64, align: u64) -> Self {
        #[cfg(feature = "logging")]
        error!(memory_class, requested, align, "device heap exhausted");

        Self::PoolExhausted {
            memory_class,
            requested,
            align,
        }
    }

    /// Create an invalid free error
    pub fn invalid_free(offset: u64, size: u64) -> Self {
        #[cfg(feature = "logging")]
        error!(offset, size, "free() does not match a tracked allocation");

        Self::InvalidFree { offset, size }
    }

    /// Create an arena exhausted error
    pub fn arena_exhausted(arena_id: &'static str, requested: u64, available: u64) -> Self {
        #[cfg(feature = "logging")]
        error!(arena_id, requested, available, "frame arena exhausted");

        Self::ArenaExhausted {
            arena_id,
            requested,
            available,
        }
    }

    /// Create a stale handle error
    pub fn stale_handle(index: u32, generation: u32) -> Self {
        #[cfg(feature = "logging")]
        error!(index, generation, "stale resource handle");

        Self::StaleHandle { index, generation }
    }

    /// Create a device API failure.
    ///
    /// The Rust rendition of the engine-wide result-check helper: wrap the
    /// failing call's name and detail, then propagate with `?`.
    pub fn device_api(call: &'static str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        #[cfg(feature = "logging")]
        error!(call, %detail, "device call failed");

        Self::DeviceApi { call, detail }
    }

    /// Create a teardown violation error
    pub fn teardown_violation(component: &'static str, live: u64) -> Self {
        #[cfg(feature = "logging")]
        warn!(component, live, "destroyed with live allocations");

        Self::TeardownViolation { component, live }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Result type for gfxmem operations
pub type MemResult<T> = core::result::Result<T, GfxMemError>;
