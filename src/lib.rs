//! # gfxmem
//!
//! GPU resource-memory management for a real-time renderer. This crate is
//! the layer below every mesh, texture and compute-storage buffer:
//!
//! - [`heap::DeviceHeapAllocator`] — persistent, pooled first-fit allocation
//!   for long-lived device memory, with a dedicated path for oversized
//!   requests
//! - [`frame::FrameArena`] / [`frame::StagingPipeline`] — double-buffered
//!   per-frame scratch and fence-synchronized upload staging
//! - [`handle::HandleTable`] — generation-counted slot maps giving callers
//!   stable resource IDs that detect stale references
//!
//! The GPU API itself stays behind the [`device::DeviceContext`] trait; the
//! engine backs it with its device, tests use
//! [`device::SoftwareDevice`].
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use gfxmem::prelude::*;
//!
//! let device = Arc::new(SoftwareDevice::with_default_classes());
//! let mut heap = DeviceHeapAllocator::new(device, HeapConfig::renderer())?;
//!
//! let vertices = heap.allocate(0, 64 * 1024, 256)?;
//! // ... bind vertices.block() at vertices.offset() ...
//! heap.free(vertices)?;
//! heap.destroy()?;
//! # Ok::<(), gfxmem::GfxMemError>(())
//! ```
//!
//! ## Features
//!
//! - `stats` (default): high-water marks and aggregate counters
//! - `logging` (default): structured logging via `tracing`
//!
//! ## Design contract
//!
//! Single submission thread throughout; no internal locking. Pools are
//! fixed-capacity: there is no growth, no defragmentation and no retry —
//! exhaustion and stale handles are typed errors that correct callers never
//! observe. Ownership is explicit: every component takes its device handle
//! through its constructor; nothing is process-global.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// Cast truncation in offset/index math is reviewed per-site
#![allow(clippy::cast_possible_truncation)]
// inline(always) on the alignment helpers is intentional for hot paths
#![allow(clippy::inline_always)]

// Error types
pub mod error;

// Core modules
pub mod core;
pub mod device;
pub mod frame;
pub mod handle;
pub mod heap;

// Re-export the types most callers need
pub use crate::error::{GfxMemError, MemResult};

pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::core::{align_up, is_aligned};
    pub use crate::device::{
        CommandListId, DeviceContext, FenceId, MemoryBlockId, MemoryClass, SoftwareDevice,
    };
    pub use crate::error::{GfxMemError, MemResult};
    pub use crate::frame::{
        ArenaConfig, ArenaSlice, FrameArena, StagingAlloc, StagingConfig, StagingPipeline,
    };
    pub use crate::handle::{Handle, HandleTable};
    pub use crate::heap::{DeviceHeapAllocation, DeviceHeapAllocator, HeapConfig, PoolStats};
}
