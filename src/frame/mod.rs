//! Per-frame scratch memory
//!
//! Two allocators share the double-buffered bump design: [`FrameArena`] for
//! CPU-written vertex/uniform/storage scratch, and [`StagingPipeline`] for
//! uploads that additionally record a device-side copy and synchronize with
//! completion fences.
//!
//! Both rotate between exactly two buffer slots per frame. Data written into
//! slot N is never overwritten until all device work referencing slot N has
//! completed; the rotation plus the staging fence wait is the sole
//! enforcement mechanism.

use core::ptr::NonNull;

use crate::device::MemoryBlockId;

pub mod arena;
pub mod staging;

pub use arena::{ArenaConfig, FrameArena};
pub use staging::{StagingAlloc, StagingConfig, StagingPipeline};

/// A scratch byte range inside a mapped per-frame buffer.
///
/// The range stays writable until the owning slot is reset: for an arena
/// that is the `end_frame` after next, for staging it is the fence-guarded
/// slot reuse. Holding a slice across that point is a caller bug.
#[derive(Debug)]
pub struct ArenaSlice {
    ptr: NonNull<u8>,
    block: MemoryBlockId,
    offset: u64,
    len: u64,
}

impl ArenaSlice {
    pub(crate) fn new(ptr: NonNull<u8>, block: MemoryBlockId, offset: u64, len: u64) -> Self {
        Self {
            ptr,
            block,
            offset,
            len,
        }
    }

    /// Mapped write pointer for this range.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Buffer (memory block) the range lives in; bind this on the device
    /// side.
    #[must_use]
    pub fn block(&self) -> MemoryBlockId {
        self.block
    }

    /// Byte offset of the range inside its buffer.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the range in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `bytes` to the start of the range.
    ///
    /// # Safety
    ///
    /// The owning slot must not have been reset since this slice was
    /// allocated (see the type-level contract), and the arena or staging
    /// pipeline must still be alive.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than the range.
    pub unsafe fn write(&mut self, bytes: &[u8]) {
        assert!(bytes.len() as u64 <= self.len, "write past end of slice");
        // SAFETY: per the function contract the range is still mapped and
        // exclusively ours; source and destination cannot overlap because
        // the destination lives in device-owned mapped memory.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr(), bytes.len());
        }
    }
}
