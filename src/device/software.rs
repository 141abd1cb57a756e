//! Host-memory reference implementation of [`DeviceContext`]
//!
//! `SoftwareDevice` backs memory blocks with plain heap allocations and
//! signals fences at submit time (there is no asynchronous executor behind
//! it). It exists for tests and headless tools: the instrumentation counters
//! let a test assert *that* a fence was waited on or a block was freed, which
//! is exactly what the staging double-buffer contract is about.
//!
//! # Safety
//!
//! Mapped pointers point into boxed slices owned by the device:
//! - a `Box<[u8]>`'s heap storage never moves while the box is alive
//! - blocks are only dropped in `free_block`, and the allocators never touch
//!   a mapping after freeing its block
//! - single-threaded callers only, matching the crate-wide contract

use core::cell::RefCell;
use core::ptr::NonNull;

use crate::error::{GfxMemError, MemResult};

use super::{CommandListId, DeviceContext, FenceId, MemoryBlockId, MemoryClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Signaled,
}

struct BlockEntry {
    bytes: Box<[u8]>,
    memory_class: usize,
}

#[derive(Default)]
struct Counters {
    blocks_allocated: u64,
    blocks_freed: u64,
    submits: u64,
    fence_waits: u64,
}

struct Inner {
    classes: Vec<MemoryClass>,
    class_used: Vec<u64>,
    blocks: Vec<Option<BlockEntry>>,
    fences: Vec<Option<FenceState>>,
    commands: Vec<bool>,
    counters: Counters,
}

/// A software device context for tests and headless use.
pub struct SoftwareDevice {
    inner: RefCell<Inner>,
}

impl SoftwareDevice {
    /// Create a device exposing the given memory classes.
    #[must_use]
    pub fn new(classes: Vec<MemoryClass>) -> Self {
        let class_used = vec![0; classes.len()];
        Self {
            inner: RefCell::new(Inner {
                classes,
                class_used,
                blocks: Vec::new(),
                fences: Vec::new(),
                commands: Vec::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Two-class layout mirroring a typical discrete GPU: class 0 is
    /// device-local, class 1 is host-visible. 256 MiB each.
    #[must_use]
    pub fn with_default_classes() -> Self {
        use crate::core::size::MB;
        Self::new(vec![
            MemoryClass {
                device_local: true,
                host_visible: false,
                total_size: 256 * MB,
            },
            MemoryClass {
                device_local: false,
                host_visible: true,
                total_size: 256 * MB,
            },
        ])
    }

    /// Number of blocks currently allocated.
    #[must_use]
    pub fn live_blocks(&self) -> u64 {
        let inner = self.inner.borrow();
        inner.counters.blocks_allocated - inner.counters.blocks_freed
    }

    /// Total blocks ever allocated.
    #[must_use]
    pub fn total_blocks_allocated(&self) -> u64 {
        self.inner.borrow().counters.blocks_allocated
    }

    /// Number of command submissions so far.
    #[must_use]
    pub fn submit_count(&self) -> u64 {
        self.inner.borrow().counters.submits
    }

    /// Number of completed fence waits so far.
    #[must_use]
    pub fn fence_wait_count(&self) -> u64 {
        self.inner.borrow().counters.fence_waits
    }

    /// Number of fences currently alive.
    #[must_use]
    pub fn live_fences(&self) -> usize {
        self.inner.borrow().fences.iter().filter(|f| f.is_some()).count()
    }
}

impl DeviceContext for SoftwareDevice {
    fn memory_classes(&self) -> Vec<MemoryClass> {
        self.inner.borrow().classes.clone()
    }

    fn allocate_block(&self, memory_class: usize, size: u64) -> MemResult<MemoryBlockId> {
        let mut inner = self.inner.borrow_mut();
        let class = *inner.classes.get(memory_class).ok_or_else(|| {
            GfxMemError::device_api("allocate_block", format!("no memory class {memory_class}"))
        })?;
        if inner.class_used[memory_class] + size > class.total_size {
            return Err(GfxMemError::device_api(
                "allocate_block",
                format!("memory class {memory_class} out of device memory"),
            ));
        }
        inner.class_used[memory_class] += size;
        inner.counters.blocks_allocated += 1;

        let id = inner.blocks.len() as u64;
        inner.blocks.push(Some(BlockEntry {
            bytes: vec![0u8; size as usize].into_boxed_slice(),
            memory_class,
        }));
        Ok(MemoryBlockId(id))
    }

    fn free_block(&self, block: MemoryBlockId) -> MemResult<()> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .blocks
            .get_mut(block.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| {
                GfxMemError::device_api("free_block", format!("unknown block {}", block.0))
            })?;
        inner.class_used[entry.memory_class] -= entry.bytes.len() as u64;
        inner.counters.blocks_freed += 1;
        Ok(())
    }

    fn map_block(&self, block: MemoryBlockId) -> MemResult<NonNull<u8>> {
        let inner = self.inner.borrow();
        let entry = inner
            .blocks
            .get(block.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                GfxMemError::device_api("map_block", format!("unknown block {}", block.0))
            })?;
        if !inner.classes[entry.memory_class].host_visible {
            return Err(GfxMemError::device_api(
                "map_block",
                format!("memory class {} is not host visible", entry.memory_class),
            ));
        }
        // SAFETY: the boxed slice is non-empty heap storage that stays pinned
        // until free_block drops it.
        Ok(unsafe { NonNull::new_unchecked(entry.bytes.as_ptr().cast_mut()) })
    }

    fn begin_commands(&self) -> MemResult<CommandListId> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.commands.len() as u64;
        inner.commands.push(true);
        Ok(CommandListId(id))
    }

    fn submit_commands(&self, commands: CommandListId, fence: FenceId) -> MemResult<()> {
        let mut inner = self.inner.borrow_mut();
        let recording = inner.commands.get_mut(commands.0 as usize).ok_or_else(|| {
            GfxMemError::device_api("submit_commands", format!("unknown commands {}", commands.0))
        })?;
        if !*recording {
            return Err(GfxMemError::device_api(
                "submit_commands",
                format!("commands {} already submitted", commands.0),
            ));
        }
        *recording = false;

        match inner.fences.get_mut(fence.0 as usize).and_then(Option::as_mut) {
            // No GPU behind this device: work "completes" at submit.
            Some(state) => *state = FenceState::Signaled,
            None => {
                return Err(GfxMemError::device_api(
                    "submit_commands",
                    format!("unknown fence {}", fence.0),
                ));
            }
        }
        inner.counters.submits += 1;
        Ok(())
    }

    fn create_fence(&self) -> MemResult<FenceId> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.fences.len() as u64;
        inner.fences.push(Some(FenceState::Unsignaled));
        Ok(FenceId(id))
    }

    fn wait_fence(&self, fence: FenceId) -> MemResult<()> {
        let mut inner = self.inner.borrow_mut();
        let state = inner
            .fences
            .get_mut(fence.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                GfxMemError::device_api("wait_fence", format!("unknown fence {}", fence.0))
            })?;
        match *state {
            FenceState::Signaled => {
                *state = FenceState::Unsignaled;
                inner.counters.fence_waits += 1;
                Ok(())
            }
            // Nothing will ever signal it; a real device would deadlock here.
            FenceState::Unsignaled => Err(GfxMemError::device_api(
                "wait_fence",
                format!("fence {} was never submitted", fence.0),
            )),
        }
    }

    fn destroy_fence(&self, fence: FenceId) -> MemResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner
            .fences
            .get_mut(fence.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| {
                GfxMemError::device_api("destroy_fence", format!("unknown fence {}", fence.0))
            })?;
        Ok(())
    }
}
