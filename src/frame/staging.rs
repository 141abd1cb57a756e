//! Staging upload pipeline
//!
//! A [`FrameArena`](super::FrameArena)-shaped double buffer whose slots each
//! own a command recording and a completion fence. Callers allocate a mapped
//! scratch range, write source bytes into it, and record a device-side copy
//! into the returned command list; `end_frame` submits the recording and
//! rotates slots.
//!
//! A slot that was submitted is not touched again until its fence has been
//! observed signaled. The wait happens lazily at the next allocation from
//! that slot rather than eagerly at swap time, which is what lets the CPU
//! fill slot B while the device still drains slot A.

use std::sync::Arc;

use crate::core::align_up;
use crate::device::{CommandListId, DeviceContext, FenceId, MemoryBlockId};
use crate::error::{GfxMemError, MemResult};

use super::ArenaSlice;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Configuration for [`StagingPipeline`].
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Memory class backing the staging buffers; must be host visible.
    pub memory_class: usize,

    /// Capacity of each of the two steady-state buffers, in bytes.
    ///
    /// Requests above this take the dedicated one-off path, so the capacity
    /// only needs to cover a typical frame's uploads, not the worst case.
    pub capacity: u64,
}

impl StagingConfig {
    pub fn validate(&self) -> MemResult<()> {
        if self.capacity == 0 {
            return Err(GfxMemError::invalid_config("zero-capacity staging buffer"));
        }
        Ok(())
    }
}

struct StagingSlot {
    block: MemoryBlockId,
    mapped: core::ptr::NonNull<u8>,
    cursor: u64,
    /// Command list being recorded into this frame, if any.
    recording: Option<CommandListId>,
    fence: FenceId,
    /// Set between submit and the lazy fence wait on reuse.
    submitted: bool,
}

struct OneOffUpload {
    block: MemoryBlockId,
    commands: CommandListId,
    fence: FenceId,
}

/// A staged scratch range plus the command list to record its copy into.
#[derive(Debug)]
pub struct StagingAlloc {
    /// Mapped scratch range holding the source bytes.
    pub region: ArenaSlice,
    /// Record the copy from `region` to its destination in here.
    pub commands: CommandListId,
}

/// Double-buffered staging allocator with per-slot fences and a dedicated
/// path for oversized uploads.
pub struct StagingPipeline<D: DeviceContext> {
    device: Arc<D>,
    config: StagingConfig,
    slots: [StagingSlot; 2],
    active: usize,
    /// Oversized uploads made this frame; flushed at `end_frame`.
    one_offs: Vec<OneOffUpload>,
    #[cfg(feature = "stats")]
    high_water: u64,
    destroyed: bool,
}

impl<D: DeviceContext> StagingPipeline<D> {
    /// Allocate and map both staging buffers, one fence each.
    pub fn new(device: Arc<D>, config: StagingConfig) -> MemResult<Self> {
        config.validate()?;
        let slots = [
            Self::create_slot(&device, &config)?,
            Self::create_slot(&device, &config)?,
        ];
        Ok(Self {
            device,
            config,
            slots,
            active: 0,
            one_offs: Vec::new(),
            #[cfg(feature = "stats")]
            high_water: 0,
            destroyed: false,
        })
    }

    fn create_slot(device: &Arc<D>, config: &StagingConfig) -> MemResult<StagingSlot> {
        let block = device.allocate_block(config.memory_class, config.capacity)?;
        let mapped = device.map_block(block)?;
        let fence = device.create_fence()?;
        Ok(StagingSlot {
            block,
            mapped,
            cursor: 0,
            recording: None,
            fence,
            submitted: false,
        })
    }

    /// Allocate a staging range and the command list to record its copy.
    ///
    /// Requests that do not fit the configured capacity at all get a
    /// dedicated one-off block with a throwaway command list; it is
    /// submitted, waited on and torn down at the next [`end_frame`], so a
    /// single oversized upload never forces the steady-state capacity up.
    ///
    /// [`end_frame`]: StagingPipeline::end_frame
    pub fn allocate(&mut self, size: u64, align: u64) -> MemResult<StagingAlloc> {
        if !align.is_power_of_two() {
            return Err(GfxMemError::invalid_config(format!(
                "alignment {align} is not a power of two"
            )));
        }
        if size > self.config.capacity {
            return self.allocate_one_off(size, align);
        }

        let capacity = self.config.capacity;
        let slot = &mut self.slots[self.active];

        if slot.submitted {
            // Previous use of this slot is still in flight; reusing the
            // memory before the fence signals would corrupt the upload.
            self.device.wait_fence(slot.fence)?;
            slot.submitted = false;
            #[cfg(feature = "logging")]
            trace!(slot = self.active, "staging slot fence observed");
        }

        if slot.recording.is_none() {
            slot.recording = Some(self.device.begin_commands()?);
        }

        let aligned = align_up(slot.cursor, align);
        let end = aligned.checked_add(size).filter(|&end| end <= capacity);
        let Some(end) = end else {
            return Err(GfxMemError::arena_exhausted(
                "staging",
                size,
                capacity.saturating_sub(aligned),
            ));
        };
        slot.cursor = end;

        #[cfg(feature = "stats")]
        {
            self.high_water = self.high_water.max(end);
        }

        // SAFETY: aligned < capacity keeps the pointer inside the mapped
        // block.
        let ptr = unsafe {
            core::ptr::NonNull::new_unchecked(slot.mapped.as_ptr().add(aligned as usize))
        };
        Ok(StagingAlloc {
            region: ArenaSlice::new(ptr, slot.block, aligned, size),
            commands: slot.recording.expect("recording was just begun"),
        })
    }

    fn allocate_one_off(&mut self, size: u64, align: u64) -> MemResult<StagingAlloc> {
        let padded = align_up(size, align);
        let block = self.device.allocate_block(self.config.memory_class, padded)?;
        let mapped = self.device.map_block(block)?;
        let commands = self.device.begin_commands()?;
        let fence = self.device.create_fence()?;
        self.one_offs.push(OneOffUpload {
            block,
            commands,
            fence,
        });

        #[cfg(feature = "logging")]
        debug!(size, padded, "dedicated one-off staging upload");

        Ok(StagingAlloc {
            region: ArenaSlice::new(mapped, block, 0, size),
            commands,
        })
    }

    /// Submit this frame's uploads and rotate slots.
    ///
    /// Pending recorded copies on the active slot are submitted with the
    /// slot's fence. One-off uploads are submitted, waited on and destroyed
    /// here, blocking the caller. The active cursor resets and the other
    /// slot becomes active; its fence (if in flight) is waited on lazily at
    /// the next allocation.
    pub fn end_frame(&mut self) -> MemResult<()> {
        let slot = &mut self.slots[self.active];
        if let Some(commands) = slot.recording.take() {
            self.device.submit_commands(commands, slot.fence)?;
            slot.submitted = true;
            #[cfg(feature = "logging")]
            trace!(slot = self.active, "staging slot submitted");
        }

        for one_off in self.one_offs.drain(..) {
            self.device.submit_commands(one_off.commands, one_off.fence)?;
            self.device.wait_fence(one_off.fence)?;
            self.device.destroy_fence(one_off.fence)?;
            self.device.free_block(one_off.block)?;
        }

        self.slots[self.active].cursor = 0;
        self.active ^= 1;
        Ok(())
    }

    /// Index of the slot currently being filled (0 or 1).
    #[must_use]
    pub fn active_slot(&self) -> usize {
        self.active
    }

    /// Per-slot capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Highest cursor value ever reached across both slots.
    #[cfg(feature = "stats")]
    #[must_use]
    pub fn high_water_mark(&self) -> u64 {
        self.high_water
    }

    /// Drain outstanding work and release all device resources. Idempotent.
    pub fn destroy(&mut self) -> MemResult<()> {
        if self.destroyed {
            return Ok(());
        }
        for one_off in self.one_offs.drain(..) {
            self.device.submit_commands(one_off.commands, one_off.fence)?;
            self.device.wait_fence(one_off.fence)?;
            self.device.destroy_fence(one_off.fence)?;
            self.device.free_block(one_off.block)?;
        }
        for slot in &mut self.slots {
            if let Some(commands) = slot.recording.take() {
                // No abort path exists: recorded work is always submitted
                // and drained before its memory goes away.
                self.device.submit_commands(commands, slot.fence)?;
                slot.submitted = true;
            }
            if slot.submitted {
                self.device.wait_fence(slot.fence)?;
                slot.submitted = false;
            }
            self.device.destroy_fence(slot.fence)?;
            self.device.free_block(slot.block)?;
        }
        self.destroyed = true;
        Ok(())
    }
}

impl<D: DeviceContext> Drop for StagingPipeline<D> {
    fn drop(&mut self) {
        // Best effort: device errors cannot propagate out of drop.
        let _ = self.destroy();
    }
}
