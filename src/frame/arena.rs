//! Double-buffered linear arena for per-frame data

use core::ptr::NonNull;
use std::sync::Arc;

use crate::core::{align_up, size::MB};
use crate::device::{DeviceContext, MemoryBlockId};
use crate::error::{GfxMemError, MemResult};

use super::ArenaSlice;

/// Configuration for [`FrameArena`].
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Memory class backing both buffers; must be host visible.
    pub memory_class: usize,

    /// Capacity of each of the two buffers, in bytes.
    pub capacity: u64,

    /// Minimum offset alignment for uniform data (device limit).
    pub uniform_align: u64,

    /// Minimum offset alignment for storage data (device limit).
    pub storage_align: u64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            memory_class: 0,
            capacity: 16 * MB,
            uniform_align: 256,
            storage_align: 64,
        }
    }
}

impl ArenaConfig {
    pub fn validate(&self) -> MemResult<()> {
        if self.capacity == 0 {
            return Err(GfxMemError::invalid_config("zero-capacity arena"));
        }
        if !self.uniform_align.is_power_of_two() || !self.storage_align.is_power_of_two() {
            return Err(GfxMemError::invalid_config(
                "arena alignments must be powers of two",
            ));
        }
        Ok(())
    }
}

struct BufferView {
    block: MemoryBlockId,
    mapped: NonNull<u8>,
    cursor: u64,
}

/// Double-buffered bump allocator over two mapped memory blocks.
///
/// Allocation is a cursor bump; there is no per-allocation free. Each
/// `end_frame` resets the active cursor and rotates to the other buffer, so
/// the CPU fills one buffer while the device still reads the other.
pub struct FrameArena<D: DeviceContext> {
    device: Arc<D>,
    config: ArenaConfig,
    views: [BufferView; 2],
    active: usize,
    #[cfg(feature = "stats")]
    high_water: u64,
    destroyed: bool,
}

impl<D: DeviceContext> FrameArena<D> {
    /// Allocate and map both buffers up front.
    pub fn new(device: Arc<D>, config: ArenaConfig) -> MemResult<Self> {
        config.validate()?;
        let views = [
            Self::create_view(&device, &config)?,
            Self::create_view(&device, &config)?,
        ];
        Ok(Self {
            device,
            config,
            views,
            active: 0,
            #[cfg(feature = "stats")]
            high_water: 0,
            destroyed: false,
        })
    }

    fn create_view(device: &Arc<D>, config: &ArenaConfig) -> MemResult<BufferView> {
        let block = device.allocate_block(config.memory_class, config.capacity)?;
        let mapped = device.map_block(block)?;
        Ok(BufferView {
            block,
            mapped,
            cursor: 0,
        })
    }

    /// Bump-allocate `size` bytes at the given alignment from the active
    /// buffer.
    pub fn allocate(&mut self, size: u64, align: u64) -> MemResult<ArenaSlice> {
        if !align.is_power_of_two() {
            return Err(GfxMemError::invalid_config(format!(
                "alignment {align} is not a power of two"
            )));
        }
        let capacity = self.config.capacity;
        let view = &mut self.views[self.active];
        let aligned = align_up(view.cursor, align);
        let end = aligned.checked_add(size).filter(|&end| end <= capacity);
        let Some(end) = end else {
            return Err(GfxMemError::arena_exhausted(
                "frame-arena",
                size,
                capacity.saturating_sub(aligned),
            ));
        };
        view.cursor = end;

        #[cfg(feature = "stats")]
        {
            self.high_water = self.high_water.max(end);
        }

        // SAFETY: aligned < capacity, so the offset stays inside the mapped
        // block, and a mapped pointer plus in-bounds offset is non-null.
        let ptr = unsafe { NonNull::new_unchecked(view.mapped.as_ptr().add(aligned as usize)) };
        Ok(ArenaSlice::new(ptr, view.block, aligned, size))
    }

    /// Allocate uniform data at the device's uniform offset alignment.
    pub fn allocate_uniform(&mut self, size: u64) -> MemResult<ArenaSlice> {
        let align = self.config.uniform_align;
        self.allocate(size, align)
    }

    /// Allocate storage data at the device's storage offset alignment.
    pub fn allocate_storage(&mut self, size: u64) -> MemResult<ArenaSlice> {
        let align = self.config.storage_align;
        self.allocate(size, align)
    }

    /// Reset the active cursor and rotate to the other buffer.
    pub fn end_frame(&mut self) {
        self.views[self.active].cursor = 0;
        self.active ^= 1;
    }

    /// Index of the buffer currently being filled (0 or 1).
    #[must_use]
    pub fn active_slot(&self) -> usize {
        self.active
    }

    /// Per-buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Highest cursor value ever reached; sizes the steady-state capacity.
    #[cfg(feature = "stats")]
    #[must_use]
    pub fn high_water_mark(&self) -> u64 {
        self.high_water
    }

    /// Release both buffers. Idempotent.
    pub fn destroy(&mut self) -> MemResult<()> {
        if self.destroyed {
            return Ok(());
        }
        for view in &self.views {
            self.device.free_block(view.block)?;
        }
        self.destroyed = true;
        Ok(())
    }
}

impl<D: DeviceContext> Drop for FrameArena<D> {
    fn drop(&mut self) {
        // Best effort: device errors cannot propagate out of drop.
        let _ = self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    fn arena(capacity: u64) -> FrameArena<SoftwareDevice> {
        let device = Arc::new(SoftwareDevice::with_default_classes());
        FrameArena::new(
            device,
            ArenaConfig {
                memory_class: 1,
                capacity,
                ..ArenaConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_bump_and_alignment() {
        let mut arena = arena(1024);
        let a = arena.allocate(10, 1).unwrap();
        assert_eq!(a.offset(), 0);

        let b = arena.allocate(10, 64).unwrap();
        assert_eq!(b.offset(), 64);

        let c = arena.allocate_uniform(8).unwrap();
        assert_eq!(c.offset(), 256);
        arena.destroy().unwrap();
    }

    #[test]
    fn test_exhaustion_no_spill() {
        let mut arena = arena(256);
        arena.allocate(200, 1).unwrap();
        let err = arena.allocate(100, 1).unwrap_err();
        assert!(matches!(
            err,
            GfxMemError::ArenaExhausted {
                available: 56,
                ..
            }
        ));
        arena.destroy().unwrap();
    }

    #[test]
    fn test_end_frame_rotates_and_resets() {
        let mut arena = arena(1024);
        arena.allocate(512, 1).unwrap();
        assert_eq!(arena.active_slot(), 0);

        arena.end_frame();
        assert_eq!(arena.active_slot(), 1);
        // Fresh cursor on the other buffer.
        let a = arena.allocate(512, 1).unwrap();
        assert_eq!(a.offset(), 0);

        arena.end_frame();
        assert_eq!(arena.active_slot(), 0);
        let b = arena.allocate(1024, 1).unwrap();
        assert_eq!(b.offset(), 0);
        arena.destroy().unwrap();
    }

    #[test]
    fn test_writes_land_in_mapped_memory() {
        let device = Arc::new(SoftwareDevice::with_default_classes());
        let mut arena = FrameArena::new(
            device.clone(),
            ArenaConfig {
                memory_class: 1,
                capacity: 64,
                ..ArenaConfig::default()
            },
        )
        .unwrap();

        let mut slice = arena.allocate(4, 1).unwrap();
        // SAFETY: written within the same frame, arena still alive.
        unsafe { slice.write(&[1, 2, 3, 4]) };

        let mapped = device.map_block(slice.block()).unwrap();
        let read = unsafe {
            core::slice::from_raw_parts(mapped.as_ptr().add(slice.offset() as usize), 4)
        };
        assert_eq!(read, &[1, 2, 3, 4]);
        arena.destroy().unwrap();
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_high_water_mark() {
        let mut arena = arena(1024);
        arena.allocate(100, 1).unwrap();
        arena.end_frame();
        arena.allocate(300, 1).unwrap();
        assert_eq!(arena.high_water_mark(), 300);
        arena.destroy().unwrap();
    }
}
