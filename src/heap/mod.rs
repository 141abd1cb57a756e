//! Persistent device-heap allocator
//!
//! [`DeviceHeapAllocator`] owns a grid of first-fit free-list pools indexed
//! by (memory class, bucket) plus a side table of dedicated blocks for
//! requests exceeding the largest bucket. Backing blocks are reserved lazily
//! on the first allocation that touches a (class, bucket) pair and released
//! at [`destroy`](DeviceHeapAllocator::destroy).
//!
//! The allocator never grows a pool and never defragments. Exhaustion and
//! malformed frees are surfaced as typed errors; correct callers never see
//! them.

use std::sync::Arc;

use crate::core::align_up;
use crate::device::{DeviceContext, MemoryBlockId};
use crate::error::{GfxMemError, MemResult};

#[cfg(feature = "logging")]
use tracing::debug;

pub mod config;
mod free_list;

pub use config::HeapConfig;
pub use free_list::PoolStats;

use free_list::FreeListPool;

/// The result of a heap allocation: a byte range inside a device memory
/// block.
///
/// Ownership transfers to the caller, who must pass it back to
/// [`DeviceHeapAllocator::free`] exactly once.
#[derive(Debug)]
pub struct DeviceHeapAllocation {
    block: MemoryBlockId,
    offset: u64,
    size: u64,
    memory_class: usize,
    kind: AllocationKind,
}

#[derive(Debug, Clone, Copy)]
enum AllocationKind {
    Pool,
    Large { slot: u32, generation: u32 },
}

impl DeviceHeapAllocation {
    /// Backing device memory block.
    #[must_use]
    pub fn block(&self) -> MemoryBlockId {
        self.block
    }

    /// Byte offset of the allocation inside its block.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reserved size in bytes. For large allocations this is the requested
    /// size aligned up.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Memory class the allocation came from.
    #[must_use]
    pub fn memory_class(&self) -> usize {
        self.memory_class
    }

    /// True when the allocation owns a dedicated block rather than a pool
    /// range.
    #[must_use]
    pub fn is_large(&self) -> bool {
        matches!(self.kind, AllocationKind::Large { .. })
    }

    /// Generation of the large-allocation slot, for validation and debugging.
    #[must_use]
    pub fn large_generation(&self) -> Option<u32> {
        match self.kind {
            AllocationKind::Large { generation, .. } => Some(generation),
            AllocationKind::Pool => None,
        }
    }
}

struct Bucket {
    block: MemoryBlockId,
    pool: FreeListPool,
}

struct LargeSlot {
    block: Option<MemoryBlockId>,
    size: u64,
    memory_class: usize,
    generation: u32,
}

/// Pooled allocator for long-lived device memory.
pub struct DeviceHeapAllocator<D: DeviceContext> {
    device: Arc<D>,
    config: HeapConfig,
    /// Lazily created pools, `buckets[memory_class][bucket_index]`.
    buckets: Vec<Vec<Option<Bucket>>>,
    large_slots: Vec<LargeSlot>,
    large_free: Vec<u32>,
    live: u64,
    destroyed: bool,
}

impl<D: DeviceContext> DeviceHeapAllocator<D> {
    /// Create an allocator over the device's memory classes.
    ///
    /// No backing memory is reserved until the first allocation touches a
    /// (class, bucket) pair.
    pub fn new(device: Arc<D>, config: HeapConfig) -> MemResult<Self> {
        config.validate()?;
        let class_count = device.memory_classes().len();
        let buckets = (0..class_count)
            .map(|_| (0..config.bucket_sizes.len()).map(|_| None).collect())
            .collect();
        Ok(Self {
            device,
            config,
            buckets,
            large_slots: Vec::new(),
            large_free: Vec::new(),
            live: 0,
            destroyed: false,
        })
    }

    /// Allocate `size` bytes from `memory_class` at the given alignment.
    pub fn allocate(
        &mut self,
        memory_class: usize,
        size: u64,
        align: u64,
    ) -> MemResult<DeviceHeapAllocation> {
        if memory_class >= self.buckets.len() {
            return Err(GfxMemError::invalid_config(format!(
                "memory class {memory_class} out of range"
            )));
        }
        if size == 0 {
            return Err(GfxMemError::invalid_config("zero-size allocation"));
        }
        if !align.is_power_of_two() {
            return Err(GfxMemError::invalid_config(format!(
                "alignment {align} is not a power of two"
            )));
        }

        if size > self.config.largest_bucket() {
            return self.allocate_large(memory_class, size, align);
        }

        let start = if self.config.split_small_into_separate_bucket
            && size > self.config.small_alloc_threshold
        {
            1
        } else {
            0
        };

        for bucket_index in start..self.config.bucket_sizes.len() {
            let capacity = self.config.bucket_sizes[bucket_index];
            if capacity < size {
                continue;
            }

            if self.buckets[memory_class][bucket_index].is_none() {
                // First touch: reserve the backing block and seed the free
                // list with one full-span node.
                let block = self.device.allocate_block(memory_class, capacity)?;
                #[cfg(feature = "logging")]
                debug!(
                    memory_class,
                    bucket_index, capacity, "reserved bucket backing block"
                );
                self.buckets[memory_class][bucket_index] = Some(Bucket {
                    block,
                    pool: FreeListPool::new(capacity),
                });
            }

            let bucket = self.buckets[memory_class][bucket_index]
                .as_mut()
                .expect("bucket was just created");
            if let Some(offset) = bucket.pool.allocate(size, align) {
                self.live += 1;
                return Ok(DeviceHeapAllocation {
                    block: bucket.block,
                    offset,
                    size,
                    memory_class,
                    kind: AllocationKind::Pool,
                });
            }
        }

        Err(GfxMemError::pool_exhausted(memory_class, size, align))
    }

    fn allocate_large(
        &mut self,
        memory_class: usize,
        size: u64,
        align: u64,
    ) -> MemResult<DeviceHeapAllocation> {
        let padded = align_up(size, align);
        let block = self.device.allocate_block(memory_class, padded)?;

        let slot = if let Some(slot) = self.large_free.pop() {
            slot
        } else {
            self.large_slots.push(LargeSlot {
                block: None,
                size: 0,
                memory_class: 0,
                generation: 0,
            });
            (self.large_slots.len() - 1) as u32
        };
        let entry = &mut self.large_slots[slot as usize];
        entry.block = Some(block);
        entry.size = padded;
        entry.memory_class = memory_class;
        let generation = entry.generation;

        #[cfg(feature = "logging")]
        debug!(memory_class, size, padded, slot, "dedicated large allocation");

        self.live += 1;
        Ok(DeviceHeapAllocation {
            block,
            offset: 0,
            size: padded,
            memory_class,
            kind: AllocationKind::Large { slot, generation },
        })
    }

    /// Release an allocation back to its pool, or free its dedicated block.
    ///
    /// Pool frees coalesce with both neighbors immediately; large-slot
    /// indices become reusable right away (the slot generation still
    /// increments so stale copies are distinguishable while debugging).
    pub fn free(&mut self, allocation: DeviceHeapAllocation) -> MemResult<()> {
        match allocation.kind {
            AllocationKind::Large { slot, generation } => {
                let entry = self
                    .large_slots
                    .get_mut(slot as usize)
                    .filter(|entry| {
                        entry.generation == generation && entry.block == Some(allocation.block)
                    })
                    .ok_or_else(|| {
                        GfxMemError::invalid_free(allocation.offset, allocation.size)
                    })?;
                entry.block = None;
                entry.generation += 1;
                self.device.free_block(allocation.block)?;
                self.large_free.push(slot);
                self.live -= 1;
                Ok(())
            }
            AllocationKind::Pool => {
                let class_buckets = self
                    .buckets
                    .get_mut(allocation.memory_class)
                    .ok_or_else(|| {
                        GfxMemError::invalid_free(allocation.offset, allocation.size)
                    })?;
                let bucket = class_buckets
                    .iter_mut()
                    .flatten()
                    .find(|bucket| bucket.block == allocation.block)
                    .ok_or_else(|| {
                        GfxMemError::invalid_free(allocation.offset, allocation.size)
                    })?;
                bucket.pool.free(allocation.offset, allocation.size)?;
                self.live -= 1;
                Ok(())
            }
        }
    }

    /// Number of allocations not yet freed.
    #[must_use]
    pub fn live_allocations(&self) -> u64 {
        self.live
    }

    /// Stats for one (class, bucket) pool. `None` until first touch.
    #[must_use]
    pub fn bucket_stats(&self, memory_class: usize, bucket_index: usize) -> Option<PoolStats> {
        self.buckets
            .get(memory_class)?
            .get(bucket_index)?
            .as_ref()
            .map(|bucket| bucket.pool.stats())
    }

    /// Free spans of one (class, bucket) pool in offset order. `None` until
    /// first touch.
    #[must_use]
    pub fn bucket_free_spans(
        &self,
        memory_class: usize,
        bucket_index: usize,
    ) -> Option<Vec<(u64, u64)>> {
        self.buckets
            .get(memory_class)?
            .get(bucket_index)?
            .as_ref()
            .map(|bucket| bucket.pool.free_spans())
    }

    /// Release every reserved backing block.
    ///
    /// Fails with [`GfxMemError::TeardownViolation`] while allocations are
    /// live; nothing is released in that case. Idempotent once successful.
    pub fn destroy(&mut self) -> MemResult<()> {
        if self.destroyed {
            return Ok(());
        }
        if self.live > 0 {
            return Err(GfxMemError::teardown_violation(
                "DeviceHeapAllocator",
                self.live,
            ));
        }
        for class_buckets in &mut self.buckets {
            for bucket in class_buckets.iter_mut() {
                if let Some(bucket) = bucket.take() {
                    self.device.free_block(bucket.block)?;
                }
            }
        }
        self.destroyed = true;
        Ok(())
    }
}

impl<D: DeviceContext> Drop for DeviceHeapAllocator<D> {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        debug_assert!(
            self.live == 0,
            "DeviceHeapAllocator dropped with {} live allocation(s)",
            self.live
        );
        // Best effort: device errors cannot propagate out of drop.
        let _ = self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    fn device() -> Arc<SoftwareDevice> {
        Arc::new(SoftwareDevice::with_default_classes())
    }

    #[test]
    fn test_lazy_bucket_reservation() {
        let device = device();
        let mut heap = DeviceHeapAllocator::new(device.clone(), HeapConfig::tiny_for_tests())
            .unwrap();
        assert_eq!(device.total_blocks_allocated(), 0);

        let allocation = heap.allocate(0, 128, 16).unwrap();
        assert_eq!(device.total_blocks_allocated(), 1);
        assert!(heap.bucket_stats(0, 0).is_some());
        assert!(heap.bucket_stats(0, 1).is_none());

        heap.free(allocation).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_split_small_starts_at_bucket_one() {
        let device = device();
        let config = HeapConfig {
            bucket_sizes: vec![1024, 4096],
            small_alloc_threshold: 256,
            split_small_into_separate_bucket: true,
        };
        let mut heap = DeviceHeapAllocator::new(device, config).unwrap();

        let small = heap.allocate(0, 200, 16).unwrap();
        let medium = heap.allocate(0, 300, 16).unwrap();

        // Small request lands in bucket 0, the above-threshold one skips it.
        assert_eq!(heap.bucket_stats(0, 0).unwrap().live_allocations, 1);
        assert_eq!(heap.bucket_stats(0, 1).unwrap().live_allocations, 1);

        heap.free(small).unwrap();
        heap.free(medium).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_no_split_keeps_medium_in_bucket_zero() {
        let device = device();
        // Documented fallback: with the split disabled, a request above the
        // threshold still starts at bucket 0.
        let config = HeapConfig {
            bucket_sizes: vec![1024, 4096],
            small_alloc_threshold: 256,
            split_small_into_separate_bucket: false,
        };
        let mut heap = DeviceHeapAllocator::new(device, config).unwrap();

        let medium = heap.allocate(0, 300, 16).unwrap();
        assert_eq!(heap.bucket_stats(0, 0).unwrap().live_allocations, 1);
        assert!(heap.bucket_stats(0, 1).is_none());

        heap.free(medium).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_overflow_to_next_bucket() {
        let device = device();
        let mut heap =
            DeviceHeapAllocator::new(device, HeapConfig::tiny_for_tests()).unwrap();

        // Fill bucket 0 (1024 bytes) completely.
        let first = heap.allocate(0, 1024, 1).unwrap();
        // Next request must spill into bucket 1.
        let second = heap.allocate(0, 512, 1).unwrap();
        assert_ne!(first.block(), second.block());
        assert_eq!(heap.bucket_stats(0, 1).unwrap().live_allocations, 1);

        heap.free(first).unwrap();
        heap.free(second).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_exhaustion_is_typed_error() {
        let device = device();
        let config = HeapConfig {
            bucket_sizes: vec![1024],
            small_alloc_threshold: 256,
            split_small_into_separate_bucket: false,
        };
        let mut heap = DeviceHeapAllocator::new(device, config).unwrap();

        let a = heap.allocate(0, 800, 1).unwrap();
        let err = heap.allocate(0, 512, 1).unwrap_err();
        assert!(matches!(err, GfxMemError::PoolExhausted { .. }));

        heap.free(a).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_large_allocation_slot_generations() {
        let device = device();
        let mut heap =
            DeviceHeapAllocator::new(device.clone(), HeapConfig::tiny_for_tests()).unwrap();

        // Largest bucket is 4K; this takes the dedicated path.
        let first = heap.allocate(0, 10_000, 256).unwrap();
        assert!(first.is_large());
        assert_eq!(first.large_generation(), Some(0));
        assert_eq!(first.size(), align_up(10_000, 256));

        heap.free(first).unwrap();
        assert_eq!(device.live_blocks(), 0);

        // Slot is reused immediately, with a bumped generation.
        let second = heap.allocate(0, 20_000, 256).unwrap();
        assert_eq!(second.large_generation(), Some(1));

        heap.free(second).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_invalid_free_detected() {
        let device = device();
        let mut heap =
            DeviceHeapAllocator::new(device, HeapConfig::tiny_for_tests()).unwrap();

        let a = heap.allocate(0, 256, 1).unwrap();
        let forged = DeviceHeapAllocation {
            block: a.block(),
            offset: a.offset() + 64,
            size: 256,
            memory_class: 0,
            kind: AllocationKind::Pool,
        };
        assert!(matches!(
            heap.free(forged),
            Err(GfxMemError::InvalidFree { .. })
        ));

        heap.free(a).unwrap();
        heap.destroy().unwrap();
    }

    #[test]
    fn test_destroy_with_live_allocations_fails() {
        let device = device();
        let mut heap =
            DeviceHeapAllocator::new(device.clone(), HeapConfig::tiny_for_tests()).unwrap();

        let a = heap.allocate(0, 128, 1).unwrap();
        assert!(matches!(
            heap.destroy(),
            Err(GfxMemError::TeardownViolation { live: 1, .. })
        ));

        heap.free(a).unwrap();
        heap.destroy().unwrap();
        assert_eq!(device.live_blocks(), 0);
        // Idempotent
        heap.destroy().unwrap();
    }
}
