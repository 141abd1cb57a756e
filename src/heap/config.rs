//! Device heap configuration

use crate::core::size::{KB, MB};
use crate::error::{GfxMemError, MemResult};

/// Configuration for [`DeviceHeapAllocator`](super::DeviceHeapAllocator).
///
/// Buckets are fixed-capacity backing blocks, one free list each, tried in
/// index order. A request larger than the last bucket takes the dedicated
/// large-allocation path instead.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Backing block capacity per bucket, in ascending order.
    pub bucket_sizes: Vec<u64>,

    /// Requests at or below this size are considered "small".
    pub small_alloc_threshold: u64,

    /// Reserve bucket 0 for small requests: anything above
    /// `small_alloc_threshold` starts its bucket walk at index 1.
    ///
    /// When false the threshold is ignored and every request starts at
    /// bucket 0.
    pub split_small_into_separate_bucket: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::renderer()
    }
}

impl HeapConfig {
    /// Bucket layout used by the renderer: a small-resource bucket plus two
    /// mesh/texture-sized ones, with sub-64K requests kept in bucket 0.
    #[must_use]
    pub fn renderer() -> Self {
        Self {
            bucket_sizes: vec![4 * MB, 16 * MB, 64 * MB],
            small_alloc_threshold: 64 * KB,
            split_small_into_separate_bucket: true,
        }
    }

    /// Small capacities for unit tests; exhaustion is cheap to reach.
    #[must_use]
    pub fn tiny_for_tests() -> Self {
        Self {
            bucket_sizes: vec![KB, 4 * KB],
            small_alloc_threshold: 256,
            split_small_into_separate_bucket: false,
        }
    }

    /// Capacity of the largest bucket; anything above it is a large
    /// allocation.
    #[must_use]
    pub fn largest_bucket(&self) -> u64 {
        self.bucket_sizes.last().copied().unwrap_or(0)
    }

    /// Validate bucket layout before any pool is created.
    pub fn validate(&self) -> MemResult<()> {
        if self.bucket_sizes.is_empty() {
            return Err(GfxMemError::invalid_config("no buckets configured"));
        }
        if self.bucket_sizes.iter().any(|&size| size == 0) {
            return Err(GfxMemError::invalid_config("zero-size bucket"));
        }
        if !self.bucket_sizes.is_sorted() {
            return Err(GfxMemError::invalid_config(
                "bucket sizes must be in ascending order",
            ));
        }
        if self.split_small_into_separate_bucket && self.bucket_sizes.len() < 2 {
            return Err(GfxMemError::invalid_config(
                "small-allocation split requires at least two buckets",
            ));
        }
        Ok(())
    }
}
