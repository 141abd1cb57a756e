//! First-fit free-list suballocator over one fixed-size backing block
//!
//! One `FreeListPool` tracks the free byte ranges of a single device memory
//! block. Free spans are kept as a singly linked list in strictly increasing
//! offset order with no two adjacent spans: frees coalesce immediately with
//! the previous neighbor first, then the following one.
//!
//! The list nodes themselves live in an index-addressed arena (`Vec`) and
//! recycled node slots are threaded through the `next` field as an intrusive
//! free-index list. No node is ever heap-allocated individually, so free-list
//! metadata cannot dangle.

use crate::core::align_up;
use crate::error::{GfxMemError, MemResult};

/// Sentinel index terminating both the span list and the node free list.
const NIL: u32 = u32::MAX;

/// Observational counters for one pool.
///
/// Invariant: `current_allocated == total_size - Σ(free span sizes)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Capacity of the backing block in bytes.
    pub total_size: u64,
    /// Bytes currently handed out.
    pub current_allocated: u64,
    /// Allocations served over the pool's lifetime.
    pub total_allocations: u64,
    /// Allocations not yet freed.
    pub live_allocations: u64,
}

#[derive(Debug, Clone, Copy)]
struct FreeNode {
    offset: u64,
    size: u64,
    next: u32,
}

/// First-fit allocator state for one (memory class, bucket) backing block.
pub(crate) struct FreeListPool {
    nodes: Vec<FreeNode>,
    /// First free span in offset order, or `NIL`.
    head: u32,
    /// Intrusive free list of recycled node slots.
    node_free_head: u32,
    stats: PoolStats,
}

impl FreeListPool {
    /// Create a pool whose free list is seeded with one node spanning the
    /// whole backing block.
    pub(crate) fn new(total_size: u64) -> Self {
        let mut pool = Self {
            nodes: Vec::with_capacity(8),
            head: NIL,
            node_free_head: NIL,
            stats: PoolStats {
                total_size,
                ..PoolStats::default()
            },
        };
        pool.head = pool.acquire_node(0, total_size, NIL);
        pool
    }

    /// First-fit allocation: scan spans in offset order and carve the first
    /// one that can hold `size` bytes at an `align`-aligned start.
    ///
    /// Returns the aligned start offset, or `None` when no span fits.
    pub(crate) fn allocate(&mut self, size: u64, align: u64) -> Option<u64> {
        debug_assert!(size > 0);

        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            let node = self.nodes[cur as usize];
            let aligned = align_up(node.offset, align);
            let pad = aligned - node.offset;

            if node.size >= pad + size {
                let remainder = node.size - pad - size;
                if pad == 0 && remainder == 0 {
                    // Exact fit: the span disappears.
                    self.link(prev, node.next);
                    self.release_node(cur);
                } else if pad == 0 {
                    // Shrink in place from the front.
                    let n = &mut self.nodes[cur as usize];
                    n.offset += size;
                    n.size = remainder;
                } else {
                    // Alignment padding: the span keeps the prefix, and the
                    // trailing remainder (if any) becomes a new span.
                    self.nodes[cur as usize].size = pad;
                    if remainder > 0 {
                        let tail = self.acquire_node(aligned + size, remainder, node.next);
                        self.nodes[cur as usize].next = tail;
                    }
                }

                self.stats.current_allocated += size;
                self.stats.total_allocations += 1;
                self.stats.live_allocations += 1;
                return Some(aligned);
            }

            prev = cur;
            cur = node.next;
        }
        None
    }

    /// Return `[offset, offset + size)` to the free list, coalescing with the
    /// previous neighbor first, then the following one.
    ///
    /// A range that falls outside the block or overlaps an existing free span
    /// does not correspond to a tracked allocation and is rejected.
    pub(crate) fn free(&mut self, offset: u64, size: u64) -> MemResult<()> {
        let end = offset.checked_add(size).ok_or(GfxMemError::InvalidFree { offset, size })?;
        if size == 0 || end > self.stats.total_size || self.stats.current_allocated < size {
            return Err(GfxMemError::invalid_free(offset, size));
        }

        // Find the insertion point: prev is the last span starting before
        // `offset`, cur the first starting at or after it.
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL && self.nodes[cur as usize].offset < offset {
            prev = cur;
            cur = self.nodes[cur as usize].next;
        }

        if prev != NIL {
            let p = self.nodes[prev as usize];
            if p.offset + p.size > offset {
                return Err(GfxMemError::invalid_free(offset, size));
            }
        }
        if cur != NIL && end > self.nodes[cur as usize].offset {
            return Err(GfxMemError::invalid_free(offset, size));
        }

        let merges_prev =
            prev != NIL && self.nodes[prev as usize].offset + self.nodes[prev as usize].size == offset;
        if merges_prev {
            self.nodes[prev as usize].size += size;
            // The grown span may now touch the following one.
            if cur != NIL {
                let p = self.nodes[prev as usize];
                let n = self.nodes[cur as usize];
                if p.offset + p.size == n.offset {
                    self.nodes[prev as usize].size += n.size;
                    self.nodes[prev as usize].next = n.next;
                    self.release_node(cur);
                }
            }
        } else if cur != NIL && end == self.nodes[cur as usize].offset {
            let n = &mut self.nodes[cur as usize];
            n.offset = offset;
            n.size += size;
        } else {
            let node = self.acquire_node(offset, size, cur);
            self.link(prev, node);
        }

        self.stats.current_allocated -= size;
        self.stats.live_allocations -= 1;
        Ok(())
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Free spans as `(offset, size)` pairs in offset order.
    pub(crate) fn free_spans(&self) -> Vec<(u64, u64)> {
        let mut spans = Vec::new();
        let mut cur = self.head;
        while cur != NIL {
            let node = self.nodes[cur as usize];
            spans.push((node.offset, node.size));
            cur = node.next;
        }
        spans
    }

    // --- node arena ---

    fn acquire_node(&mut self, offset: u64, size: u64, next: u32) -> u32 {
        if self.node_free_head != NIL {
            let index = self.node_free_head;
            self.node_free_head = self.nodes[index as usize].next;
            self.nodes[index as usize] = FreeNode { offset, size, next };
            index
        } else {
            let index = self.nodes.len() as u32;
            self.nodes.push(FreeNode { offset, size, next });
            index
        }
    }

    fn release_node(&mut self, index: u32) {
        self.nodes[index as usize].next = self.node_free_head;
        self.node_free_head = index;
    }

    /// Point `prev` (or the list head when `prev` is `NIL`) at `index`.
    fn link(&mut self, prev: u32, index: u32) {
        if prev == NIL {
            self.head = index;
        } else {
            self.nodes[prev as usize].next = index;
        }
    }
}
