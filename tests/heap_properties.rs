//! Device-heap allocator properties: overlap freedom, coalescing, large-path
//! isolation.

use std::sync::Arc;

use gfxmem::prelude::*;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn single_bucket_heap(
    bucket: u64,
) -> (Arc<SoftwareDevice>, DeviceHeapAllocator<SoftwareDevice>) {
    let device = Arc::new(SoftwareDevice::with_default_classes());
    let config = HeapConfig {
        bucket_sizes: vec![bucket],
        small_alloc_threshold: 256,
        split_small_into_separate_bucket: false,
    };
    let heap = DeviceHeapAllocator::new(device.clone(), config).unwrap();
    (device, heap)
}

#[test]
fn full_bucket_round_trip_restores_single_span() {
    let (_device, mut heap) = single_bucket_heap(4096);

    let all = heap.allocate(0, 4096, 1).unwrap();
    assert_eq!(all.offset(), 0);
    assert!(heap.bucket_free_spans(0, 0).unwrap().is_empty());

    heap.free(all).unwrap();
    assert_eq!(heap.bucket_free_spans(0, 0).unwrap(), vec![(0, 4096)]);

    let stats = heap.bucket_stats(0, 0).unwrap();
    assert_eq!(stats.current_allocated, 0);
    assert_eq!(stats.live_allocations, 0);
    assert_eq!(stats.total_allocations, 1);

    heap.destroy().unwrap();
}

#[test]
fn coalescing_is_free_order_independent() {
    const ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in ORDERS {
        let (_device, mut heap) = single_bucket_heap(1024);

        // Three adjacent 256-byte blocks at offsets 0, 256, 512.
        let mut blocks: Vec<Option<DeviceHeapAllocation>> = (0..3)
            .map(|i| {
                let allocation = heap.allocate(0, 256, 1).unwrap();
                assert_eq!(allocation.offset(), i * 256);
                Some(allocation)
            })
            .collect();

        for &index in &order {
            heap.free(blocks[index].take().unwrap()).unwrap();
        }

        assert_eq!(
            heap.bucket_free_spans(0, 0).unwrap(),
            vec![(0, 1024)],
            "free order {order:?} left a fragmented list"
        );
        heap.destroy().unwrap();
    }
}

#[test]
fn large_path_never_touches_bucket_state() {
    let device = Arc::new(SoftwareDevice::with_default_classes());
    let config = HeapConfig {
        bucket_sizes: vec![1024, 4096],
        small_alloc_threshold: 256,
        split_small_into_separate_bucket: false,
    };
    let mut heap = DeviceHeapAllocator::new(device.clone(), config).unwrap();

    // Seed one bucket so we can observe it staying untouched.
    let small = heap.allocate(0, 512, 1).unwrap();
    let spans_before = heap.bucket_free_spans(0, 0).unwrap();

    let large = heap.allocate(0, 100_000, 256).unwrap();
    assert!(large.is_large());
    assert_eq!(heap.bucket_free_spans(0, 0).unwrap(), spans_before);
    assert!(heap.bucket_free_spans(0, 1).is_none());

    heap.free(large).unwrap();
    assert_eq!(heap.bucket_free_spans(0, 0).unwrap(), spans_before);
    assert!(heap.bucket_free_spans(0, 1).is_none());

    heap.free(small).unwrap();
    heap.destroy().unwrap();
}

/// The 1024-byte bucket, 256-byte alignment walkthrough.
///
/// `allocate(300)` lands at 0 and shrinks the full span to `[300, 1024)`.
/// The second `allocate(300)` aligns its start up to 512 inside that span,
/// leaving the padding prefix `[300, 512)` free and inserting the trailing
/// remainder `[812, 1024)`. Freeing the first block merges with the prefix
/// into `[0, 512)`, and `allocate(500)` then fits there first-fit at offset
/// 0, leaving a 12-byte shrink remainder.
#[test]
fn concrete_scenario_1024_align_256() {
    let (_device, mut heap) = single_bucket_heap(1024);

    let first = heap.allocate(0, 300, 256).unwrap();
    assert_eq!(first.offset(), 0);
    assert_eq!(heap.bucket_free_spans(0, 0).unwrap(), vec![(300, 724)]);

    let second = heap.allocate(0, 300, 256).unwrap();
    assert_eq!(second.offset(), 512);
    assert_eq!(
        heap.bucket_free_spans(0, 0).unwrap(),
        vec![(300, 212), (812, 212)]
    );

    heap.free(first).unwrap();
    assert_eq!(
        heap.bucket_free_spans(0, 0).unwrap(),
        vec![(0, 512), (812, 212)]
    );

    // No PoolExhausted: the coalesced head span takes the request.
    let third = heap.allocate(0, 500, 256).unwrap();
    assert_eq!(third.offset(), 0);
    assert_eq!(
        heap.bucket_free_spans(0, 0).unwrap(),
        vec![(500, 12), (812, 212)]
    );

    let stats = heap.bucket_stats(0, 0).unwrap();
    assert_eq!(stats.current_allocated, 300 + 500);

    heap.free(second).unwrap();
    heap.free(third).unwrap();
    assert_eq!(heap.bucket_free_spans(0, 0).unwrap(), vec![(0, 1024)]);
    heap.destroy().unwrap();
}

proptest! {
    /// Any allocation sequence the bucket can satisfy yields pairwise
    /// disjoint `[offset, offset + size)` ranges.
    #[test]
    fn allocations_never_overlap(
        requests in prop::collection::vec((1u64..=128, 0u32..=6), 1..32)
    ) {
        let (_device, mut heap) = single_bucket_heap(4096);
        let mut live: Vec<DeviceHeapAllocation> = Vec::new();

        for (size, align_pow) in requests {
            let align = 1u64 << align_pow;
            match heap.allocate(0, size, align) {
                Ok(allocation) => {
                    prop_assert_eq!(allocation.offset() % align, 0);
                    prop_assert!(allocation.offset() + allocation.size() <= 4096);
                    live.push(allocation);
                }
                Err(GfxMemError::PoolExhausted { .. }) => break,
                Err(other) => return Err(TestCaseError::fail(other.to_string())),
            }
        }

        for (i, a) in live.iter().enumerate() {
            for b in live.iter().skip(i + 1) {
                let disjoint = a.offset() + a.size() <= b.offset()
                    || b.offset() + b.size() <= a.offset();
                prop_assert!(
                    disjoint,
                    "[{}, {}) overlaps [{}, {})",
                    a.offset(),
                    a.offset() + a.size(),
                    b.offset(),
                    b.offset() + b.size()
                );
            }
        }

        for allocation in live.drain(..) {
            heap.free(allocation).unwrap();
        }
        prop_assert_eq!(heap.bucket_free_spans(0, 0).unwrap(), vec![(0, 4096)]);
        heap.destroy().unwrap();
    }
}
