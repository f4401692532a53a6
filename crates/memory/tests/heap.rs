//! Integration tests for the block heap

mod common;

use std::rc::Rc;

use keel_memory::heap::{
    BLOCK_HEADER_SIZE, Element, Heap, HeapConfig, HeapFlags, MIN_RESIDENT_BLOCKS,
    SLOT_HEADER_SIZE,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

use common::{RecordingAllocator, event_log, init_tracing, test_config};

fn heap(elem_size: usize, hint: usize) -> Heap {
    Heap::with_config(elem_size, hint, HeapFlags::NONE, None, test_config())
        .expect("Failed to create heap")
}

fn addr(element: &Element) -> usize {
    element.as_ptr().as_ptr() as usize
}

#[rstest]
#[case(32, 64, 4096, 102)]
#[case(16, 200, 4096, 340)]
#[case(1000, 1, 4096, 4)]
#[case(8, 1, 65536, 4095)]
#[case(0, 10, 4096, 510)]
fn test_page_fitting(
    #[case] elem_size: usize,
    #[case] hint: usize,
    #[case] page_size: usize,
    #[case] expected: usize,
) {
    let config = test_config().with_page_size(page_size);
    let heap = Heap::with_config(elem_size, hint, HeapFlags::NONE, None, config).unwrap();

    assert_eq!(heap.alloc_size(), elem_size + SLOT_HEADER_SIZE);
    assert_eq!(heap.elems_per_block(), expected);

    let pages = (BLOCK_HEADER_SIZE + hint * heap.alloc_size()).div_ceil(page_size);
    assert!(BLOCK_HEADER_SIZE + expected * heap.alloc_size() <= pages * page_size);
    assert!(BLOCK_HEADER_SIZE + (expected + 1) * heap.alloc_size() > pages * page_size);
}

#[test]
fn test_round_trip_restores_counts() {
    init_tracing();
    let mut heap = heap(48, 16);
    let anchor = heap.alloc();
    let block = anchor.block();

    let free_before = heap.free_elems();
    let allocated_before = heap.allocated_in(block);

    let element = heap.alloc();
    assert_eq!(element.block(), block);
    assert_eq!(heap.free_elems(), free_before - 1);

    assert!(heap.free(element));
    assert_eq!(heap.free_elems(), free_before);
    assert_eq!(heap.allocated_in(block), allocated_before);
}

#[test]
fn test_fresh_block_serves_descending_addresses() {
    let mut heap = heap(24, 8);
    let n = heap.elems_per_block();

    let elements: Vec<Element> = (0..n).map(|_| heap.alloc()).collect();
    assert_eq!(heap.block_count(), 1);

    let addresses: Vec<usize> = elements.iter().map(addr).collect();
    let mut descending = addresses.clone();
    descending.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(addresses, descending);

    // consecutive slots are exactly one alloc_size apart
    for pair in addresses.windows(2) {
        assert_eq!(pair[0] - pair[1], heap.alloc_size());
    }

    let slots: Vec<u32> = elements.iter().map(Element::slot).collect();
    let expected: Vec<u32> = (0..n as u32).rev().collect();
    assert_eq!(slots, expected);
}

#[test]
fn test_most_recently_freed_is_reused_first() {
    let mut heap = heap(32, 8);
    let _keep = heap.alloc();
    let x = heap.alloc();
    let y = heap.alloc();

    // free X then Y: Y is on top of the free list
    assert!(heap.free(x));
    assert!(heap.free(y));
    assert_eq!(addr(&heap.alloc()), addr(&y));
    assert_eq!(addr(&heap.alloc()), addr(&x));
}

#[test]
fn test_freeing_in_reverse_reissues_in_allocation_order() {
    let mut heap = heap(32, 8);
    let _keep = heap.alloc();
    let x = heap.alloc();
    let y = heap.alloc();

    // free Y then X: X comes back first, then Y
    assert!(heap.free(y));
    assert!(heap.free(x));
    assert_eq!(addr(&heap.alloc()), addr(&x));
    assert_eq!(addr(&heap.alloc()), addr(&y));
}

#[test]
fn test_new_blocks_go_to_the_front() {
    let mut heap = heap(1000, 1);
    let per_block = heap.elems_per_block();

    let elements: Vec<Element> = (0..per_block * 3).map(|_| heap.alloc()).collect();
    assert_eq!(heap.block_count(), 3);

    let ids: Vec<u32> = heap.block_ids().map(|id| id.as_u32()).collect();
    assert_eq!(ids, vec![2, 1, 0]);

    // a slot freed in the oldest block is found after scanning newer ones
    let oldest = elements[0];
    assert!(heap.free(oldest));
    assert_eq!(heap.alloc().block(), oldest.block());
}

#[test]
fn test_emptied_blocks_shrink_down_to_two() {
    let log = event_log();
    let backend = Rc::new(RecordingAllocator::new(&log));
    let mut heap = Heap::with_config(
        1000,
        1,
        HeapFlags::NONE,
        Some(backend.clone()),
        test_config(),
    )
    .unwrap();
    let per_block = heap.elems_per_block();

    let elements: Vec<Element> = (0..per_block * 4).map(|_| heap.alloc()).collect();
    assert_eq!(heap.block_count(), 4);
    assert_eq!(backend.live(), 4);

    let mut peak = heap.block_count();
    for element in elements {
        assert!(heap.free(element));
        peak = peak.max(heap.block_count());
        assert!(heap.block_count() >= MIN_RESIDENT_BLOCKS);
    }

    assert_eq!(peak, 4);
    assert_eq!(heap.block_count(), MIN_RESIDENT_BLOCKS);
    assert_eq!(heap.free_elems(), MIN_RESIDENT_BLOCKS * per_block);
    assert_eq!(backend.live(), MIN_RESIDENT_BLOCKS);
    assert_eq!(heap.stats().unwrap().shrinks, 2);

    heap.destroy();
    assert_eq!(backend.live(), 0);
}

#[test]
fn test_single_block_is_never_released() {
    let log = event_log();
    let backend = Rc::new(RecordingAllocator::new(&log));
    let mut heap =
        Heap::with_config(64, 4, HeapFlags::NONE, Some(backend.clone()), test_config()).unwrap();

    for _ in 0..3 {
        let element = heap.alloc();
        assert!(heap.free(element));
    }

    assert_eq!(heap.block_count(), 1);
    assert_eq!(backend.deallocations(), 0);
}

#[test]
fn test_released_block_rejects_stale_elements() {
    let mut heap = heap(1000, 1);
    let per_block = heap.elems_per_block();
    let elements: Vec<Element> = (0..per_block * 3).map(|_| heap.alloc()).collect();

    // the newest block is emptied and released
    let newest: Vec<Element> = elements[per_block * 2..].to_vec();
    for element in &newest {
        assert!(heap.free(*element));
    }
    assert_eq!(heap.block_count(), 2);

    assert!(!heap.free(newest[0]));
    assert!(heap.payload(&newest[0]).is_none());
}

#[test]
fn test_stale_handle_cannot_free_the_next_owner() {
    let mut heap = heap(32, 8);
    let _keep = heap.alloc();
    let x = heap.alloc();
    assert!(heap.free(x));

    // LIFO hands the same slot straight back
    let z = heap.alloc();
    assert_eq!(addr(&z), addr(&x));
    assert_eq!(z.generation(), x.generation() + 1);

    let allocated = heap.allocated_elems();
    assert!(!heap.free(x));
    assert_eq!(heap.allocated_elems(), allocated);
    assert!(heap.contains(&z));
    assert!(!heap.contains(&x));

    assert!(heap.free(z));
    assert_eq!(heap.stats().unwrap().guard_violations, 1);
}

/// fmt writer that keeps everything in memory
#[cfg(all(feature = "logging", debug_assertions))]
#[derive(Clone, Default)]
struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(all(feature = "logging", debug_assertions))]
impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(all(feature = "logging", debug_assertions))]
#[test]
fn test_alloc_and_free_events_carry_the_payload_address() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::util::SubscriberInitExt;

    let captured = Captured::default();
    let writer = captured.clone();
    let _guard = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_writer(move || writer.clone())
        .finish()
        .set_default();

    let mut heap = heap(16, 4);
    let element = heap.alloc();
    let ptr = format!("ptr={:?}", element.as_ptr());
    assert!(heap.free(element));

    let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    let tagged: Vec<&str> = output.lines().filter(|line| line.contains(&ptr)).collect();
    assert_eq!(tagged.len(), 2, "{output}");
    assert!(tagged[0].contains("alloc"));
    assert!(tagged[1].contains("free"));
}

#[test]
fn test_destroy_releases_every_block() {
    let log = event_log();
    let backend = Rc::new(RecordingAllocator::new(&log));
    let mut heap =
        Heap::with_config(200, 4, HeapFlags::NONE, Some(backend.clone()), test_config()).unwrap();
    let per_block = heap.elems_per_block();

    for _ in 0..per_block * 3 {
        let _ = heap.alloc();
    }
    assert_eq!(backend.live(), 3);

    heap.destroy();
    assert_eq!(backend.live(), 0);
    assert_eq!(backend.deallocations(), 3);
}

#[test]
fn test_drop_releases_every_block() {
    let log = event_log();
    let backend = Rc::new(RecordingAllocator::new(&log));
    {
        let mut heap = Heap::with_config(
            16,
            4,
            HeapFlags::ALLOCATE_NOW,
            Some(backend.clone()),
            test_config(),
        )
        .unwrap();
        let _ = heap.alloc();
        assert_eq!(backend.live(), 1);
    }
    assert_eq!(backend.live(), 0);
}

#[test]
fn test_gauges_follow_activity() {
    let mut heap = heap(64, 4);
    let per_block = heap.elems_per_block();

    let elements: Vec<Element> = (0..per_block + 1).map(|_| heap.alloc()).collect();
    assert_eq!(heap.block_count(), 2);
    assert_eq!(heap.capacity(), per_block * 2);
    assert_eq!(heap.allocated_elems(), per_block + 1);
    assert_eq!(heap.free_elems(), per_block - 1);

    for element in elements {
        heap.free(element);
    }
    assert_eq!(heap.allocated_elems(), 0);
    assert_eq!(heap.stats().unwrap().peak_allocated, per_block + 1);
}

#[test]
fn test_default_heap_prefers_mmap() {
    let heap = Heap::new(32, 32, HeapFlags::NONE).unwrap();
    assert_eq!(heap.uses_mmap(), cfg!(any(unix, windows)));

    let heap = Heap::with_config(
        32,
        32,
        HeapFlags::NONE,
        None,
        HeapConfig::performance(),
    )
    .unwrap();
    assert!(!heap.uses_mmap());
}

#[derive(Debug, Clone)]
enum Op {
    Alloc,
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_accounting_matches_live_elements(ops in prop::collection::vec(op(), 1..400)) {
        let mut heap = heap(200, 1);
        let mut live: Vec<Element> = Vec::new();
        let mut most_blocks = 0;

        for op in ops {
            match op {
                Op::Alloc => live.push(heap.alloc()),
                Op::Free(pick) if !live.is_empty() => {
                    let element = live.swap_remove(pick % live.len());
                    prop_assert!(heap.free(element));
                }
                Op::Free(_) => {}
            }

            most_blocks = most_blocks.max(heap.block_count());

            prop_assert_eq!(heap.allocated_elems(), live.len());
            prop_assert_eq!(heap.free_elems() + live.len(), heap.capacity());

            let per_block: usize = heap
                .block_ids()
                .map(|id| heap.allocated_in(id).unwrap())
                .sum();
            prop_assert_eq!(per_block, live.len());

            prop_assert!(heap.block_count() >= most_blocks.min(MIN_RESIDENT_BLOCKS));
            prop_assert!(live.iter().all(|element| heap.contains(element)));
        }

        let mut addresses: Vec<usize> = live.iter().map(addr).collect();
        addresses.sort_unstable();
        addresses.dedup();
        prop_assert_eq!(addresses.len(), live.len());
    }
}
