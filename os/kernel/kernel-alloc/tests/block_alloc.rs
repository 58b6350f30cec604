use kernel_alloc::{AllocError, BLOCK_SIZE, BlockAllocator, BlockState, HUGE_ALLOC_SIZE};
use std::ptr::NonNull;

const REGION_SIZE: usize = 12 * 1024 * 1024;

fn allocator() -> BlockAllocator {
    let region: &'static mut [u8] = Box::leak(vec![0u8; REGION_SIZE].into_boxed_slice());
    let mut alloc = BlockAllocator::new();
    unsafe {
        alloc
            .init(NonNull::new(region.as_mut_ptr()).unwrap(), REGION_SIZE)
            .unwrap();
    }
    alloc
}

fn range_of(alloc: &BlockAllocator, ptr: NonNull<u8>) -> (usize, usize) {
    let start = ptr.as_ptr() as usize;
    (start, start + alloc.allocation_size(ptr.as_ptr()).unwrap())
}

#[test]
fn init_places_heap_on_huge_boundary() {
    let alloc = allocator();
    let heap = alloc.heap_range();
    assert_eq!(heap.start % HUGE_ALLOC_SIZE, 0);
    assert!(heap.len() >= 4 * HUGE_ALLOC_SIZE);
    assert_eq!(alloc.stats().free_blocks, heap.len() / BLOCK_SIZE);
}

#[test]
fn init_rejects_tiny_region() {
    let mut buf = vec![0u8; 4096];
    let mut alloc = BlockAllocator::new();
    let err = unsafe { alloc.init(NonNull::new(buf.as_mut_ptr()).unwrap(), buf.len()) };
    assert!(matches!(err, Err(AllocError::RegionTooSmall { .. })));
    assert!(!alloc.is_initialized());
}

#[test]
fn second_init_is_rejected() {
    let mut alloc = allocator();
    let mut buf = vec![0u8; REGION_SIZE];
    let err = unsafe { alloc.init(NonNull::new(buf.as_mut_ptr()).unwrap(), buf.len()) };
    assert_eq!(err, Err(AllocError::AlreadyInitialized));
}

#[test]
fn uninitialized_and_zero_sized_requests_fail() {
    let mut fresh = BlockAllocator::new();
    assert_eq!(fresh.allocate(16), Err(AllocError::Uninitialized));
    assert_eq!(fresh.allocate_huge(), Err(AllocError::Uninitialized));

    let mut alloc = allocator();
    assert_eq!(alloc.allocate(0), Err(AllocError::ZeroSize));
    assert_eq!(
        alloc.allocate_aligned(16, 48),
        Err(AllocError::BadAlignment { align: 48 })
    );
}

#[test]
fn two_small_allocations_do_not_overlap() {
    let mut alloc = allocator();
    let first = alloc.allocate(200).unwrap();
    let second = alloc.allocate(50).unwrap();

    assert_eq!(alloc.allocation_size(first.as_ptr()), Some(2 * BLOCK_SIZE));
    assert_eq!(alloc.allocation_size(second.as_ptr()), Some(BLOCK_SIZE));
    let (a0, a1) = range_of(&alloc, first);
    let (b0, b1) = range_of(&alloc, second);
    assert!(a1 <= b0 || b1 <= a0);

    unsafe {
        core::ptr::write_bytes(second.as_ptr(), 0x5a, 50);
        core::ptr::write_bytes(first.as_ptr(), 0xff, 200);
        alloc.release(first.as_ptr());
    }
    let data = unsafe { core::slice::from_raw_parts(second.as_ptr(), 50) };
    assert!(data.iter().all(|b| *b == 0x5a));
    assert_eq!(alloc.block_state(second.as_ptr()), Some(BlockState::End));
    assert_eq!(alloc.block_state(first.as_ptr()), Some(BlockState::Free));
}

#[test]
fn release_restores_map_exactly() {
    let mut alloc = allocator();
    let _pinned = alloc.allocate(3 * BLOCK_SIZE).unwrap();
    let heap_len = alloc.heap_range().len() - 3 * BLOCK_SIZE;

    for n in [1, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE + 1, 4096, 100_000, heap_len] {
        let before = alloc.block_map().to_vec();
        let ptr = alloc.allocate(n).unwrap();
        assert_ne!(alloc.block_map(), &before[..]);
        unsafe { alloc.release(ptr.as_ptr()) };
        assert_eq!(alloc.block_map(), &before[..], "n = {n}");
    }
}

#[test]
fn exhaustion_is_reported_not_fatal() {
    let mut alloc = allocator();
    let heap_len = alloc.heap_range().len();
    assert_eq!(
        alloc.allocate(heap_len + 1),
        Err(AllocError::OutOfMemory {
            blocks: heap_len / BLOCK_SIZE + 1
        })
    );

    let all = alloc.allocate(heap_len).unwrap();
    assert!(matches!(alloc.allocate(1), Err(AllocError::OutOfMemory { .. })));
    unsafe { alloc.release(all.as_ptr()) };
    assert!(alloc.allocate(1).is_ok());
}

#[test]
fn first_fit_reuses_the_earliest_hole() {
    let mut alloc = allocator();
    let a = alloc.allocate(2 * BLOCK_SIZE).unwrap();
    let _b = alloc.allocate(BLOCK_SIZE).unwrap();
    let _c = alloc.allocate(BLOCK_SIZE).unwrap();
    unsafe { alloc.release(a.as_ptr()) };

    let d = alloc.allocate(100).unwrap();
    assert_eq!(d, a);
    let e = alloc.allocate(100).unwrap();
    assert_eq!(e.as_ptr() as usize, a.as_ptr() as usize + BLOCK_SIZE);
    let f = alloc.allocate(100).unwrap();
    assert_eq!(f.as_ptr() as usize, a.as_ptr() as usize + 4 * BLOCK_SIZE);
}

#[test]
fn foreign_and_repeated_releases_change_nothing() {
    let mut alloc = allocator();
    let p = alloc.allocate(500).unwrap();
    let _q = alloc.allocate(500).unwrap();
    unsafe { alloc.release(p.as_ptr()) };
    let before = alloc.block_map().to_vec();

    let local = 0u8;
    unsafe {
        alloc.release(&raw const local);
        alloc.release(p.as_ptr());
    }
    assert_eq!(alloc.block_map(), &before[..]);
}

#[test]
fn live_allocations_stay_disjoint() {
    let mut alloc = allocator();
    let heap = alloc.heap_range();
    let mut live: Vec<NonNull<u8>> = Vec::new();
    let mut seed = 0x2545_f491_4f6c_dd1d_u64;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for step in 0..600 {
        let roll = next();
        if roll % 3 == 0 && !live.is_empty() {
            let victim = live.swap_remove((roll as usize / 3) % live.len());
            unsafe { alloc.release(victim.as_ptr()) };
        } else {
            let size = (next() % 6000 + 1) as usize;
            if let Ok(ptr) = alloc.allocate(size) {
                assert!(alloc.allocation_size(ptr.as_ptr()).unwrap() >= size);
                live.push(ptr);
            }
        }

        let mut ranges: Vec<_> = live.iter().map(|p| range_of(&alloc, *p)).collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlap: {pair:x?}");
        }
        for (start, end) in &ranges {
            assert!(heap.start <= *start && *end <= heap.end);
        }
        if step % 50 == 0 {
            assert_eq!(alloc.stats().allocations, live.len());
        }
    }
}

#[test]
fn shrink_happens_in_place_and_frees_the_tail() {
    let mut alloc = allocator();
    let p = alloc.allocate(8 * BLOCK_SIZE).unwrap();
    let _after = alloc.allocate(BLOCK_SIZE).unwrap();

    let q = unsafe { alloc.resize(p, 300) }.unwrap();
    assert_eq!(q, p);
    assert_eq!(alloc.allocation_size(q.as_ptr()), Some(3 * BLOCK_SIZE));

    // The released tail is immediately reusable.
    let tail = alloc.allocate(5 * BLOCK_SIZE).unwrap();
    assert_eq!(tail.as_ptr() as usize, p.as_ptr() as usize + 3 * BLOCK_SIZE);
    assert_eq!(alloc.stats().allocations, 3);
}

#[test]
fn growth_moves_and_preserves_prefix() {
    let mut alloc = allocator();
    let p = alloc.allocate(300).unwrap();
    let _blocker = alloc.allocate(1).unwrap();
    let data: Vec<u8> = (0..300u32).map(|i| (i * 7 % 251) as u8).collect();
    unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), p.as_ptr(), data.len()) };

    let q = unsafe { alloc.resize(p, 5000) }.unwrap();
    assert_ne!(q, p);
    let moved = unsafe { core::slice::from_raw_parts(q.as_ptr(), data.len()) };
    assert_eq!(moved, &data[..]);
    assert_eq!(alloc.block_state(p.as_ptr()), Some(BlockState::Free));
    assert_eq!(alloc.allocation_size(q.as_ptr()), Some(40 * BLOCK_SIZE));
}

#[test]
fn zeroing_resize_clears_bytes_past_the_old_run() {
    let mut alloc = allocator();

    let dirty = alloc.allocate(8192).unwrap();
    unsafe {
        core::ptr::write_bytes(dirty.as_ptr(), 0xaa, 8192);
        alloc.release(dirty.as_ptr());
    }

    let p = alloc.allocate_zeroed(200).unwrap();
    unsafe { core::ptr::write_bytes(p.as_ptr(), 1, 200) };
    let _blocker = alloc.allocate(1).unwrap();

    let q = unsafe { alloc.resize_zeroed(p, 1000) }.unwrap();
    let bytes = unsafe { core::slice::from_raw_parts(q.as_ptr(), 1000) };
    assert!(bytes[..200].iter().all(|b| *b == 1));
    assert!(bytes[200..].iter().all(|b| *b == 0));
}

#[test]
fn failed_growth_keeps_the_original() {
    let mut alloc = allocator();
    let heap_len = alloc.heap_range().len();
    let p = alloc.allocate(BLOCK_SIZE).unwrap();

    let err = unsafe { alloc.resize(p, heap_len) };
    assert!(matches!(err, Err(AllocError::OutOfMemory { .. })));
    assert_eq!(alloc.allocation_size(p.as_ptr()), Some(BLOCK_SIZE));

    let bogus = unsafe { alloc.resize(NonNull::from(&0u8), 10) };
    assert!(matches!(bogus, Err(AllocError::NotAllocated { .. })));
}

#[test]
fn allocate_zeroed_clears_recycled_memory() {
    let mut alloc = allocator();
    let p = alloc.allocate(1000).unwrap();
    unsafe {
        core::ptr::write_bytes(p.as_ptr(), 0xee, 1000);
        alloc.release(p.as_ptr());
    }
    let q = alloc.allocate_zeroed(1000).unwrap();
    assert_eq!(q, p);
    let bytes = unsafe { core::slice::from_raw_parts(q.as_ptr(), 1024) };
    assert!(bytes.iter().all(|b| *b == 0));
}

#[test]
fn huge_allocations_are_aligned_and_disjoint() {
    let mut alloc = allocator();
    let base = alloc.heap_range().start;
    let small = alloc.allocate(100).unwrap();

    let mut pages = Vec::new();
    while let Ok(page) = alloc.allocate_huge() {
        let offset = page.as_ptr() as usize - base;
        assert_eq!(offset % HUGE_ALLOC_SIZE, 0);
        assert_eq!(alloc.allocation_size(page.as_ptr()), Some(HUGE_ALLOC_SIZE));
        pages.push(page);
    }

    // The small allocation blocks the first slot.
    assert_eq!(pages[0].as_ptr() as usize, base + HUGE_ALLOC_SIZE);
    assert!(pages.len() >= 3);
    let small_end = small.as_ptr() as usize + BLOCK_SIZE;
    assert!(pages.iter().all(|p| p.as_ptr() as usize >= small_end));

    unsafe { alloc.release(pages[1].as_ptr()) };
    assert_eq!(alloc.allocate_huge(), Ok(pages[1]));
}

#[test]
fn small_allocations_fill_gaps_before_huge_pages() {
    let mut alloc = allocator();
    let base = alloc.heap_range().start;
    let page = alloc.allocate_huge().unwrap();
    assert_eq!(page.as_ptr() as usize, base);

    let small = alloc.allocate(64).unwrap();
    assert_eq!(small.as_ptr() as usize, base + HUGE_ALLOC_SIZE);
    let second = alloc.allocate_huge().unwrap();
    assert_eq!(second.as_ptr() as usize, base + 2 * HUGE_ALLOC_SIZE);
}

#[test]
fn stats_track_usage() {
    let mut alloc = allocator();
    let total = alloc.stats().total_blocks;
    let _a = alloc.allocate(BLOCK_SIZE * 10).unwrap();
    let b = alloc.allocate(1).unwrap();
    let _c = alloc.allocate(BLOCK_SIZE * 2).unwrap();
    unsafe { alloc.release(b.as_ptr()) };

    let stats = alloc.stats();
    assert_eq!(stats.used_blocks(), 12);
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.largest_free_run, total - 13);
}

#[test]
fn usage_counters_agree_with_a_map_walk() {
    let mut alloc = allocator();
    let check = |alloc: &BlockAllocator| {
        let usage = alloc.usage();
        let stats = alloc.stats();
        assert_eq!(usage.total_blocks, stats.total_blocks);
        assert_eq!(usage.used_blocks, stats.used_blocks());
        assert_eq!(usage.allocations, stats.allocations);
    };
    check(&alloc);

    let a = alloc.allocate(BLOCK_SIZE * 8).unwrap();
    let b = alloc.allocate(BLOCK_SIZE * 3).unwrap();
    let huge = alloc.allocate_huge().unwrap();
    check(&alloc);

    let a = unsafe { alloc.resize(a, BLOCK_SIZE * 2) }.unwrap();
    check(&alloc);
    let b = unsafe { alloc.resize(b, BLOCK_SIZE * 20) }.unwrap();
    check(&alloc);

    unsafe {
        alloc.release(huge.as_ptr());
        alloc.release(huge.as_ptr());
    }
    check(&alloc);
    unsafe {
        alloc.release(a.as_ptr());
        alloc.release(b.as_ptr());
    }
    check(&alloc);
    assert_eq!(alloc.usage().used_blocks, 0);
    assert_eq!(alloc.usage().allocations, 0);
}
