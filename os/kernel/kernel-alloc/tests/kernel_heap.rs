use kernel_alloc::{BLOCK_SIZE, KernelHeap};
use kernel_sync::irq;
use std::alloc::{GlobalAlloc, Layout};
use std::ptr::NonNull;

const REGION_SIZE: usize = 8 * 1024 * 1024;

fn heap() -> KernelHeap {
    let region: &'static mut [u8] = Box::leak(vec![0u8; REGION_SIZE].into_boxed_slice());
    let heap = KernelHeap::new();
    unsafe {
        heap.init(NonNull::new(region.as_mut_ptr()).unwrap(), REGION_SIZE)
            .unwrap();
    }
    heap
}

#[test]
fn operations_leave_interrupts_as_they_were() {
    let heap = heap();
    let p = heap.allocate(10).unwrap();
    assert!(irq::are_enabled());
    assert_eq!(irq::depth(), 0);

    let _outer = irq::suppress();
    unsafe { heap.release(p.as_ptr()) };
    assert!(!irq::are_enabled(), "nested release must not unmask");
}

#[test]
fn global_alloc_round_trip() {
    let heap = heap();
    let layout = Layout::from_size_align(300, 8).unwrap();
    unsafe {
        let p = heap.alloc(layout);
        assert!(!p.is_null());
        core::ptr::write_bytes(p, 0x11, 300);
        heap.dealloc(p, layout);
    }
    assert_eq!(heap.stats().allocations, 0);
}

#[test]
fn global_alloc_honours_large_alignment() {
    let heap = heap();
    let _skew = heap.allocate(1).unwrap();
    let layout = Layout::from_size_align(64, 4096).unwrap();
    let p = unsafe { heap.alloc(layout) };
    assert_eq!(p as usize % 4096, 0);
    assert!(heap.contains(p));
}

#[test]
fn global_realloc_keeps_contents() {
    let heap = heap();
    let layout = Layout::from_size_align(100, 16).unwrap();
    unsafe {
        let p = heap.alloc_zeroed(layout);
        for i in 0..100 {
            *p.add(i) = i as u8;
        }
        let _blocker = heap.allocate(1).unwrap();
        let q = heap.realloc(p, layout, 10 * BLOCK_SIZE);
        assert_ne!(q, p);
        for i in 0..100 {
            assert_eq!(*q.add(i), i as u8);
        }
    }
}

#[test]
fn uninitialized_heap_returns_null() {
    let heap = KernelHeap::new();
    let p = unsafe { heap.alloc(Layout::new::<u64>()) };
    assert!(p.is_null());
    assert!(!heap.is_initialized());
}

#[test]
fn vec_growth_through_the_heap() {
    let heap = heap();
    let mut v: Vec<u32> = Vec::new();
    // Drive the allocator through the same calls `alloc::vec` would make.
    let mut cap = 4;
    let mut layout = Layout::array::<u32>(cap).unwrap();
    let mut ptr = unsafe { heap.alloc(layout) }.cast::<u32>();
    for i in 0..1000u32 {
        if v.len() == cap {
            let new_layout = Layout::array::<u32>(cap * 2).unwrap();
            ptr = unsafe { heap.realloc(ptr.cast(), layout, new_layout.size()) }.cast();
            assert!(!ptr.is_null());
            cap *= 2;
            layout = new_layout;
        }
        unsafe { ptr.add(v.len()).write(i) };
        v.push(i);
    }
    let stored = unsafe { core::slice::from_raw_parts(ptr, v.len()) };
    assert_eq!(stored, &v[..]);
}
