use crate::{AllocError, BLOCK_SIZE, BlockAllocator, HEAP_BASE_ALIGN, HeapStats, HeapUsage};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{NonNull, null_mut};
use kernel_sync::IrqCell;

/// The kernel heap: a [`BlockAllocator`] whose every operation runs with
/// interrupts suppressed.
///
/// ```ignore
/// #[global_allocator]
/// static HEAP: KernelHeap = KernelHeap::new();
/// ```
pub struct KernelHeap {
    inner: IrqCell<BlockAllocator>,
}

impl Default for KernelHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelHeap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: IrqCell::new(BlockAllocator::new()),
        }
    }

    /// See [`BlockAllocator::init`].
    ///
    /// # Safety
    /// See [`BlockAllocator::init`].
    pub unsafe fn init(&self, region: NonNull<u8>, size: usize) -> Result<HeapStats, AllocError> {
        unsafe { self.inner.lock().init(region, size) }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_initialized()
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        self.inner.lock().contains(ptr)
    }

    pub fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        self.inner.lock().allocate(bytes)
    }

    pub fn allocate_zeroed(&self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        self.inner.lock().allocate_zeroed(bytes)
    }

    pub fn allocate_huge(&self) -> Result<NonNull<u8>, AllocError> {
        self.inner.lock().allocate_huge()
    }

    /// # Safety
    /// See [`BlockAllocator::release`].
    pub unsafe fn release(&self, ptr: *const u8) {
        unsafe { self.inner.lock().release(ptr) }
    }

    /// # Safety
    /// See [`BlockAllocator::resize`].
    pub unsafe fn resize(&self, ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
        unsafe { self.inner.lock().resize(ptr, new_size) }
    }

    /// # Safety
    /// See [`BlockAllocator::resize_zeroed`].
    pub unsafe fn resize_zeroed(
        &self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        unsafe { self.inner.lock().resize_zeroed(ptr, new_size) }
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.lock().stats()
    }

    pub fn usage(&self) -> HeapUsage {
        self.inner.lock().usage()
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_BASE_ALIGN {
            return null_mut();
        }
        self.inner
            .lock()
            .allocate_aligned(layout.size(), layout.align())
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_SIZE {
            let ptr = unsafe { self.alloc(layout) };
            if !ptr.is_null() {
                unsafe { core::ptr::write_bytes(ptr, 0, layout.size()) };
            }
            return ptr;
        }
        self.allocate_zeroed(layout.size())
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(ptr) = NonNull::new(ptr) else {
            return null_mut();
        };
        if layout.align() > BLOCK_SIZE {
            // The moved run would only be block aligned.
            let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
                return null_mut();
            };
            let fresh = unsafe { self.alloc(new_layout) };
            if !fresh.is_null() {
                unsafe {
                    core::ptr::copy_nonoverlapping(ptr.as_ptr(), fresh, layout.size().min(new_size));
                    self.release(ptr.as_ptr());
                }
            }
            return fresh;
        }
        unsafe { self.resize(ptr, new_size) }.map_or(null_mut(), NonNull::as_ptr)
    }
}
