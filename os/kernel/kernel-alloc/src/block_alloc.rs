use crate::block_map::{BlockMap, words_needed};
use crate::{BLOCK_SIZE, BlockState, HUGE_ALLOC_SIZE, blocks_for};
use core::ops::Range;
use core::ptr::NonNull;
use log::warn;

/// Alignment of the heap base inside the managed region.
///
/// Equal to the huge allocation size, so "aligned relative to the heap base"
/// and "aligned in memory" are the same thing.
pub const HEAP_BASE_ALIGN: usize = HUGE_ALLOC_SIZE;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("zero-sized allocation")]
    ZeroSize,
    #[error("allocator used before initialization")]
    Uninitialized,
    #[error("allocator is already initialized")]
    AlreadyInitialized,
    #[error("no free run of {blocks} blocks")]
    OutOfMemory { blocks: usize },
    #[error("region of {size} bytes leaves no room for heap blocks")]
    RegionTooSmall { size: usize },
    #[error("alignment {align} is not a power of two")]
    BadAlignment { align: usize },
    #[error("{addr:#x} is not inside a live allocation")]
    NotAllocated { addr: usize },
}

/// Snapshot of the block map.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub allocations: usize,
    pub largest_free_run: usize,
}

impl HeapStats {
    #[must_use]
    pub const fn used_blocks(&self) -> usize {
        self.total_blocks - self.free_blocks
    }

    #[must_use]
    pub const fn free_bytes(&self) -> usize {
        self.free_blocks * BLOCK_SIZE
    }
}

/// Counters kept current by every allocation and release.
///
/// Unlike [`HeapStats`] they cost nothing to read.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeapUsage {
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub allocations: usize,
}

/// First-fit allocator over a two-bit block map.
///
/// Not synchronized by itself; see [`KernelHeap`](crate::KernelHeap).
pub struct BlockAllocator {
    map: BlockMap,
    region: NonNull<u8>,
    heap: Range<usize>,
    used_blocks: usize,
    allocations: usize,
}

// SAFETY: the allocator exclusively owns the region handed to `init`.
unsafe impl Send for BlockAllocator {}

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAllocator {
    /// An allocator that rejects every request until [`init`](Self::init).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            map: BlockMap::empty(),
            region: NonNull::dangling(),
            heap: 0..0,
            used_blocks: 0,
            allocations: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.map.len() > 0
    }

    /// Takes ownership of `size` bytes at `region`.
    ///
    /// The front of the region holds the block map; the heap starts at the
    /// next [`HEAP_BASE_ALIGN`] boundary after it and is zeroed.
    ///
    /// # Safety
    /// The region must be valid for reads and writes, must not be used by
    /// anything else for as long as the allocator lives, and `init` may only
    /// succeed once per allocator.
    pub unsafe fn init(&mut self, region: NonNull<u8>, size: usize) -> Result<HeapStats, AllocError> {
        if self.is_initialized() {
            return Err(AllocError::AlreadyInitialized);
        }

        let start = region.as_ptr() as usize;
        let end = start
            .checked_add(size)
            .ok_or(AllocError::RegionTooSmall { size })?;

        // Size the map for the whole region; the padding makes the exact
        // block count smaller, never larger.
        let map_start = start.next_multiple_of(align_of::<u64>());
        let map_end = map_start + words_needed(size / BLOCK_SIZE) * size_of::<u64>();
        let heap_start = map_end.next_multiple_of(HEAP_BASE_ALIGN);
        if heap_start >= end {
            return Err(AllocError::RegionTooSmall { size });
        }

        let blocks = (end - heap_start) / BLOCK_SIZE;
        if blocks == 0 {
            return Err(AllocError::RegionTooSmall { size });
        }
        let heap_end = heap_start + blocks * BLOCK_SIZE;

        // SAFETY: map and heap lie inside the caller's region.
        unsafe {
            let words = region.add(map_start - start).cast::<u64>();
            self.map = BlockMap::init(words, blocks);
            core::ptr::write_bytes(region.add(heap_start - start).as_ptr(), 0, heap_end - heap_start);
        }
        self.region = region;
        self.heap = heap_start..heap_end;
        Ok(self.stats())
    }

    /// Address range of the heap blocks.
    #[inline]
    #[must_use]
    pub fn heap_range(&self) -> Range<usize> {
        self.heap.clone()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.heap.contains(&(ptr as usize))
    }

    /// Raw map words, two bits per block.
    #[must_use]
    pub fn block_map(&self) -> &[u64] {
        self.map.words()
    }

    /// Map state of the block containing `ptr`.
    #[must_use]
    pub fn block_state(&self, ptr: *const u8) -> Option<BlockState> {
        self.block_index(ptr).map(|block| self.map.get(block))
    }

    /// First-fit allocation of `bytes`, rounded up to whole blocks.
    pub fn allocate(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        self.allocate_aligned(bytes, BLOCK_SIZE)
    }

    /// First-fit allocation whose start is `align`-aligned relative to the heap base.
    ///
    /// Alignments up to [`BLOCK_SIZE`] cost nothing extra.
    pub fn allocate_aligned(&mut self, bytes: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if !align.is_power_of_two() {
            return Err(AllocError::BadAlignment { align });
        }
        self.ensure_ready(bytes)?;

        let needed = blocks_for(bytes);
        let step = (align / BLOCK_SIZE).max(1);
        let start = self
            .find_free_run(needed, step)
            .ok_or(AllocError::OutOfMemory { blocks: needed })?;

        self.map.mark_run(start, needed);
        self.used_blocks += needed;
        self.allocations += 1;
        Ok(self.block_ptr(start))
    }

    /// One process page: [`HUGE_ALLOC_SIZE`] bytes on a matching boundary.
    pub fn allocate_huge(&mut self) -> Result<NonNull<u8>, AllocError> {
        self.allocate_aligned(HUGE_ALLOC_SIZE, HUGE_ALLOC_SIZE)
    }

    /// Like [`allocate`](Self::allocate), but the whole run is zero-filled.
    pub fn allocate_zeroed(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(bytes)?;
        // SAFETY: freshly reserved run of `blocks_for(bytes)` blocks.
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, blocks_for(bytes) * BLOCK_SIZE) };
        Ok(ptr)
    }

    /// Returns the allocation containing `ptr` to the heap.
    ///
    /// Pointers outside the heap are ignored. The walk starts at the block
    /// containing `ptr` and ends at the next `END` block; releasing a block
    /// that is already free changes nothing.
    ///
    /// # Safety
    /// `ptr` must come from this allocator, must not be used afterwards, and
    /// must not be released twice: a second release of a pointer whose blocks
    /// were handed out again would free someone else's allocation.
    pub unsafe fn release(&mut self, ptr: *const u8) {
        if let Some(block) = self.block_index(ptr) {
            self.free_run(block);
        }
    }

    /// Size in bytes of the allocation starting at the block containing `ptr`.
    #[must_use]
    pub fn allocation_size(&self, ptr: *const u8) -> Option<usize> {
        let block = self.block_index(ptr)?;
        self.map.run_len(block).map(|blocks| blocks * BLOCK_SIZE)
    }

    /// Changes the size of an allocation.
    ///
    /// Shrinking (in whole blocks) happens in place and returns `ptr`. Growing
    /// moves the data to a fresh run and releases the old one; on failure the
    /// original allocation is left untouched.
    ///
    /// # Safety
    /// Same as [`release`](Self::release): on success the old pointer may no
    /// longer be used unless it was returned again.
    pub unsafe fn resize(&mut self, ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
        unsafe { self.resize_impl(ptr, new_size, false) }
    }

    /// Like [`resize`](Self::resize), but bytes past the old run are zeroed.
    ///
    /// Only meaningful if the original allocation was zero-filled.
    ///
    /// # Safety
    /// See [`resize`](Self::resize).
    pub unsafe fn resize_zeroed(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        unsafe { self.resize_impl(ptr, new_size, true) }
    }

    unsafe fn resize_impl(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
        zero_tail: bool,
    ) -> Result<NonNull<u8>, AllocError> {
        self.ensure_ready(new_size)?;

        let addr = ptr.as_ptr() as usize;
        let not_allocated = AllocError::NotAllocated { addr };
        let start = self.block_index(ptr.as_ptr()).ok_or(not_allocated)?;
        let old_blocks = self.map.run_len(start).ok_or(not_allocated)?;
        let new_blocks = blocks_for(new_size);

        if new_blocks <= old_blocks {
            if new_blocks < old_blocks {
                self.map.set(start + new_blocks - 1, BlockState::End);
                for block in start + new_blocks..start + old_blocks {
                    self.map.set(block, BlockState::Free);
                }
                self.used_blocks -= old_blocks - new_blocks;
            }
            return Ok(ptr);
        }

        let fresh = self.allocate(new_size)?;
        let old_len = old_blocks * BLOCK_SIZE;
        // SAFETY: both runs are live and disjoint; the new one is larger.
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old_len);
            if zero_tail {
                core::ptr::write_bytes(fresh.as_ptr().add(old_len), 0, new_blocks * BLOCK_SIZE - old_len);
            }
        }
        self.free_run(start);
        Ok(fresh)
    }

    /// Current counters without touching the map.
    #[must_use]
    pub const fn usage(&self) -> HeapUsage {
        HeapUsage {
            total_blocks: self.map.len(),
            used_blocks: self.used_blocks,
            allocations: self.allocations,
        }
    }

    /// Walks the whole map.
    ///
    /// Linear in the heap size; prefer [`usage`](Self::usage) on hot or
    /// periodic paths.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total_blocks: self.map.len(),
            ..HeapStats::default()
        };
        let mut run = 0;
        for block in 0..self.map.len() {
            match self.map.get(block) {
                BlockState::Free => {
                    stats.free_blocks += 1;
                    run += 1;
                    stats.largest_free_run = stats.largest_free_run.max(run);
                }
                BlockState::End => {
                    stats.allocations += 1;
                    run = 0;
                }
                BlockState::Part => run = 0,
            }
        }
        stats
    }

    fn free_run(&mut self, start: usize) {
        let freed = self.map.clear_run(start);
        if freed > 0 {
            self.used_blocks = self.used_blocks.saturating_sub(freed);
            self.allocations = self.allocations.saturating_sub(1);
        }
    }

    fn ensure_ready(&self, bytes: usize) -> Result<(), AllocError> {
        if !self.is_initialized() {
            warn!("block allocator used before initialization");
            return Err(AllocError::Uninitialized);
        }
        if bytes == 0 {
            return Err(AllocError::ZeroSize);
        }
        Ok(())
    }

    /// First run of `needed` free blocks starting on a multiple of `step`.
    fn find_free_run(&self, needed: usize, step: usize) -> Option<usize> {
        let total = self.map.len();
        let mut start: usize = 0;
        while start.checked_add(needed)? <= total {
            match self.map.first_used(start, needed) {
                None => return Some(start),
                // No run starting at or before `used` can fit.
                Some(used) => start = (used + 1).next_multiple_of(step),
            }
        }
        None
    }

    fn block_index(&self, ptr: *const u8) -> Option<usize> {
        let addr = ptr as usize;
        self.heap
            .contains(&addr)
            .then(|| (addr - self.heap.start) / BLOCK_SIZE)
    }

    fn block_ptr(&self, block: usize) -> NonNull<u8> {
        let offset = self.heap.start - self.region.as_ptr() as usize + block * BLOCK_SIZE;
        // SAFETY: the block lies inside the region handed to `init`.
        unsafe { self.region.add(offset) }
    }
}
