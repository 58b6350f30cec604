use core::ptr::NonNull;

/// Blocks described by one map word.
pub const BLOCKS_PER_WORD: usize = u64::BITS as usize / 2;

/// State of one heap block, as stored in its two map bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
    /// `00`: not part of any allocation.
    Free = 0b00,
    /// `10`: last block of an allocation.
    End = 0b10,
    /// `11`: any block of an allocation except the last.
    Part = 0b11,
}

impl BlockState {
    const fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0b11 => Self::Part,
            0b10 => Self::End,
            // `01` is never written; treat it like a free pair.
            _ => Self::Free,
        }
    }

    #[inline]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Two-bit-per-block map living at the start of the managed region.
pub(crate) struct BlockMap {
    words: NonNull<u64>,
    word_count: usize,
    blocks: usize,
}

impl BlockMap {
    pub(crate) const fn empty() -> Self {
        Self {
            words: NonNull::dangling(),
            word_count: 0,
            blocks: 0,
        }
    }

    /// Places a map for `blocks` blocks at `words` and clears it.
    ///
    /// # Safety
    /// `words` must be valid for writes of `words_needed(blocks)` `u64`s for as
    /// long as the map lives, and not be used by anyone else.
    pub(crate) unsafe fn init(words: NonNull<u64>, blocks: usize) -> Self {
        let word_count = words_needed(blocks);
        unsafe {
            core::ptr::write_bytes(words.as_ptr(), 0, word_count);
        }
        Self {
            words,
            word_count,
            blocks,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.blocks
    }

    #[inline]
    pub(crate) fn words(&self) -> &[u64] {
        // SAFETY: `init` established ownership of `word_count` words.
        unsafe { core::slice::from_raw_parts(self.words.as_ptr(), self.word_count) }
    }

    #[inline]
    fn words_mut(&mut self) -> &mut [u64] {
        // SAFETY: as in `words`, plus `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.words.as_ptr(), self.word_count) }
    }

    #[inline]
    pub(crate) fn get(&self, block: usize) -> BlockState {
        debug_assert!(block < self.blocks);
        let word = self.words()[block / BLOCKS_PER_WORD];
        BlockState::from_bits(word >> shift(block))
    }

    #[inline]
    pub(crate) fn set(&mut self, block: usize, state: BlockState) {
        debug_assert!(block < self.blocks);
        let shift = shift(block);
        let word = &mut self.words_mut()[block / BLOCKS_PER_WORD];
        *word = (*word & !(0b11 << shift)) | ((state as u64) << shift);
    }

    /// Marks `count` blocks from `start` as one allocation.
    pub(crate) fn mark_run(&mut self, start: usize, count: usize) {
        debug_assert!(count > 0);
        let last = start + count - 1;
        for block in start..last {
            self.set(block, BlockState::Part);
        }
        self.set(last, BlockState::End);
    }

    /// Frees blocks from `start` up to and including the next `END`.
    ///
    /// Returns the number of blocks cleared, zero if `start` was free.
    pub(crate) fn clear_run(&mut self, start: usize) -> usize {
        let mut block = start;
        while block < self.blocks {
            match self.get(block) {
                BlockState::Free => break,
                BlockState::Part => self.set(block, BlockState::Free),
                BlockState::End => {
                    self.set(block, BlockState::Free);
                    block += 1;
                    break;
                }
            }
            block += 1;
        }
        block - start
    }

    /// Length in blocks of the allocation run starting at `start`.
    pub(crate) fn run_len(&self, start: usize) -> Option<usize> {
        let mut block = start;
        while block < self.blocks {
            match self.get(block) {
                BlockState::Free => return None,
                BlockState::Part => block += 1,
                BlockState::End => return Some(block - start + 1),
            }
        }
        None
    }

    /// First non-free block in `start..start + count`, if any.
    ///
    /// Skips whole words of free blocks at a time.
    pub(crate) fn first_used(&self, start: usize, count: usize) -> Option<usize> {
        let end = (start + count).min(self.blocks);
        let words = self.words();
        let mut block = start;
        while block < end {
            if block.is_multiple_of(BLOCKS_PER_WORD)
                && block + BLOCKS_PER_WORD <= end
                && words[block / BLOCKS_PER_WORD] == 0
            {
                block += BLOCKS_PER_WORD;
                continue;
            }
            if !self.get(block).is_free() {
                return Some(block);
            }
            block += 1;
        }
        None
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn shift(block: usize) -> u32 {
    ((block % BLOCKS_PER_WORD) * 2) as u32
}

/// Map words needed to describe `blocks` blocks.
#[inline]
pub(crate) const fn words_needed(blocks: usize) -> usize {
    blocks.div_ceil(BLOCKS_PER_WORD)
}
