use crate::util::constants::*;
use crate::util::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The backing store of the managed heap: a word array mapped at `[start, start + bytes)`.
///
/// Every heap word is an `AtomicUsize`. Mutators, the concurrent marker and parallel GC workers
/// all read and write the same words, and atomics make those races well-defined. Most accesses
/// are `Relaxed`; the few places that publish data to another thread (region tops, forwarding
/// words) use acquire/release explicitly.
pub struct HeapMemory {
    start: Address,
    words: Box<[AtomicUsize]>,
}

impl HeapMemory {
    /// Map a zeroed heap of `bytes` bytes at `start`.
    pub fn new(start: Address, bytes: usize) -> Self {
        debug_assert!(start.is_word_aligned());
        let words = (0..bytes >> LOG_BYTES_IN_WORD)
            .map(|_| AtomicUsize::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { start, words }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start.add_words(self.words.len())
    }

    pub fn bytes(&self) -> usize {
        self.words.len() << LOG_BYTES_IN_WORD
    }

    /// Is the address inside the mapped range?
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end()
    }

    fn word(&self, addr: Address) -> &AtomicUsize {
        debug_assert!(addr.is_word_aligned(), "unaligned heap access at {}", addr);
        let index = (addr - self.start) >> LOG_BYTES_IN_WORD;
        match self.words.get(index) {
            Some(word) => word,
            None => panic!("heap access out of bounds: {}", addr),
        }
    }

    pub fn load(&self, addr: Address, order: Ordering) -> usize {
        self.word(addr).load(order)
    }

    pub fn store(&self, addr: Address, value: usize, order: Ordering) {
        self.word(addr).store(value, order)
    }

    pub fn compare_exchange(
        &self,
        addr: Address,
        current: usize,
        new: usize,
        success: Ordering,
        failure: Ordering,
    ) -> Result<usize, usize> {
        self.word(addr)
            .compare_exchange(current, new, success, failure)
    }

    /// Copy `bytes` bytes from `from` to `to`. The ranges must not overlap.
    pub fn copy(&self, from: Address, to: Address, bytes: usize) {
        debug_assert!(from + bytes <= to || to + bytes <= from);
        for offset in (0..bytes).step_by(BYTES_IN_WORD) {
            let value = self.load(from + offset, Ordering::Relaxed);
            self.store(to + offset, value, Ordering::Relaxed);
        }
    }

    /// Zero a word-aligned range.
    pub fn zero(&self, range: Range<Address>) {
        let mut cursor = range.start;
        while cursor < range.end {
            self.store(cursor, 0, Ordering::Relaxed);
            cursor += BYTES_IN_WORD;
        }
    }

    /// Is every word in the range zero?
    pub fn is_zeroed(&self, range: Range<Address>) -> bool {
        let mut cursor = range.start;
        while cursor < range.end {
            if self.load(cursor, Ordering::Relaxed) != 0 {
                return false;
            }
            cursor += BYTES_IN_WORD;
        }
        true
    }
}
