use super::region::RegionId;
use crate::util::constants::*;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One mark bit per heap word, so every object start has its own bit.
struct MarkTable {
    bits: Box<[AtomicUsize]>,
}

impl MarkTable {
    fn new(words: usize) -> Self {
        Self {
            bits: (0..words.div_ceil(BITS_IN_WORD))
                .map(|_| AtomicUsize::new(0))
                .collect(),
        }
    }

    fn test_and_mark(&self, word: usize) -> bool {
        let mask = 1usize << (word % BITS_IN_WORD);
        self.bits[word / BITS_IN_WORD].fetch_or(mask, Ordering::AcqRel) & mask == 0
    }

    fn is_marked(&self, word: usize) -> bool {
        let mask = 1usize << (word % BITS_IN_WORD);
        self.bits[word / BITS_IN_WORD].load(Ordering::Acquire) & mask != 0
    }

    fn for_each_marked<F: FnMut(usize)>(&self, mut f: F) {
        for (i, entry) in self.bits.iter().enumerate() {
            let mut value = entry.load(Ordering::Acquire);
            while value != 0 {
                let bit = value.trailing_zeros() as usize;
                f(i * BITS_IN_WORD + bit);
                value &= value - 1;
            }
        }
    }
}

/// A mark bitmap covering the whole heap, split into one table per region.
///
/// A bitmap is built from scratch for each marking (a concurrent cycle or a full collection)
/// and owned by whoever performs it. When a concurrent cycle completes, its bitmap moves into
/// the [`crate::plan::concurrent::LivenessSnapshot`].
pub struct HeapMarkBitmap {
    heap_start: Address,
    bytes_in_region: usize,
    tables: Box<[MarkTable]>,
}

impl HeapMarkBitmap {
    pub fn new(heap_start: Address, bytes_in_region: usize, regions: usize) -> Self {
        let words = bytes_in_region >> LOG_BYTES_IN_WORD;
        Self {
            heap_start,
            bytes_in_region,
            tables: (0..regions).map(|_| MarkTable::new(words)).collect(),
        }
    }

    fn locate(&self, object: ObjectReference) -> (&MarkTable, usize) {
        let offset = object.to_raw_address() - self.heap_start;
        let index = offset / self.bytes_in_region;
        match self.tables.get(index) {
            Some(table) => (table, (offset % self.bytes_in_region) >> LOG_BYTES_IN_WORD),
            None => panic!("{} is outside the marked heap", object),
        }
    }

    /// Set the mark bit. Returns `true` if this call marked the object.
    pub fn mark(&self, object: ObjectReference) -> bool {
        let (table, word) = self.locate(object);
        table.test_and_mark(word)
    }

    pub fn is_marked(&self, object: ObjectReference) -> bool {
        let (table, word) = self.locate(object);
        table.is_marked(word)
    }

    /// Visit the marked objects of one region in address order.
    pub fn for_each_marked_in<F: FnMut(ObjectReference)>(&self, region: RegionId, mut f: F) {
        let base = self.heap_start + region.index() * self.bytes_in_region;
        self.tables[region.index()].for_each_marked(|word| {
            if let Some(object) = ObjectReference::from_raw_address(base.add_words(word)) {
                f(object)
            }
        })
    }
}
