use super::region::RegionId;
use crate::util::constants::*;
use crate::util::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bitmap over the words of one source region. A set bit means the slot at that word may
/// hold a reference into the region owning the remembered set.
struct PerRegionTable {
    bits: Box<[AtomicUsize]>,
}

impl PerRegionTable {
    fn new(words_in_region: usize) -> Self {
        Self {
            bits: (0..words_in_region.div_ceil(BITS_IN_WORD))
                .map(|_| AtomicUsize::new(0))
                .collect(),
        }
    }

    fn add(&self, word: usize) -> bool {
        let mask = 1usize << (word % BITS_IN_WORD);
        self.bits[word / BITS_IN_WORD].fetch_or(mask, Ordering::Relaxed) & mask == 0
    }

    fn contains(&self, word: usize) -> bool {
        let mask = 1usize << (word % BITS_IN_WORD);
        self.bits[word / BITS_IN_WORD].load(Ordering::Relaxed) & mask != 0
    }

    fn for_each<F: FnMut(usize)>(&self, mut f: F) {
        for (i, entry) in self.bits.iter().enumerate() {
            let mut value = entry.load(Ordering::Relaxed);
            while value != 0 {
                let bit = value.trailing_zeros() as usize;
                f(i * BITS_IN_WORD + bit);
                value &= value - 1;
            }
        }
    }
}

/// The remembered set of one region: slot addresses elsewhere in the heap that may point into
/// it. Entries are grouped by source region so that freeing a source region drops all of its
/// entries at once.
///
/// Mutators add entries concurrently through the write barrier. Duplicates cost nothing and
/// stale entries are tolerated: an evacuation re-reads every remembered slot and copies its
/// current referent only if that object is in the collection set, wherever the slot pointed
/// when it was remembered. Reading and clearing happens only inside a safepoint.
pub struct RemSet {
    heap_start: Address,
    bytes_in_region: usize,
    size: AtomicUsize,
    tables: spin::RwLock<HashMap<RegionId, PerRegionTable>>,
}

impl RemSet {
    pub fn new(heap_start: Address, bytes_in_region: usize) -> Self {
        Self {
            heap_start,
            bytes_in_region,
            size: AtomicUsize::new(0),
            tables: spin::RwLock::new(HashMap::new()),
        }
    }

    fn locate(&self, slot: Address) -> (RegionId, usize) {
        let offset = slot - self.heap_start;
        (
            RegionId::from_index(offset / self.bytes_in_region),
            (offset % self.bytes_in_region) >> LOG_BYTES_IN_WORD,
        )
    }

    /// Remember a slot. Returns `true` if it was not remembered before.
    pub fn add(&self, slot: Address) -> bool {
        let (source, word) = self.locate(slot);
        let added = {
            let tables = self.tables.read();
            tables.get(&source).map(|prt| prt.add(word))
        };
        let added = match added {
            Some(added) => added,
            None => self
                .tables
                .write()
                .entry(source)
                .or_insert_with(|| PerRegionTable::new(self.bytes_in_region >> LOG_BYTES_IN_WORD))
                .add(word),
        };
        if added {
            self.size.fetch_add(1, Ordering::Relaxed);
        }
        added
    }

    pub fn contains(&self, slot: Address) -> bool {
        let (source, word) = self.locate(slot);
        self.tables
            .read()
            .get(&source)
            .is_some_and(|prt| prt.contains(word))
    }

    /// Number of remembered slots.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Regions that have at least one remembered slot.
    pub fn sources(&self) -> Vec<RegionId> {
        let mut sources: Vec<RegionId> = self.tables.read().keys().copied().collect();
        sources.sort();
        sources
    }

    /// Visit every remembered slot whose source region passes the filter.
    pub fn for_each_slot<P, F>(&self, mut include_source: P, mut f: F)
    where
        P: FnMut(RegionId) -> bool,
        F: FnMut(Address),
    {
        let tables = self.tables.read();
        for (source, prt) in tables.iter() {
            if !include_source(*source) {
                continue;
            }
            let base = self.heap_start + source.index() * self.bytes_in_region;
            prt.for_each(|word| f(base.add_words(word)));
        }
    }

    /// Drop every entry whose slot lives in `source`.
    pub fn remove_source(&self, source: RegionId) {
        if let Some(prt) = self.tables.write().remove(&source) {
            let mut removed = 0;
            prt.for_each(|_| removed += 1);
            self.size.fetch_sub(removed, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.tables.write().clear();
        self.size.store(0, Ordering::Relaxed);
    }
}
