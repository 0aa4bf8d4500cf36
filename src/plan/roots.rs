//! Root enumeration for pauses and marking.

use super::collection_set::CollectionSet;
use super::evacuate::Slot;
use crate::policy::region::{RegionId, RegionSpace};
use crate::util::VMMutatorThread;
use crate::vm::{RootSlot, Scanning};

/// Enumerates the roots of one collection.
///
/// Roots are produced lazily: each source is asked for its slots only when the iterator
/// reaches it. Duplicates and null slots are passed through; collectors deduplicate by mark or
/// forwarding state.
pub struct RootScanner<'a, S: Scanning> {
    binding: &'a S,
    threads: Vec<VMMutatorThread>,
    space: &'a RegionSpace,
}

impl<'a, S: Scanning> RootScanner<'a, S> {
    /// `threads` are the mutators whose stacks are scanned, normally every thread registered
    /// with the safepoint coordinator.
    pub fn new(binding: &'a S, threads: Vec<VMMutatorThread>, space: &'a RegionSpace) -> Self {
        Self {
            binding,
            threads,
            space,
        }
    }

    /// Stack roots of every thread, then global roots.
    pub fn external_roots(&self) -> impl Iterator<Item = RootSlot> + '_ {
        self.threads
            .iter()
            .flat_map(move |tls| self.binding.stack_roots(*tls))
            .chain(std::iter::once(()).flat_map(move |_| self.binding.global_roots()))
    }

    /// Remembered-set entries pointing into the collection set from regions outside it.
    pub fn remembered_set_roots(
        &self,
        cset: &'a CollectionSet,
    ) -> impl Iterator<Item = Slot> + 'a {
        let space = self.space;
        cset.regions().iter().flat_map(move |id| {
            let mut slots = vec![];
            space
                .region(*id)
                .remset
                .for_each_slot(|source| !in_cset(space, source), |slot| slots.push(slot));
            trace!("{} remembered slots into {}", slots.len(), id);
            slots.into_iter().map(Slot::Heap)
        })
    }

    /// Every root of an evacuation of `cset`.
    pub fn roots(&'a self, cset: &'a CollectionSet) -> impl Iterator<Item = Slot> + 'a {
        self.external_roots()
            .map(Slot::Root)
            .chain(self.remembered_set_roots(cset))
    }
}

fn in_cset(space: &RegionSpace, id: RegionId) -> bool {
    space.region(id).in_collection_set()
}
