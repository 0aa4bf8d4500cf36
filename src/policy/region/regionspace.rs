use super::region::{Region, RegionId, RegionRole};
use super::remset::RemSet;
use crate::plan::CollectionError;
use crate::scheduler::SafepointToken;
use crate::util::alloc::AllocationError;
use crate::util::memory::HeapMemory;
use crate::util::{Address, ObjectReference};
use crate::vm::ObjectModel;
use enum_map::EnumMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use strum::IntoEnumIterator;

/// The region table: the heap memory and the metadata of every region.
///
/// This is the single owner of region state. Roles change only through a few methods: claiming
/// a Free region happens under the free-list lock, and every other transition requires a
/// [`SafepointToken`].
pub struct RegionSpace {
    memory: HeapMemory,
    regions: Box<[Region]>,
    bytes_in_region: usize,
    /// Indices of Free regions. Claims take the lowest index first.
    free: Mutex<BTreeSet<usize>>,
    role_counts: EnumMap<RegionRole, AtomicUsize>,
}

impl RegionSpace {
    pub fn new(heap_start: Address, heap_regions: usize, bytes_in_region: usize) -> Self {
        debug_assert!(bytes_in_region.is_power_of_two());
        debug_assert!(heap_start.is_aligned_to(bytes_in_region));
        let memory = HeapMemory::new(heap_start, heap_regions * bytes_in_region);
        let regions = (0..heap_regions)
            .map(|i| {
                Region::new(
                    RegionId::from_index(i),
                    heap_start + i * bytes_in_region,
                    bytes_in_region,
                    RemSet::new(heap_start, bytes_in_region),
                )
            })
            .collect();
        let role_counts: EnumMap<RegionRole, AtomicUsize> = EnumMap::default();
        role_counts[RegionRole::Free].store(heap_regions, Ordering::Relaxed);
        RegionSpace {
            memory,
            regions,
            bytes_in_region,
            free: Mutex::new((0..heap_regions).collect()),
            role_counts,
        }
    }

    pub fn memory(&self) -> &HeapMemory {
        &self.memory
    }

    pub fn bytes_in_region(&self) -> usize {
        self.bytes_in_region
    }

    /// Objects larger than this are humongous.
    pub fn humongous_threshold(&self) -> usize {
        self.bytes_in_region / 2
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.memory.contains(addr)
    }

    pub fn region_of(&self, addr: Address) -> Option<&Region> {
        if !self.contains(addr) {
            return None;
        }
        self.regions
            .get((addr - self.memory.start()) / self.bytes_in_region)
    }

    /// The region of an object the collector is about to touch. A reference outside the heap
    /// means the heap is corrupt.
    pub fn region_of_object(&self, object: ObjectReference) -> &Region {
        match self.region_of(object.to_raw_address()) {
            Some(region) => region,
            None => panic!("{} does not point into any region", object),
        }
    }

    pub fn role_count(&self, role: RegionRole) -> usize {
        self.role_counts[role].load(Ordering::Relaxed)
    }

    pub fn regions_by_role(&self) -> EnumMap<RegionRole, usize> {
        EnumMap::from_fn(|role| self.role_count(role))
    }

    pub fn free_regions(&self) -> usize {
        self.role_count(RegionRole::Free)
    }

    /// Fraction of regions that are not Free.
    pub fn occupancy(&self) -> f64 {
        1.0 - self.free_regions() as f64 / self.region_count() as f64
    }

    /// Fraction of regions that are Old or Humongous.
    pub fn old_occupancy(&self) -> f64 {
        (self.role_count(RegionRole::Old) + self.role_count(RegionRole::Humongous)) as f64
            / self.region_count() as f64
    }

    /// Regions with the given role, in index order.
    pub fn regions_with_role(&self, role: RegionRole) -> Vec<RegionId> {
        self.regions
            .iter()
            .filter(|r| r.role() == role)
            .map(|r| r.id())
            .collect()
    }

    fn set_role(&self, region: &Region, role: RegionRole) {
        let old = region.set_role(role);
        self.role_counts[old].fetch_sub(1, Ordering::Relaxed);
        self.role_counts[role].fetch_add(1, Ordering::Relaxed);
    }

    /// Claim the lowest Free region for `role`.
    pub fn allocate_region(&self, role: RegionRole) -> Result<RegionId, AllocationError> {
        self.allocate_region_bounded(role, usize::MAX)
    }

    /// Claim a Free region for `role` unless `limit` regions already have that role.
    pub fn allocate_region_bounded(
        &self,
        role: RegionRole,
        limit: usize,
    ) -> Result<RegionId, AllocationError> {
        debug_assert!(
            matches!(role, RegionRole::Eden | RegionRole::Survivor | RegionRole::Old),
            "cannot allocate a single {} region",
            role
        );
        let mut free = self.free.lock().unwrap();
        if self.role_count(role) >= limit {
            return Err(AllocationError::AllocationFailure);
        }
        let Some(index) = free.pop_first() else {
            return Err(AllocationError::HeapExhausted);
        };
        let region = &self.regions[index];
        region.claim(role, None);
        self.set_role(region, role);
        trace!("Claimed {:?}", region);
        Ok(region.id())
    }

    /// Claim enough contiguous Free regions for a humongous object of `bytes` bytes and set
    /// their tops to cover it. Returns the start region.
    pub fn allocate_humongous(&self, bytes: usize) -> Result<RegionId, AllocationError> {
        let count = bytes.div_ceil(self.bytes_in_region);
        let mut free = self.free.lock().unwrap();
        let first = {
            let mut run_start = None;
            let mut run_len = 0;
            let mut previous = None;
            for &index in free.iter() {
                if previous.map_or(true, |p| p + 1 != index) {
                    run_start = Some(index);
                    run_len = 0;
                }
                run_len += 1;
                previous = Some(index);
                if run_len == count {
                    break;
                }
            }
            match run_start {
                Some(start) if run_len == count => start,
                _ => return Err(AllocationError::HeapExhausted),
            }
        };
        let start_id = RegionId::from_index(first);
        let object_end = self.regions[first].start() + bytes;
        for index in first..first + count {
            free.remove(&index);
            let region = &self.regions[index];
            region.claim(
                RegionRole::Humongous,
                (index != first).then_some(start_id),
            );
            self.set_role(region, RegionRole::Humongous);
            region.set_top(object_end.min(region.end()));
        }
        self.regions[first].note_object(bytes);
        debug!("Claimed {} humongous regions at {} for {} bytes", count, start_id, bytes);
        Ok(start_id)
    }

    /// The regions holding the humongous object that starts in `start`.
    pub fn humongous_regions(&self, start: RegionId) -> Vec<RegionId> {
        let mut regions = vec![start];
        regions.extend(
            self.regions[start.index() + 1..]
                .iter()
                .take_while(|r| r.role() == RegionRole::Humongous && r.humongous_start() == Some(start))
                .map(|r| r.id()),
        );
        regions
    }

    /// Return regions to Free: zero their used memory and liveness metadata, and drop every
    /// remembered-set entry that lives in them. Reclaiming a humongous start region reclaims
    /// its continuations.
    pub fn reclaim(&self, _token: &SafepointToken, ids: &[RegionId]) {
        let mut reclaimed = Vec::with_capacity(ids.len());
        for &id in ids {
            let region = self.region(id);
            match region.role() {
                RegionRole::Free => continue,
                RegionRole::Humongous => {
                    reclaimed.extend(self.humongous_regions(region.humongous_start().unwrap_or(id)))
                }
                RegionRole::Eden | RegionRole::Survivor | RegionRole::Old => reclaimed.push(id),
            }
        }
        if reclaimed.is_empty() {
            return;
        }
        reclaimed.sort();
        reclaimed.dedup();
        let mut is_reclaimed = vec![false; self.regions.len()];
        for id in reclaimed.iter() {
            is_reclaimed[id.index()] = true;
        }
        for region in self.regions.iter() {
            if region.role() != RegionRole::Free && !is_reclaimed[region.id().index()] {
                for &source in reclaimed.iter() {
                    region.remset.remove_source(source);
                }
            }
        }
        let mut free = self.free.lock().unwrap();
        for &id in reclaimed.iter() {
            let region = self.region(id);
            region.reset(&self.memory);
            self.set_role(region, RegionRole::Free);
            free.insert(id.index());
        }
        debug!("Reclaimed {} regions: {:?}", reclaimed.len(), reclaimed);
    }

    /// Turn a young region into an Old one in place.
    pub fn promote_in_place(&self, _token: &SafepointToken, id: RegionId) {
        let region = self.region(id);
        debug_assert!(region.role().is_young());
        self.set_role(region, RegionRole::Old);
    }

    /// Take `count` Free regions out of circulation for an evacuation. Fails with
    /// `PromotionFailure` if there are not enough Free regions.
    pub fn reserve(
        &self,
        _token: &SafepointToken,
        count: usize,
    ) -> Result<EvacuationReserve, CollectionError> {
        let mut free = self.free.lock().unwrap();
        if free.len() < count {
            return Err(CollectionError::PromotionFailure {
                required_regions: count,
                free_regions: free.len(),
            });
        }
        let regions = (0..count).filter_map(|_| free.pop_first()).collect();
        Ok(EvacuationReserve {
            regions: Mutex::new(regions),
            taken: AtomicUsize::new(0),
        })
    }

    /// Record that `slot` holds a reference to `target`. Only references from Old or
    /// Humongous regions into other regions are remembered: young regions are always
    /// collected, so nothing needs to be remembered about them.
    pub fn remember(&self, slot: Address, target: ObjectReference) {
        let Some(source) = self.region_of(slot) else {
            return;
        };
        if !source.role().is_old() || source.contains(target.to_raw_address()) {
            return;
        }
        if let Some(target_region) = self.region_of(target.to_raw_address()) {
            target_region.remset.add(slot);
        }
    }

    /// Visit every object in a region, in address order. A humongous start region yields its
    /// single object; continuation regions yield nothing.
    pub fn for_each_object<F: FnMut(ObjectReference)>(&self, id: RegionId, f: F) {
        let region = self.region(id);
        match region.role() {
            RegionRole::Free => {}
            RegionRole::Humongous => {
                if region.humongous_start().is_none() {
                    let mut f = f;
                    if let Some(object) = ObjectReference::from_raw_address(region.start()) {
                        f(object)
                    }
                }
            }
            RegionRole::Eden | RegionRole::Survivor | RegionRole::Old => {
                ObjectModel::linear_scan(&self.memory, region.start()..region.top(), f)
            }
        }
    }

    /// Sum of live bytes over non-Free regions. Young regions count as fully live.
    pub fn live_bytes_estimate(&self) -> usize {
        self.regions
            .iter()
            .map(|r| match r.role() {
                RegionRole::Free => 0,
                RegionRole::Eden | RegionRole::Survivor => r.used_bytes(),
                RegionRole::Old | RegionRole::Humongous => r.live_bytes(),
            })
            .sum()
    }

    pub fn clear_remsets(&self, _token: &SafepointToken) {
        for region in self.regions.iter() {
            region.remset.clear();
        }
    }

    /// Check the per-role counters and the `top` bound of every region.
    pub fn check_invariants(&self) {
        let mut counts: EnumMap<RegionRole, usize> = EnumMap::default();
        for region in self.regions.iter() {
            counts[region.role()] += 1;
            assert!(
                region.top() <= region.end(),
                "{:?}: top exceeds capacity",
                region
            );
        }
        for role in RegionRole::iter() {
            assert_eq!(counts[role], self.role_count(role), "{} count mismatch", role);
        }
        assert_eq!(self.free.lock().unwrap().len(), counts[RegionRole::Free]);
    }
}

/// Free regions set aside before an evacuation starts, so that copying can never run out of
/// space halfway. Regions taken from the reserve become evacuation destinations; the rest
/// go back to the free list when the evacuation ends.
pub struct EvacuationReserve {
    regions: Mutex<Vec<usize>>,
    taken: AtomicUsize,
}

impl EvacuationReserve {
    /// Claim a reserved region for `role`.
    pub fn take(&self, space: &RegionSpace, role: RegionRole) -> Option<RegionId> {
        let index = {
            let mut regions = self.regions.lock().unwrap();
            if regions.is_empty() {
                return None;
            }
            regions.remove(0)
        };
        let region = &space.regions[index];
        region.claim(role, None);
        space.set_role(region, role);
        self.taken.fetch_add(1, Ordering::Relaxed);
        Some(region.id())
    }

    pub fn remaining(&self) -> usize {
        self.regions.lock().unwrap().len()
    }

    pub fn taken(&self) -> usize {
        self.taken.load(Ordering::Relaxed)
    }

    /// Give the unused regions back.
    pub fn release(self, space: &RegionSpace) {
        let regions = self.regions.into_inner().unwrap();
        let mut free = space.free.lock().unwrap();
        free.extend(regions);
    }
}
