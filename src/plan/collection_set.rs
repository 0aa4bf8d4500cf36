use crate::policy::region::{Region, RegionId, RegionRole, RegionSpace};
use crate::scheduler::SafepointToken;

/// The regions evacuated by one pause.
///
/// Installing the set flags each region, so collector code can ask a region whether it is being
/// evacuated without searching the set. Dropping the flags is part of reclaiming the regions.
#[derive(Debug, Default)]
pub struct CollectionSet {
    regions: Vec<RegionId>,
    young: usize,
}

impl CollectionSet {
    /// All Eden and Survivor regions.
    pub fn young(space: &RegionSpace) -> Self {
        let regions: Vec<RegionId> = space
            .regions()
            .filter(|r| r.role().is_young())
            .map(|r| r.id())
            .collect();
        CollectionSet {
            young: regions.len(),
            regions,
        }
    }

    /// The young regions plus the given old regions.
    pub fn mixed(space: &RegionSpace, old: &[RegionId]) -> Self {
        let mut cset = Self::young(space);
        for &id in old {
            debug_assert_eq!(space.region(id).role(), RegionRole::Old);
            cset.regions.push(id);
        }
        cset
    }

    /// An arbitrary set of regions, used by full collections.
    pub fn of(space: &RegionSpace, regions: Vec<RegionId>) -> Self {
        let young = regions
            .iter()
            .filter(|id| space.region(**id).role().is_young())
            .count();
        CollectionSet { regions, young }
    }

    pub fn regions(&self) -> &[RegionId] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn young_regions(&self) -> usize {
        self.young
    }

    pub fn old_regions(&self) -> usize {
        self.regions.len() - self.young
    }

    fn iter<'a>(&'a self, space: &'a RegionSpace) -> impl Iterator<Item = &'a Region> + 'a {
        self.regions.iter().map(move |id| space.region(*id))
    }

    /// Flag every region as being evacuated.
    pub fn install(&self, _token: &SafepointToken, space: &RegionSpace) {
        for region in self.iter(space) {
            debug_assert!(
                !matches!(region.role(), RegionRole::Free | RegionRole::Humongous),
                "{:?} cannot be evacuated",
                region
            );
            region.set_in_collection_set(true);
        }
    }

    /// Bytes that would have to be copied if every object in the set survived.
    pub fn worst_case_bytes(&self, space: &RegionSpace) -> usize {
        self.iter(space).map(|r| r.used_bytes()).sum()
    }

    /// The largest object in any region of the set.
    pub fn max_object_bytes(&self, space: &RegionSpace) -> usize {
        self.iter(space)
            .map(|r| r.max_object_bytes())
            .max()
            .unwrap_or(0)
    }

    /// Total remembered-set entries of the set.
    pub fn remset_entries(&self, space: &RegionSpace) -> usize {
        self.iter(space).map(|r| r.remset.size()).sum()
    }

    /// Free regions needed to copy the whole set in the worst case, into Survivor and Old
    /// destinations.
    pub fn required_regions(&self, space: &RegionSpace) -> usize {
        Self::required_regions_for(
            space,
            self.worst_case_bytes(space),
            self.max_object_bytes(space),
            2,
        )
    }

    /// Free regions needed to copy `bytes` into `destinations` destination roles. Each role may
    /// leave one region partly filled, and every filled region may waste up to one object's
    /// worth of bytes at its end.
    pub fn required_regions_for(
        space: &RegionSpace,
        bytes: usize,
        max_object_bytes: usize,
        destinations: usize,
    ) -> usize {
        if bytes == 0 {
            return 0;
        }
        let usable = Region::usable_bytes_for_copy(space.bytes_in_region(), max_object_bytes);
        bytes.div_ceil(usable) + destinations
    }
}
