use crate::policy::region::{HeapMarkBitmap, RegionId, RegionRole, RegionSpace};
use crate::scheduler::SafepointToken;
use crate::util::ObjectReference;
use crate::vm::ObjectModel;

/// Liveness of one region as of the end of a marking cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegionLiveness {
    /// Epoch of the region when the cycle started. The entry describes that incarnation only.
    pub epoch: usize,
    pub live_bytes: usize,
    /// The region is a humongous continuation; it is reclaimed together with its start region.
    pub humongous_continuation: bool,
}

/// The result of a completed marking cycle: the mark bitmap and the live bytes of every region
/// that was Old or Humongous when the cycle started.
///
/// Built by the marker at remark, then handed over to the mixed collector. Nothing mutates it
/// after it is built.
pub struct LivenessSnapshot {
    cycle: usize,
    regions: Vec<Option<RegionLiveness>>,
    bitmap: HeapMarkBitmap,
}

impl LivenessSnapshot {
    pub(crate) fn new(
        cycle: usize,
        regions: Vec<Option<RegionLiveness>>,
        bitmap: HeapMarkBitmap,
    ) -> Self {
        Self {
            cycle,
            regions,
            bitmap,
        }
    }

    /// The marking cycle that produced the snapshot.
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn region(&self, id: RegionId) -> Option<&RegionLiveness> {
        self.regions.get(id.index()).and_then(|r| r.as_ref())
    }

    /// Entries for the regions covered by the snapshot, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &RegionLiveness)> {
        self.regions
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (RegionId::from_index(i), r)))
    }

    pub fn is_marked(&self, object: ObjectReference) -> bool {
        self.bitmap.is_marked(object)
    }

    /// Is the entry still about the region's current incarnation?
    pub fn is_current(&self, space: &RegionSpace, id: RegionId) -> bool {
        self.region(id)
            .is_some_and(|l| space.region(id).epoch() == l.epoch)
    }

    /// Regions with no live data. Humongous objects are listed by their start region.
    pub fn reclaimable(&self, space: &RegionSpace) -> Vec<RegionId> {
        self.iter()
            .filter(|(id, l)| {
                l.live_bytes == 0 && !l.humongous_continuation && self.is_current(space, *id)
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn total_live_bytes(&self) -> usize {
        self.iter().map(|(_, l)| l.live_bytes).sum()
    }
}

/// The cleanup step of a marking cycle.
///
/// Writes the live bytes of the snapshot into the region table, reclaims regions without live
/// data, and clears the reference fields of unmarked objects below TAMS. Those objects are
/// unreachable, but stale remembered-set entries may still lead a later pause to them, and their
/// fields may point into regions reclaimed here.
///
/// Running it again with the same snapshot returns the same regions and changes nothing.
pub fn cleanup(
    token: &SafepointToken,
    space: &RegionSpace,
    snapshot: &LivenessSnapshot,
) -> Vec<RegionId> {
    let memory = space.memory();
    let mut scrubbed = 0;
    for (id, liveness) in snapshot.iter() {
        if !snapshot.is_current(space, id) {
            continue;
        }
        let region = space.region(id);
        match region.role() {
            RegionRole::Old => {
                region.set_live_bytes(liveness.live_bytes);
                if liveness.live_bytes == 0 {
                    continue;
                }
                ObjectModel::linear_scan(memory, region.start()..region.tams(), |object| {
                    if !snapshot.is_marked(object) {
                        ObjectModel::for_each_ref_slot(memory, object, |slot| {
                            ObjectModel::store_ref(memory, slot, None)
                        });
                        scrubbed += 1;
                    }
                });
            }
            RegionRole::Humongous => region.set_live_bytes(liveness.live_bytes),
            RegionRole::Free => {}
            RegionRole::Eden | RegionRole::Survivor => {
                panic!("{:?} changed its role during marking", region)
            }
        }
    }
    let reclaimable = snapshot.reclaimable(space);
    space.reclaim(token, &reclaimable);
    debug!(
        "Cleanup of cycle {}: reclaimed {:?}, scrubbed {} dead objects",
        snapshot.cycle(),
        reclaimable,
        scrubbed
    );
    reclaimable
}
