//! The full collection: the fallback when evacuation space cannot be reserved, when
//! concurrent marking falls behind, or when the runtime asks for it.
//!
//! The whole heap is marked from stack and global roots. Regions without marked objects are
//! reclaimed, then the sparsest remaining regions are evacuated into Old regions for as long
//! as the free space covers it. Young regions that are not evacuated become Old in place, so
//! after a full collection there are no young regions left. Remembered sets are rebuilt from
//! the mark.

use super::collection_set::CollectionSet;
use super::evacuate::{EvacuationStats, Evacuation, Slot};
use super::roots::RootScanner;
use super::CollectionError;
use crate::policy::region::{HeapMarkBitmap, RegionId, RegionRole, RegionSpace};
use crate::scheduler::{SafepointToken, WorkerGroup};
use crate::util::ObjectReference;
use crate::vm::{ObjectModel, Scanning};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Copy, Clone, Debug, Default)]
pub struct FullStats {
    pub marked_objects: usize,
    pub live_bytes: usize,
    /// Regions reclaimed because nothing in them was marked.
    pub reclaimed_regions: usize,
    /// Young regions relabelled Old without copying.
    pub promoted_in_place: usize,
    pub evacuation: EvacuationStats,
}

/// Mark everything reachable from `roots` in a fresh bitmap.
pub fn mark_heap<I>(space: &RegionSpace, workers: &WorkerGroup, roots: I) -> (HeapMarkBitmap, usize)
where
    I: IntoIterator<Item = ObjectReference>,
{
    let bitmap = HeapMarkBitmap::new(
        space.memory().start(),
        space.bytes_in_region(),
        space.region_count(),
    );
    let marked = AtomicUsize::new(0);
    let initial: Vec<ObjectReference> = roots.into_iter().filter(|o| bitmap.mark(*o)).collect();
    marked.fetch_add(initial.len(), Ordering::Relaxed);
    let memory = space.memory();
    workers.run(initial, |object, worker| {
        ObjectModel::for_each_ref_slot(memory, object, |slot| {
            if let Some(target) = ObjectModel::load_ref(memory, slot) {
                if bitmap.mark(target) {
                    marked.fetch_add(1, Ordering::Relaxed);
                    worker.add_work(target);
                }
            }
        })
    });
    (bitmap, marked.into_inner())
}

/// Write the marked bytes of every region into the region table. Humongous regions are live
/// in full if their object is marked.
fn account_live_bytes(space: &RegionSpace, bitmap: &HeapMarkBitmap) -> usize {
    let memory = space.memory();
    let mut total = 0;
    for region in space.regions() {
        let live = match region.role() {
            RegionRole::Free => continue,
            RegionRole::Humongous => {
                let start = space.region(region.humongous_start().unwrap_or(region.id()));
                let object = ObjectReference::from_raw_address(start.start());
                if object.is_some_and(|o| bitmap.is_marked(o)) {
                    region.used_bytes()
                } else {
                    0
                }
            }
            RegionRole::Eden | RegionRole::Survivor | RegionRole::Old => {
                let mut live = 0;
                bitmap.for_each_marked_in(region.id(), |object| {
                    live += ObjectModel::size_in_bytes(memory, object)
                });
                live
            }
        };
        region.set_live_bytes(live);
        total += live;
    }
    total
}

/// Clear the reference fields of unmarked objects, so nothing can reach reclaimed memory
/// through them.
fn scrub(space: &RegionSpace, bitmap: &HeapMarkBitmap) {
    let memory = space.memory();
    for region in space.regions() {
        if !matches!(
            region.role(),
            RegionRole::Eden | RegionRole::Survivor | RegionRole::Old
        ) {
            continue;
        }
        ObjectModel::linear_scan(memory, region.start()..region.top(), |object| {
            if !bitmap.is_marked(object) {
                ObjectModel::for_each_ref_slot(memory, object, |slot| {
                    ObjectModel::store_ref(memory, slot, None)
                });
            }
        });
    }
}

/// The sparsest regions whose live data fits in the free regions, sparsest first.
fn choose_compaction_set(space: &RegionSpace) -> Vec<RegionId> {
    let mut regions: Vec<(f64, RegionId)> = space
        .regions()
        .filter(|r| {
            matches!(
                r.role(),
                RegionRole::Eden | RegionRole::Survivor | RegionRole::Old
            )
        })
        .filter(|r| r.live_bytes() < r.capacity())
        .map(|r| (r.live_ratio(), r.id()))
        .collect();
    regions.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let free = space.free_regions();
    let mut chosen = vec![];
    let mut live = 0;
    let mut max_object = 0;
    for (_, id) in regions {
        let region = space.region(id);
        let bytes = live + region.live_bytes();
        let max = max_object.max(region.max_object_bytes());
        if CollectionSet::required_regions_for(space, bytes, max, 1) > free {
            break;
        }
        chosen.push(id);
        live = bytes;
        max_object = max;
    }
    chosen
}

/// Run a full collection. The concurrent marker must already be abandoned.
pub fn collect<S: Scanning>(
    token: &SafepointToken,
    space: &RegionSpace,
    workers: &WorkerGroup,
    scanner: &RootScanner<'_, S>,
) -> Result<FullStats, CollectionError> {
    let roots: Vec<_> = scanner.external_roots().collect();
    let (bitmap, marked_objects) = mark_heap(space, workers, roots.iter().filter_map(|r| r.load()));
    let live_bytes = account_live_bytes(space, &bitmap);

    let dead: Vec<RegionId> = space
        .regions()
        .filter(|r| r.role() != RegionRole::Free && r.live_bytes() == 0)
        .filter(|r| !(r.role() == RegionRole::Humongous && !r.is_humongous_start()))
        .map(|r| r.id())
        .collect();
    let reclaimed_regions = dead.len();
    space.reclaim(token, &dead);
    scrub(space, &bitmap);

    let compaction = choose_compaction_set(space);
    let mut in_cset = vec![false; space.region_count()];
    for id in compaction.iter() {
        in_cset[id.index()] = true;
    }
    let mut promoted_in_place = 0;
    for region in space.regions() {
        if region.role().is_young() && !in_cset[region.id().index()] {
            space.promote_in_place(token, region.id());
            promoted_in_place += 1;
        }
    }
    space.clear_remsets(token);

    let cset = CollectionSet::of(space, compaction);
    let bytes = cset.regions().iter().map(|id| space.region(*id).live_bytes()).sum();
    let required =
        CollectionSet::required_regions_for(space, bytes, cset.max_object_bytes(space), 1);
    let evacuation = Evacuation::prepare(token, space, &cset, required)?;

    // Every reference field of a live object outside the set is a root. Processing them also
    // rebuilds the remembered sets.
    let survivors: Vec<RegionId> = space
        .regions()
        .filter(|r| r.role() != RegionRole::Free && !r.in_collection_set())
        .map(|r| r.id())
        .collect();
    let mut slots: Vec<Slot> = roots.into_iter().map(Slot::Root).collect();
    let memory = space.memory();
    for id in survivors.iter() {
        space.for_each_object(*id, |object| {
            if bitmap.is_marked(object) {
                ObjectModel::for_each_ref_slot(memory, object, |slot| slots.push(Slot::Heap(slot)));
            }
        });
    }
    let evacuation = evacuation.run(token, workers, slots, 0, true);

    let mut is_survivor = vec![false; space.region_count()];
    for id in survivors.iter() {
        is_survivor[id.index()] = true;
    }
    for region in space.regions() {
        if region.role() == RegionRole::Old && !is_survivor[region.id().index()] {
            region.set_live_bytes(region.used_bytes());
        }
    }

    let stats = FullStats {
        marked_objects,
        live_bytes,
        reclaimed_regions,
        promoted_in_place,
        evacuation,
    };
    debug!("Full collection: {:?}", stats);
    if space.free_regions() == 0 {
        return Err(CollectionError::CollectionFailed);
    }
    Ok(stats)
}
