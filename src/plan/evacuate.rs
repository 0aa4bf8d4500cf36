//! Parallel copy-and-forward evacuation of a collection set.

use super::collection_set::CollectionSet;
use crate::plan::CollectionError;
use crate::policy::region::{EvacuationReserve, RegionId, RegionRole, RegionSpace};
use crate::scheduler::{GCWorker, SafepointToken, WorkerGroup};
use crate::util::object_forwarding;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, RootSlot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A location holding a reference that evacuation may have to update.
#[derive(Debug)]
pub enum Slot {
    /// A stack or global root.
    Root(RootSlot),
    /// A reference field in the heap.
    Heap(Address),
}

impl Slot {
    pub fn load(&self, space: &RegionSpace) -> Option<ObjectReference> {
        match self {
            Slot::Root(root) => root.load(),
            Slot::Heap(addr) => ObjectModel::load_ref(space.memory(), *addr),
        }
    }

    pub fn store(&self, space: &RegionSpace, object: Option<ObjectReference>) {
        match self {
            Slot::Root(root) => root.store(object),
            Slot::Heap(addr) => ObjectModel::store_ref(space.memory(), *addr, object),
        }
    }
}

/// The region a destination currently copies into. Index + 1, 0 for none.
struct Destination {
    role: RegionRole,
    current: AtomicUsize,
    refill: Mutex<()>,
}

impl Destination {
    fn new(role: RegionRole) -> Self {
        Self {
            role,
            current: AtomicUsize::new(0),
            refill: Mutex::new(()),
        }
    }
}

/// Copies live objects out of an installed collection set.
///
/// Workers race on the forwarding bits of each object: the winner copies and publishes the
/// forwarding pointer, the others spin until it appears. Copies go to two shared destination
/// regions, one Survivor and one Old, refilled from the evacuation reserve.
pub struct Evacuator<'a> {
    space: &'a RegionSpace,
    reserve: &'a EvacuationReserve,
    tenuring_threshold: u8,
    /// Copy everything to Old regions.
    force_old: bool,
    survivor: Destination,
    old: Destination,
    copied_bytes: AtomicUsize,
    copied_objects: AtomicUsize,
    promoted_bytes: AtomicUsize,
}

impl<'a> Evacuator<'a> {
    pub fn new(
        space: &'a RegionSpace,
        reserve: &'a EvacuationReserve,
        tenuring_threshold: u8,
        force_old: bool,
    ) -> Self {
        Self {
            space,
            reserve,
            tenuring_threshold,
            force_old,
            survivor: Destination::new(RegionRole::Survivor),
            old: Destination::new(RegionRole::Old),
            copied_bytes: AtomicUsize::new(0),
            copied_objects: AtomicUsize::new(0),
            promoted_bytes: AtomicUsize::new(0),
        }
    }

    fn allocate(&self, destination: &Destination, bytes: usize) -> Address {
        loop {
            let current = destination.current.load(Ordering::Acquire);
            if current != 0 {
                let region = self.space.region(RegionId::from_index(current - 1));
                if let Some(addr) = region.allocate_par(bytes) {
                    return addr;
                }
            }
            let _refill = destination.refill.lock().unwrap();
            if destination.current.load(Ordering::Acquire) != current {
                // Another worker already refilled.
                continue;
            }
            match self.reserve.take(self.space, destination.role) {
                Some(id) => {
                    trace!("New {} destination {}", destination.role, id);
                    destination.current.store(id.index() + 1, Ordering::Release);
                }
                // The reservation covers the worst case, so this is a bug.
                None => panic!(
                    "evacuation reserve exhausted copying {} bytes to {}",
                    bytes, destination.role
                ),
            }
        }
    }

    /// Copy an object in the collection set, or find its copy.
    fn evacuate(&self, object: ObjectReference, worker: &mut GCWorker<'_, Slot>) -> ObjectReference {
        let memory = self.space.memory();
        let bits = object_forwarding::attempt_to_forward(memory, object);
        if object_forwarding::state_is_forwarded_or_being_forwarded(bits) {
            return object_forwarding::spin_and_get_forwarded_object(memory, object, bits);
        }
        let bytes = ObjectModel::size_in_bytes(memory, object);
        let age = ObjectModel::age(memory, object);
        let source = self.space.region_of_object(object).role();
        let to_old = self.force_old || source == RegionRole::Old || age >= self.tenuring_threshold;
        let destination = if to_old { &self.old } else { &self.survivor };

        let to = self.allocate(destination, bytes);
        memory.copy(object.to_raw_address(), to, bytes);
        memory.store(
            to,
            ObjectModel::status_with_age(age.saturating_add(1)),
            Ordering::Relaxed,
        );
        let new_object = match ObjectReference::from_raw_address(to) {
            Some(new_object) => new_object,
            None => panic!("evacuated {} to the zero address", object),
        };
        object_forwarding::forward_object(memory, object, new_object);

        self.copied_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.copied_objects.fetch_add(1, Ordering::Relaxed);
        if to_old {
            // Copies are live until the next marking says otherwise.
            self.space.region_of_object(new_object).add_live_bytes(bytes);
            if source.is_young() {
                self.promoted_bytes.fetch_add(bytes, Ordering::Relaxed);
            }
        }
        ObjectModel::for_each_ref_slot(memory, new_object, |slot| {
            worker.add_work(Slot::Heap(slot))
        });
        new_object
    }

    /// Evacuate the referent of a slot if it is in the collection set, update the slot, and
    /// remember the reference if it now crosses from an old region.
    pub fn process_slot(&self, slot: Slot, worker: &mut GCWorker<'_, Slot>) {
        let Some(object) = slot.load(self.space) else {
            return;
        };
        let region = self.space.region_of_object(object);
        let new_object = if region.in_collection_set() {
            self.evacuate(object, worker)
        } else {
            object
        };
        if new_object != object {
            slot.store(self.space, Some(new_object));
        }
        if let Slot::Heap(addr) = slot {
            self.space.remember(addr, new_object);
        }
    }

    pub fn copied_bytes(&self) -> usize {
        self.copied_bytes.load(Ordering::Relaxed)
    }

    pub fn copied_objects(&self) -> usize {
        self.copied_objects.load(Ordering::Relaxed)
    }

    pub fn promoted_bytes(&self) -> usize {
        self.promoted_bytes.load(Ordering::Relaxed)
    }
}

/// What an evacuation did, for logging and the pause time predictor.
#[derive(Copy, Clone, Debug, Default)]
pub struct EvacuationStats {
    pub cset_regions: usize,
    pub young_regions: usize,
    pub old_regions: usize,
    pub reserved_regions: usize,
    pub destination_regions: usize,
    pub root_slots: usize,
    pub remset_entries: usize,
    pub copied_objects: usize,
    pub copied_bytes: usize,
    pub promoted_bytes: usize,
    pub copy_time: Duration,
}

/// An evacuation whose destination space is reserved and whose collection set is installed.
///
/// Created by [`Evacuation::prepare`] before any root is scanned, so a pause that cannot
/// reserve enough space fails without touching the heap.
pub struct Evacuation<'a> {
    space: &'a RegionSpace,
    cset: &'a CollectionSet,
    reserve: EvacuationReserve,
    required_regions: usize,
    remset_entries: usize,
}

impl<'a> Evacuation<'a> {
    /// Reserve `required_regions` Free regions and install the collection set. If there are
    /// not enough Free regions, the heap is left unchanged and `PromotionFailure` is returned.
    pub fn prepare(
        token: &SafepointToken,
        space: &'a RegionSpace,
        cset: &'a CollectionSet,
        required_regions: usize,
    ) -> Result<Self, CollectionError> {
        let reserve = space.reserve(token, required_regions)?;
        let remset_entries = cset.remset_entries(space);
        cset.install(token, space);
        Ok(Self {
            space,
            cset,
            reserve,
            required_regions,
            remset_entries,
        })
    }

    /// Copy everything reachable from `roots` that lives in the collection set, then reclaim
    /// the set and return the unused part of the reserve.
    pub fn run(
        self,
        token: &SafepointToken,
        workers: &WorkerGroup,
        roots: Vec<Slot>,
        tenuring_threshold: u8,
        force_old: bool,
    ) -> EvacuationStats {
        let Evacuation {
            space,
            cset,
            reserve,
            required_regions,
            remset_entries,
        } = self;
        let start = Instant::now();
        let root_slots = roots.len();
        let evacuator = Evacuator::new(space, &reserve, tenuring_threshold, force_old);
        workers.run(roots, |slot, worker| evacuator.process_slot(slot, worker));
        let copy_time = start.elapsed();

        let stats = EvacuationStats {
            cset_regions: cset.len(),
            young_regions: cset.young_regions(),
            old_regions: cset.old_regions(),
            reserved_regions: required_regions,
            destination_regions: reserve.taken(),
            root_slots,
            remset_entries,
            copied_objects: evacuator.copied_objects(),
            copied_bytes: evacuator.copied_bytes(),
            promoted_bytes: evacuator.promoted_bytes(),
            copy_time,
        };
        drop(evacuator);
        space.reclaim(token, cset.regions());
        reserve.release(space);
        debug!("Evacuated {:?}", stats);
        stats
    }
}
