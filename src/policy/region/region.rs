use super::remset::RemSet;
use crate::util::constants::*;
use crate::util::memory::HeapMemory;
use crate::util::Address;
use atomic::Atomic;
use bytemuck::NoUninit;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Index of a region in the region table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Debug)]
pub struct RegionId(usize);

impl RegionId {
    pub const fn from_index(index: usize) -> Self {
        RegionId(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// What a region is currently used for.
#[repr(u8)]
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    NoUninit,
    enum_map::Enum,
    strum_macros::EnumIter,
    strum_macros::Display,
)]
pub enum RegionRole {
    Free,
    /// Mutator allocation buffers.
    Eden,
    /// Objects that survived at least one young collection but are not yet tenured.
    Survivor,
    Old,
    /// One object larger than half a region. A humongous object that spans several regions
    /// marks all of them Humongous; the first one is the start region.
    Humongous,
}

impl RegionRole {
    pub fn is_young(self) -> bool {
        match self {
            RegionRole::Eden | RegionRole::Survivor => true,
            RegionRole::Free | RegionRole::Old | RegionRole::Humongous => false,
        }
    }

    /// Roles whose objects are traced by the concurrent marker and whose outgoing
    /// cross-region references are remembered.
    pub fn is_old(self) -> bool {
        match self {
            RegionRole::Old | RegionRole::Humongous => true,
            RegionRole::Free | RegionRole::Eden | RegionRole::Survivor => false,
        }
    }

    /// The role transitions a region may go through, all of which happen either under the
    /// free-list lock or inside a safepoint.
    pub fn can_transition_to(self, to: RegionRole) -> bool {
        match (self, to) {
            (RegionRole::Free, RegionRole::Free) => false,
            (RegionRole::Free, _) => true,
            (RegionRole::Eden, RegionRole::Free | RegionRole::Old) => true,
            (RegionRole::Survivor, RegionRole::Free | RegionRole::Old) => true,
            (RegionRole::Old, RegionRole::Free) => true,
            (RegionRole::Humongous, RegionRole::Free) => true,
            (RegionRole::Eden | RegionRole::Survivor | RegionRole::Old | RegionRole::Humongous, _) => {
                false
            }
        }
    }
}

/// A fixed-size contiguous span of the heap, `[start, end)`. Objects are bump-allocated
/// between `start` and `top`, so `[start, top)` is always linearly parsable.
pub struct Region {
    id: RegionId,
    start: Address,
    end: Address,
    role: Atomic<RegionRole>,
    top: AtomicUsize,
    live_bytes: AtomicUsize,
    /// Top at mark start. Objects at or above TAMS were allocated during marking and are
    /// implicitly live for that cycle.
    tams: AtomicUsize,
    epoch: AtomicUsize,
    in_collection_set: AtomicBool,
    max_object_bytes: AtomicUsize,
    /// Index + 1 of the start region, for humongous continuation regions.
    humongous_start: AtomicUsize,
    pub(crate) remset: RemSet,
}

impl Region {
    pub(crate) fn new(id: RegionId, start: Address, bytes: usize, remset: RemSet) -> Self {
        Region {
            id,
            start,
            end: start + bytes,
            role: Atomic::new(RegionRole::Free),
            top: AtomicUsize::new(start.as_usize()),
            live_bytes: AtomicUsize::new(0),
            tams: AtomicUsize::new(start.as_usize()),
            epoch: AtomicUsize::new(0),
            in_collection_set: AtomicBool::new(false),
            max_object_bytes: AtomicUsize::new(0),
            humongous_start: AtomicUsize::new(0),
            remset,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn capacity(&self) -> usize {
        self.end - self.start
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end
    }

    pub fn role(&self) -> RegionRole {
        self.role.load(Ordering::Acquire)
    }

    /// Only the region space changes roles, so it can keep its per-role counters in sync.
    pub(super) fn set_role(&self, role: RegionRole) -> RegionRole {
        let old = self.role.swap(role, Ordering::AcqRel);
        debug_assert!(
            old.can_transition_to(role),
            "{}: illegal role transition {} -> {}",
            self.id,
            old,
            role
        );
        old
    }

    pub fn top(&self) -> Address {
        Address::from_usize(self.top.load(Ordering::Acquire))
    }

    /// Publish a new top. Everything below it must be fully initialized.
    pub fn set_top(&self, top: Address) {
        assert!(
            top >= self.start && top <= self.end,
            "{}: top {} outside [{}, {}]",
            self.id,
            top,
            self.start,
            self.end
        );
        self.top.store(top.as_usize(), Ordering::Release);
    }

    pub fn used_bytes(&self) -> usize {
        self.top() - self.start
    }

    /// Thread-safe bump allocation, used by parallel GC workers copying into a shared
    /// destination region.
    pub fn allocate_par(&self, bytes: usize) -> Option<Address> {
        let mut old = self.top.load(Ordering::Relaxed);
        loop {
            let new = old + bytes;
            if new > self.end.as_usize() {
                return None;
            }
            match self
                .top
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.note_object(bytes);
                    return Some(Address::from_usize(old));
                }
                Err(current) => old = current,
            }
        }
    }

    /// Record the size of an object placed in this region.
    pub fn note_object(&self, bytes: usize) {
        self.max_object_bytes.fetch_max(bytes, Ordering::Relaxed);
    }

    /// The largest object ever placed in this region since it was claimed.
    pub fn max_object_bytes(&self) -> usize {
        self.max_object_bytes.load(Ordering::Relaxed)
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub fn set_live_bytes(&self, bytes: usize) {
        self.live_bytes.store(bytes, Ordering::Relaxed)
    }

    pub fn add_live_bytes(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Live bytes over capacity.
    pub fn live_ratio(&self) -> f64 {
        self.live_bytes() as f64 / self.capacity() as f64
    }

    pub fn tams(&self) -> Address {
        Address::from_usize(self.tams.load(Ordering::Acquire))
    }

    pub fn set_tams(&self, tams: Address) {
        debug_assert!(tams >= self.start && tams <= self.end);
        self.tams.store(tams.as_usize(), Ordering::Release)
    }

    pub fn epoch(&self) -> usize {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn in_collection_set(&self) -> bool {
        self.in_collection_set.load(Ordering::Relaxed)
    }

    pub(crate) fn set_in_collection_set(&self, value: bool) {
        self.in_collection_set.store(value, Ordering::Relaxed)
    }

    /// For a humongous continuation region, the region holding the object header.
    pub fn humongous_start(&self) -> Option<RegionId> {
        match self.humongous_start.load(Ordering::Relaxed) {
            0 => None,
            n => Some(RegionId(n - 1)),
        }
    }

    pub fn is_humongous_start(&self) -> bool {
        self.role() == RegionRole::Humongous && self.humongous_start().is_none()
    }

    /// Prepare a Free region for its new role. Called with the free-list lock held.
    pub(super) fn claim(&self, role: RegionRole, humongous_start: Option<RegionId>) {
        debug_assert_eq!(self.role(), RegionRole::Free);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.top.store(self.start.as_usize(), Ordering::Relaxed);
        self.tams.store(self.start.as_usize(), Ordering::Relaxed);
        self.live_bytes.store(0, Ordering::Relaxed);
        self.max_object_bytes.store(0, Ordering::Relaxed);
        self.humongous_start
            .store(humongous_start.map_or(0, |r| r.0 + 1), Ordering::Relaxed);
    }

    /// Zero the used part of the region and its liveness metadata.
    pub(super) fn reset(&self, memory: &HeapMemory) {
        memory.zero(self.start..self.top());
        self.top.store(self.start.as_usize(), Ordering::Release);
        self.tams.store(self.start.as_usize(), Ordering::Relaxed);
        self.live_bytes.store(0, Ordering::Relaxed);
        self.max_object_bytes.store(0, Ordering::Relaxed);
        self.humongous_start.store(0, Ordering::Relaxed);
        self.in_collection_set.store(false, Ordering::Relaxed);
        self.remset.clear();
    }

    /// Worst-case number of bytes an evacuation destination loses to fragmentation per region
    /// when the largest copied object is `max_object_bytes`.
    pub fn usable_bytes_for_copy(capacity: usize, max_object_bytes: usize) -> usize {
        capacity - max_object_bytes.saturating_sub(BYTES_IN_WORD).min(capacity / 2)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{} {}..{} top={} live={} rs={}]",
            self.id,
            self.role(),
            self.start,
            self.end,
            self.top(),
            self.live_bytes(),
            self.remset.size()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const REGION: usize = 4 * BYTES_IN_KBYTE;

    fn region() -> Region {
        Region::new(
            RegionId::from_index(0),
            HEAP_START,
            REGION,
            RemSet::new(HEAP_START, REGION),
        )
    }

    #[test]
    fn role_transitions() {
        use RegionRole::*;
        assert!(Free.can_transition_to(Eden));
        assert!(Free.can_transition_to(Humongous));
        assert!(!Free.can_transition_to(Free));
        assert!(Eden.can_transition_to(Old));
        assert!(!Eden.can_transition_to(Survivor));
        assert!(!Old.can_transition_to(Eden));
        assert!(!Humongous.can_transition_to(Old));
        for role in RegionRole::iter().filter(|r| *r != Free) {
            assert!(role.can_transition_to(Free), "{} cannot be freed", role);
        }
    }

    #[test]
    fn allocate_par_respects_capacity() {
        let r = region();
        r.claim(RegionRole::Survivor, None);
        r.set_role(RegionRole::Survivor);
        assert_eq!(r.allocate_par(REGION / 2), Some(HEAP_START));
        assert_eq!(r.allocate_par(REGION / 2), Some(HEAP_START + REGION / 2));
        assert_eq!(r.allocate_par(8), None);
        assert_eq!(r.top(), r.end());
        assert_eq!(r.max_object_bytes(), REGION / 2);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn top_never_exceeds_capacity() {
        let r = region();
        r.set_top(r.end() + 8);
    }

    #[test]
    fn claim_bumps_epoch() {
        let r = region();
        let before = r.epoch();
        r.claim(RegionRole::Eden, None);
        assert_eq!(r.epoch(), before + 1);
    }

    #[test]
    fn usable_bytes() {
        assert_eq!(Region::usable_bytes_for_copy(REGION, 0), REGION);
        assert_eq!(Region::usable_bytes_for_copy(REGION, 64), REGION - 56);
        assert_eq!(Region::usable_bytes_for_copy(REGION, REGION), REGION / 2);
    }
}
