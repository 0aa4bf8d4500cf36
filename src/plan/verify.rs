//! A heap verifier for tests and debugging. Expensive: it parses every region.

use super::roots::RootScanner;
use crate::policy::region::{RegionRole, RegionSpace};
use crate::scheduler::SafepointToken;
use crate::util::{object_forwarding, Address, ObjectReference};
use crate::vm::{ObjectModel, Scanning};
use std::collections::HashSet;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyStats {
    pub reachable_objects: usize,
    pub references: usize,
}

/// Walk the heap from the roots and panic on the first broken invariant:
/// * every region's `top` is within the region,
/// * every reference points at an object header in a non-Free region, below its `top`,
/// * no reachable object is forwarded,
/// * every reference from an Old or Humongous object into another region is remembered by the
///   target region.
pub fn verify_heap<S: Scanning>(
    _token: &SafepointToken,
    space: &RegionSpace,
    scanner: &RootScanner<'_, S>,
) -> VerifyStats {
    space.check_invariants();
    let memory = space.memory();

    let mut headers: HashSet<Address> = HashSet::new();
    for region in space.regions() {
        space.for_each_object(region.id(), |object| {
            headers.insert(object.to_raw_address());
        });
    }

    let check = |object: ObjectReference, from: &dyn std::fmt::Display| {
        let addr = object.to_raw_address();
        let Some(region) = space.region_of(addr) else {
            panic!("{} refers to {} outside the heap", from, object);
        };
        assert!(
            region.role() != RegionRole::Free,
            "{} refers to {} in free region {:?}",
            from,
            object,
            region
        );
        assert!(
            addr < region.top(),
            "{} refers to {} above top of {:?}",
            from,
            object,
            region
        );
        assert!(
            headers.contains(&addr),
            "{} refers to {}, which is not an object header",
            from,
            object
        );
        assert!(
            !object_forwarding::is_forwarded_or_being_forwarded(memory, object),
            "{} refers to forwarded object {}",
            from,
            object
        );
    };

    let mut stats = VerifyStats::default();
    let mut visited: HashSet<ObjectReference> = HashSet::new();
    let mut worklist: Vec<ObjectReference> = vec![];
    for (i, root) in scanner.external_roots().enumerate() {
        if let Some(object) = root.load() {
            check(object, &format_args!("root #{}", i));
            stats.references += 1;
            if visited.insert(object) {
                worklist.push(object);
            }
        }
    }
    while let Some(object) = worklist.pop() {
        stats.reachable_objects += 1;
        let source = space.region_of_object(object);
        ObjectModel::for_each_ref_slot(memory, object, |slot| {
            let Some(target) = ObjectModel::load_ref(memory, slot) else {
                return;
            };
            check(target, &format_args!("slot {} of {}", slot, object));
            stats.references += 1;
            if source.role().is_old() && !source.contains(target.to_raw_address()) {
                let target_region = space.region_of_object(target);
                assert!(
                    target_region.remset.contains(slot),
                    "slot {} of {} refers to {} but is not remembered by {:?}",
                    slot,
                    object,
                    target,
                    target_region
                );
            }
            if visited.insert(target) {
                worklist.push(target);
            }
        });
    }
    debug!("Verified heap: {:?}", stats);
    stats
}
