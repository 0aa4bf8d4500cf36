use super::mock_test_prelude::*;
use crate::util::constants::BYTES_IN_KBYTE;

/// Allocate far more than the Eden budget while keeping every hundredth object alive. The
/// survivors must keep their contents across young pauses, and no full collection may run.
#[test]
pub fn young_pauses_keep_rooted_objects() {
    let fixture = MutatorFixture::create();
    let link = fixture.g1.link;

    let mut roots = vec![];
    for i in 0..5000 {
        if i % 100 == 0 {
            let slot = fixture.alloc_rooted(link);
            fixture.write_word(&slot, i);
            roots.push((i, slot));
        } else {
            fixture.alloc(link);
        }
    }

    let stats = memory_manager::heap_statistics(fixture.g1());
    assert!(stats.young_count >= 1, "{:?}", stats);
    assert_eq!(stats.full_count, 0);
    assert_eq!(stats.gc_count, stats.young_count + stats.mixed_count);
    assert!(stats.regions_by_role[RegionRole::Eden] <= fixture.g1().options().eden_regions);

    for (i, slot) in roots.iter() {
        assert_eq!(fixture.read_word(slot), *i);
        let region = fixture.g1().space().region_of_object(slot.load().unwrap());
        assert!(region.role().is_young() || region.role() == RegionRole::Old);
    }
    fixture.g1().space().check_invariants();
}

/// 2096 bytes: exactly 250 fit in a 128 KiB region.
const RECORD: TypeDescriptor = TypeDescriptor::new("Record", 1, 259);
const RECORD_REGION_SIZE: usize = 128 * BYTES_IN_KBYTE;

/// Four Eden regions of 250 objects each. The 1001st allocation triggers the first young
/// pause. Only the objects still rooted are copied; those whose roots were popped are gone.
#[test]
pub fn young_pause_after_four_full_eden_regions() {
    assert_eq!(RECORD_REGION_SIZE / RECORD.size_in_bytes(), 250);
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.region_size = RECORD_REGION_SIZE;
        builder.options.heap_size = 32 * RECORD_REGION_SIZE;
        builder.options.eden_regions = 4;
    });
    let record = memory_manager::register_type(fixture.g1(), RECORD);

    let mut retained = vec![];
    for i in 0..1000 {
        let slot = fixture.alloc_rooted(record);
        fixture.write_word(&slot, i);
        if i % 10 == 0 {
            retained.push((i, slot));
        } else {
            fixture.vm().remove_root(fixture.tls, &slot);
        }
    }
    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.young_count, 0);
    assert_eq!(stats.regions_by_role[RegionRole::Eden], 4);

    fixture.alloc(record);
    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.young_count, 1, "{:?}", stats);
    assert_eq!(stats.gc_count, 1);
    assert_eq!(stats.regions_by_role[RegionRole::Old], 0);
    // The survivors plus the object allocated after the pause.
    assert_eq!(
        stats.live_bytes_estimate,
        (retained.len() + 1) * RECORD.size_in_bytes()
    );

    let space = fixture.g1().space();
    let mut copied = vec![];
    let mut survivor_bytes = 0;
    for id in space.regions_with_role(RegionRole::Survivor) {
        survivor_bytes += space.region(id).used_bytes();
        space.for_each_object(id, |object| {
            copied.push(fixture.mutator_ref().read_word(object, 0))
        });
    }
    assert_eq!(survivor_bytes, retained.len() * RECORD.size_in_bytes());
    copied.sort();
    let expected: Vec<usize> = retained.iter().map(|(i, _)| *i).collect();
    assert_eq!(copied, expected);
    for (i, slot) in retained.iter() {
        assert_eq!(fixture.read_word(slot), *i);
        assert_eq!(space.region_of_object(slot.load().unwrap()).role(), RegionRole::Survivor);
    }
}

/// A young object reachable only from an old object survives through the remembered set,
/// and the old object's field is updated to the new copy.
#[test]
pub fn old_to_young_reference_is_updated() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.tenuring_threshold = 0;
    });
    let link = fixture.g1.link;
    let parent = fixture.alloc_rooted(link);
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    let old = parent.load().unwrap();
    assert_eq!(
        fixture.g1().space().region_of_object(old).role(),
        RegionRole::Old
    );

    let child = fixture.alloc(link);
    fixture.mutator_ref().write_word(child, 0, 42);
    fixture.mutator().write_ref(old, 0, Some(child));
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();

    let moved = fixture.mutator_ref().read_ref(old, 0).unwrap();
    assert_ne!(moved, child);
    assert_eq!(fixture.mutator_ref().read_word(moved, 0), 42);
    assert_eq!(parent.load(), Some(old));
}

/// Global roots are scanned like stack roots and rewritten when their object moves.
#[test]
pub fn global_roots_are_updated() {
    let fixture = MutatorFixture::create();
    let link = fixture.g1.link;
    let object = fixture.alloc(link);
    fixture.mutator_ref().write_word(object, 0, 7);
    let global = fixture.vm().add_global(Some(object));
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();

    let moved = global.load().unwrap();
    assert_ne!(moved, object);
    assert_eq!(fixture.read_word(&global), 7);
    assert_eq!(
        fixture.g1().space().region_of_object(moved).role(),
        RegionRole::Survivor
    );
}
