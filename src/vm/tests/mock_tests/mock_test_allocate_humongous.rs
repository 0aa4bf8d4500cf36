use super::mock_test_prelude::*;

#[test]
pub fn humongous_object_gets_its_own_regions() {
    let fixture = MutatorFixture::create();
    let slot = fixture.alloc_rooted(fixture.g1.big);
    let object = slot.load().unwrap();
    let space = fixture.g1().space();
    let region = space.region_of_object(object);
    assert!(BIG.size_in_bytes() > space.humongous_threshold());
    assert!(region.is_humongous_start());
    assert_eq!(region.start(), object.to_raw_address());
    assert_eq!(space.humongous_regions(region.id()).len(), 2);
    assert_eq!(space.role_count(RegionRole::Humongous), 2);
    assert_eq!(space.role_count(RegionRole::Eden), 0);
}

/// Humongous objects are never copied. A young object they refer to is found through the
/// remembered set, and the reference is updated when it moves.
#[test]
pub fn humongous_object_is_not_moved() {
    let fixture = MutatorFixture::create();
    let big = fixture.alloc_rooted(fixture.g1.big);
    let object = big.load().unwrap();
    let child = fixture.alloc(fixture.g1.link);
    fixture.mutator_ref().write_word(child, 0, 5);
    fixture.mutator().write_ref(object, 0, Some(child));

    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    assert_eq!(big.load(), Some(object));
    let moved = fixture.mutator_ref().read_ref(object, 0).unwrap();
    assert_ne!(moved, child);
    assert_eq!(
        fixture.g1().space().region_of_object(moved).role(),
        RegionRole::Survivor
    );
    assert_eq!(fixture.mutator_ref().read_word(moved, 0), 5);

    assert!(memory_manager::handle_user_collection_request(
        &mut fixture.mutator()
    ));
    assert_eq!(big.load(), Some(object));
    let moved = fixture.mutator_ref().read_ref(object, 0).unwrap();
    assert_eq!(fixture.mutator_ref().read_word(moved, 0), 5);
}

#[test]
pub fn unreachable_humongous_object_is_reclaimed_by_full_collection() {
    let fixture = MutatorFixture::create();
    let object = fixture.alloc(fixture.g1.big);
    let space = fixture.g1().space();
    let start = space.region_of_object(object).id();
    let regions = space.humongous_regions(start);

    assert!(memory_manager::handle_user_collection_request(
        &mut fixture.mutator()
    ));
    for id in regions {
        assert_eq!(space.region(id).role(), RegionRole::Free);
    }
    assert_eq!(space.role_count(RegionRole::Humongous), 0);
}

#[test]
pub fn unreachable_humongous_object_is_reclaimed_by_marking() {
    let fixture = MutatorFixture::create();
    let object = fixture.alloc(fixture.g1.big);
    let space = fixture.g1().space();
    let start = space.region_of_object(object).id();

    memory_manager::start_concurrent_cycle(&mut fixture.mutator()).unwrap();
    assert!(memory_manager::complete_concurrent_cycle(
        &mut fixture.mutator()
    ));
    assert_eq!(space.region(start).role(), RegionRole::Free);
    assert_eq!(space.role_count(RegionRole::Humongous), 0);
}
