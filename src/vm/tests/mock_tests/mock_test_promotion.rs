use super::mock_test_prelude::*;

/// With the default tenuring threshold of 15, an object stays in Survivor regions for 15 young
/// pauses and is promoted to an Old region by the 16th.
#[test]
pub fn promoted_after_tenuring_threshold() {
    let fixture = MutatorFixture::create();
    assert_eq!(fixture.g1().options().tenuring_threshold, 15);
    let slot = fixture.alloc_rooted(fixture.g1.link);
    fixture.write_word(&slot, 7);

    let role = || {
        fixture
            .g1()
            .space()
            .region_of_object(slot.load().unwrap())
            .role()
    };
    assert_eq!(role(), RegionRole::Eden);
    for pause in 1..=15 {
        fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
        assert_eq!(role(), RegionRole::Survivor, "after young pause {}", pause);
    }
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    assert_eq!(role(), RegionRole::Old);
    assert_eq!(fixture.read_word(&slot), 7);
    assert_eq!(
        memory_manager::heap_statistics(fixture.g1()).young_count,
        16
    );
}

/// A tenuring threshold of zero promotes every survivor of the first young pause.
#[test]
pub fn tenuring_threshold_zero() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.tenuring_threshold = 0;
    });
    let slot = fixture.alloc_rooted(fixture.g1.node);
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    let object = slot.load().unwrap();
    assert_eq!(
        fixture.g1().space().region_of_object(object).role(),
        RegionRole::Old
    );
    assert_eq!(fixture.g1().space().role_count(RegionRole::Survivor), 0);
}
