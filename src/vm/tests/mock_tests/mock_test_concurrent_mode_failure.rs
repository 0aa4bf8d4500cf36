use super::mock_test_prelude::*;
use crate::plan::CollectionError;

/// Humongous allocations push old occupancy past the critical level while marking is still
/// running. The next poll point collects, abandons marking and falls back to a full collection.
#[test]
pub fn critical_occupancy_during_marking() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.heap_size = 32 * REGION_SIZE;
        builder.options.initiating_heap_occupancy_percent = 100.0;
        builder.options.critical_occupancy_percent = 20.0;
    });
    let big = fixture.g1.big;
    memory_manager::start_concurrent_cycle(&mut fixture.mutator()).unwrap();
    assert!(fixture.g1().marker().is_marking());

    // Two regions each: four of them are 25% of the heap.
    let objects: Vec<RootSlot> = (0..4).map(|_| fixture.alloc_rooted(big)).collect();
    assert_eq!(fixture.g1().space().role_count(RegionRole::Humongous), 8);
    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.concurrent_mode_failures, 0);
    assert_eq!(stats.full_count, 0);
    assert_eq!(stats.last_full_fallback, None);

    memory_manager::poll(&mut fixture.mutator());

    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.concurrent_mode_failures, 1);
    assert_eq!(stats.full_count, 1);
    assert_eq!(
        stats.last_full_fallback,
        Some(CollectionError::ConcurrentModeFailure)
    );
    assert_eq!(stats.last_pause_kind, Some(PauseKind::Full));
    assert_eq!(stats.concurrent_cycles, 0);
    assert!(!fixture.g1().marker().is_active());
    for slot in objects.iter() {
        let object = slot.load().unwrap();
        assert_eq!(
            fixture.g1().space().region_of_object(object).role(),
            RegionRole::Humongous
        );
    }
}
