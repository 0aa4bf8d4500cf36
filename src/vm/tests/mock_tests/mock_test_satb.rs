use super::mock_test_prelude::*;

fn single_worker_fixture() -> MutatorFixture {
    MutatorFixture::create_with_builder(|builder| {
        builder.options.tenuring_threshold = 0;
        builder.options.threads = 1;
    })
}

/// An object unlinked while marking runs was reachable when the cycle started, so the cycle
/// counts it live. The next cycle finds it dead.
#[test]
pub fn object_unlinked_during_marking_survives_the_cycle() {
    let fixture = single_worker_fixture();
    let link = fixture.g1.link;
    let a = fixture.alloc_rooted(link);
    let b = fixture.alloc(link);
    fixture
        .mutator()
        .write_ref(a.load().unwrap(), 0, Some(b));
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();

    let space = fixture.g1().space();
    let a_obj = a.load().unwrap();
    let b_obj = fixture.mutator_ref().read_ref(a_obj, 0).unwrap();
    let region = space.region_of_object(a_obj);
    assert_eq!(region.role(), RegionRole::Old);
    assert_eq!(region.id(), space.region_of_object(b_obj).id());

    memory_manager::start_concurrent_cycle(&mut fixture.mutator()).unwrap();
    assert!(fixture.g1().marker().is_marking());
    fixture.mutator().write_ref(a_obj, 0, None);
    assert!(memory_manager::complete_concurrent_cycle(
        &mut fixture.mutator()
    ));
    assert_eq!(region.live_bytes(), 2 * LINK.size_in_bytes());

    memory_manager::start_concurrent_cycle(&mut fixture.mutator()).unwrap();
    assert!(memory_manager::complete_concurrent_cycle(
        &mut fixture.mutator()
    ));
    assert_eq!(region.live_bytes(), LINK.size_in_bytes());
    assert_eq!(
        memory_manager::heap_statistics(fixture.g1()).concurrent_cycles,
        2
    );
}

/// Objects allocated while marking runs are live for the cycle, whether they are still young
/// or were promoted above the top-at-mark-start.
#[test]
pub fn objects_allocated_during_marking_are_live() {
    let fixture = single_worker_fixture();
    let link = fixture.g1.link;
    let anchor = fixture.alloc_rooted(link);
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();

    memory_manager::start_concurrent_cycle(&mut fixture.mutator()).unwrap();
    let fresh = fixture.alloc_rooted(link);
    fixture.write_word(&fresh, 99);
    // Promoted above TAMS while the cycle is active.
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    assert!(fixture.g1().marker().is_active());
    fixture
        .mutator()
        .write_ref(anchor.load().unwrap(), 0, fresh.load());
    fixture.vm().remove_root(fixture.tls, &fresh);
    assert!(memory_manager::complete_concurrent_cycle(
        &mut fixture.mutator()
    ));

    let anchor = anchor.load().unwrap();
    let fresh = fixture.mutator_ref().read_ref(anchor, 0).unwrap();
    assert_eq!(fixture.mutator_ref().read_word(fresh, 0), 99);
    fixture.g1().verify_heap(Some(fixture.tls));
}
