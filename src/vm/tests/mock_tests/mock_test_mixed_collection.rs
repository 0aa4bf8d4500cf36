use super::mock_test_prelude::*;

/// Fill eight Old regions, let three quarters of their objects die, and run a marking cycle.
/// The following pause must be a mixed pause that evacuates old regions without losing
/// survivors.
#[test]
pub fn mixed_pause_after_marking() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.tenuring_threshold = 0;
    });
    let link = fixture.g1.link;
    let tls = fixture.tls;

    let mut all = vec![];
    for i in 0..2048 {
        let slot = fixture.alloc_rooted(link);
        fixture.write_word(&slot, i);
        all.push((i, slot));
    }
    // Promote the last Eden objects too.
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    let old_before = fixture.g1().space().role_count(RegionRole::Old);
    assert!(old_before >= 8, "{} old regions", old_before);

    // Three quarters of every old region dies.
    fixture.vm().clear_stack(tls);
    let kept: Vec<_> = all
        .into_iter()
        .filter(|(i, _)| i % 4 == 0)
        .map(|(i, slot)| (i, fixture.vm().push_root(tls, slot.load())))
        .collect();

    memory_manager::start_concurrent_cycle(&mut fixture.mutator()).unwrap();
    assert!(fixture.g1().marker().is_active());
    assert!(memory_manager::complete_concurrent_cycle(&mut fixture.mutator()));
    assert!(!fixture.g1().marker().is_active());

    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.concurrent_cycles, 1);
    assert_eq!(stats.remark_count, 1);
    assert!(fixture.g1().mixed_candidates() > 0);

    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.last_pause_kind, Some(PauseKind::Mixed));
    assert_eq!(stats.mixed_count, 1);
    assert_eq!(stats.full_count, 0);

    for (i, slot) in kept.iter() {
        assert_eq!(fixture.read_word(slot), *i);
    }
}

/// Without a marking cycle there is nothing for a mixed pause to do.
#[test]
pub fn no_candidates_without_marking() {
    let fixture = MutatorFixture::create();
    for _ in 0..1000 {
        fixture.alloc(fixture.g1.link);
    }
    assert_eq!(fixture.g1().mixed_candidates(), 0);
    fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
    assert_eq!(
        memory_manager::heap_statistics(fixture.g1()).last_pause_kind,
        Some(PauseKind::Young)
    );
}
