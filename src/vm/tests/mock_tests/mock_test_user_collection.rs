use super::mock_test_prelude::*;

#[test]
pub fn user_request_runs_a_full_collection() {
    let fixture = MutatorFixture::create();
    let young = fixture.alloc_rooted(fixture.g1.node);
    for _ in 0..100 {
        fixture.alloc(fixture.g1.node);
    }
    assert!(memory_manager::handle_user_collection_request(
        &mut fixture.mutator()
    ));
    let stats = memory_manager::heap_statistics(fixture.g1());
    assert_eq!(stats.full_count, 1);
    assert_eq!(stats.last_pause_kind, Some(PauseKind::Full));
    // A requested full collection is not a fallback.
    assert_eq!(stats.last_full_fallback, None);
    // Nothing young survives a full collection.
    assert_eq!(stats.regions_by_role[RegionRole::Eden], 0);
    assert_eq!(stats.regions_by_role[RegionRole::Survivor], 0);
    assert_eq!(
        fixture
            .g1()
            .space()
            .region_of_object(young.load().unwrap())
            .role(),
        RegionRole::Old
    );
}

#[test]
pub fn user_request_ignored() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.ignore_system_gc = true;
    });
    fixture.alloc(fixture.g1.link);
    assert!(!memory_manager::handle_user_collection_request(
        &mut fixture.mutator()
    ));
    assert_eq!(memory_manager::heap_statistics(fixture.g1()).gc_count, 0);
}

#[test]
pub fn options_from_strings() {
    let mut builder = test_builder();
    assert!(builder.set_option("ignore_system_gc", "true"));
    assert!(!builder.set_option("tenuring_threshold", "16"));
    let fixture = MutatorFixture::create_with_builder(|b| *b = builder);
    assert!(!memory_manager::handle_user_collection_request(
        &mut fixture.mutator()
    ));
}
