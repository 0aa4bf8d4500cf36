use super::mock_test_prelude::*;
use crate::util::alloc::AllocationError;

/// Keep every object alive until the heap is full. The allocation that cannot be satisfied
/// after a young and a full collection fails with `HeapExhausted` and calls
/// `Collection::out_of_memory` once.
#[test]
pub fn allocate_until_heap_exhausted() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.heap_size = 16 * REGION_SIZE;
    });
    let link = fixture.g1.link;
    let capacity = 16 * REGION_SIZE / LINK.size_in_bytes();

    let mut allocated = 0;
    let err = loop {
        assert!(allocated <= capacity, "allocated more than fits in the heap");
        let result = memory_manager::alloc(&mut fixture.mutator(), link);
        match result {
            Ok(object) => {
                fixture.vm().push_root(fixture.tls, Some(object));
                allocated += 1;
            }
            Err(e) => break e,
        }
    };
    assert_eq!(err, AllocationError::HeapExhausted);
    assert!(allocated > capacity / 2);
    assert_eq!(fixture.vm().out_of_memory.call_count(), 1);
    assert!(memory_manager::heap_statistics(fixture.g1()).full_count >= 1);
}

/// A humongous object larger than the whole heap fails at once.
#[test]
pub fn humongous_larger_than_heap() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.heap_size = 2 * REGION_SIZE;
    });
    let huge = memory_manager::register_type(
        fixture.g1(),
        TypeDescriptor::new("Huge", 0, 3 * REGION_SIZE / 8),
    );
    let result = memory_manager::alloc(&mut fixture.mutator(), huge);
    assert_eq!(result, Err(AllocationError::HeapExhausted));
    assert!(fixture.vm().out_of_memory.is_called());
}
