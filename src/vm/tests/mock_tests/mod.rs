// Scenario tests against `MockVM`. Each test builds its own collector through the fixtures in
// `crate::util::test_util::fixtures`, so tests in one process do not share a heap.
//
// Mock tests should have the prefix 'mock_test_' in their file name.

// Common includes for mock tests.
pub(crate) mod mock_test_prelude {
    pub use crate::memory_manager;
    pub use crate::plan::{GcCause, PauseKind};
    pub use crate::policy::region::RegionRole;
    pub use crate::util::test_util::fixtures::*;
    pub use crate::util::test_util::mock_method::*;
    pub use crate::util::test_util::mock_vm::*;
    pub use crate::util::{ObjectReference, VMMutatorThread};
    pub use crate::vm::*;
}

mod mock_test_allocate_humongous;
mod mock_test_concurrent_mode_failure;
mod mock_test_heap_exhausted;
mod mock_test_mixed_collection;
mod mock_test_promotion;
mod mock_test_random_graph;
mod mock_test_safepoint;
mod mock_test_satb;
mod mock_test_user_collection;
mod mock_test_young_collection;
