//! Mutator-side allocation: the thread-local allocation buffer and the allocation error type.

pub(crate) mod allocator;
pub use allocator::AllocationError;

pub(crate) mod bumppointer;
pub use bumppointer::AllocationBuffer;
