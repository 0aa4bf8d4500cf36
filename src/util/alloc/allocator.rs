use std::fmt;

/// The reason an allocation did not produce an object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationError {
    /// The allocation buffer is exhausted and no Eden region can be claimed right now.
    /// Recoverable: the runtime collects and retries (see [`crate::memory_manager::alloc`]).
    AllocationFailure,
    /// Collections, including a full collection, did not free enough space. Fatal to the
    /// requesting call; the runtime reports an out-of-memory condition.
    HeapExhausted,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::AllocationFailure => write!(f, "allocation failure"),
            AllocationError::HeapExhausted => write!(f, "heap exhausted"),
        }
    }
}

impl std::error::Error for AllocationError {}
