use crate::util::alloc::AllocationError;
use crate::util::VMMutatorThread;

/// Hooks the collector calls back into the runtime.
pub trait Collection: Send + Sync {
    /// Delegate to the runtime an out-of-memory condition. The allocation that caused it
    /// fails with `err` after this returns.
    ///
    /// The default implementation panics.
    fn out_of_memory(&self, tls: VMMutatorThread, err: AllocationError) {
        let _ = tls;
        panic!("Out of memory with {:?}!", err);
    }
}
