use crate::util::VMMutatorThread;
use crate::vm::RootSlot;

/// Root enumeration. The runtime knows where its threads keep object references and which
/// static fields hold them; the collector only asks for the slots.
///
/// Both methods are called inside a stop-the-world pause, while every mutator is parked at a
/// poll point or blocked. The returned slots may contain duplicates and nulls.
pub trait Scanning: Send + Sync {
    /// The root slots in the stack frames of one mutator thread.
    fn stack_roots(&self, tls: VMMutatorThread) -> Vec<RootSlot>;

    /// Static and global root slots that belong to no particular thread.
    fn global_roots(&self) -> Vec<RootSlot>;
}
