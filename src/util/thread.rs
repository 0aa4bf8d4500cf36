use std::fmt;

/// A VMMutatorThread uniquely identifies a mutator thread in the embedding runtime.
/// The runtime picks the value (a thread id, an index into its thread table, ...) and the
/// collector only stores it and passes it back through [`crate::vm::Scanning::stack_roots`] and
/// [`crate::vm::Collection::out_of_memory`], so the runtime knows the context.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct VMMutatorThread(pub usize);

impl fmt::Display for VMMutatorThread {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mutator-{}", self.0)
    }
}
