//! Root slots: the locations outside the heap through which a runtime holds object references.

use crate::util::ObjectReference;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A root slot, such as a local variable in a stack frame or a static field.
///
/// A `RootSlot` value *points to* a slot: clones share the same cell, so the collector can
/// update a root after it moves the referent and the runtime sees the new reference through its
/// own handle. The slot holds either nothing or a reference to an object header.
#[derive(Clone, Default)]
pub struct RootSlot {
    cell: Arc<AtomicUsize>,
}

impl RootSlot {
    pub fn new(object: Option<ObjectReference>) -> Self {
        Self {
            cell: Arc::new(AtomicUsize::new(ObjectReference::to_word(object))),
        }
    }

    pub fn load(&self) -> Option<ObjectReference> {
        ObjectReference::from_word(self.cell.load(Ordering::Acquire))
    }

    pub fn store(&self, object: Option<ObjectReference>) {
        self.cell
            .store(ObjectReference::to_word(object), Ordering::Release)
    }

    /// Do the two handles point to the same slot?
    pub fn same_slot(&self, other: &RootSlot) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for RootSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.load() {
            Some(object) => write!(f, "RootSlot({})", object),
            None => write!(f, "RootSlot(null)"),
        }
    }
}
