use super::mock_method::*;
use crate::util::alloc::AllocationError;
use crate::util::{ObjectReference, VMMutatorThread};
use crate::vm::{Collection, RootSlot, Scanning};
use std::collections::HashMap;
use std::sync::Mutex;

/// A runtime for tests. Each mutator thread has a stack of root slots that tests push and pop
/// explicitly, and there is one list of global roots.
pub struct MockVM {
    stacks: Mutex<HashMap<VMMutatorThread, Vec<RootSlot>>>,
    globals: Mutex<Vec<RootSlot>>,
    pub out_of_memory: MockMethod<(VMMutatorThread, AllocationError), ()>,
}

impl Default for MockVM {
    fn default() -> Self {
        Self {
            stacks: Mutex::default(),
            globals: Mutex::default(),
            out_of_memory: MockMethod::new_default(),
        }
    }
}

impl MockVM {
    /// Push a new root slot holding `object` on the stack of `tls`. The returned handle shares
    /// the slot, so it sees the object's new address after a collection moves it.
    pub fn push_root(&self, tls: VMMutatorThread, object: Option<ObjectReference>) -> RootSlot {
        let slot = RootSlot::new(object);
        self.stacks
            .lock()
            .unwrap()
            .entry(tls)
            .or_default()
            .push(slot.clone());
        slot
    }

    /// Remove a slot from the stack of `tls`.
    pub fn remove_root(&self, tls: VMMutatorThread, slot: &RootSlot) {
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(&tls) {
            stack.retain(|s| !s.same_slot(slot));
        }
    }

    pub fn clear_stack(&self, tls: VMMutatorThread) {
        self.stacks.lock().unwrap().remove(&tls);
    }

    pub fn add_global(&self, object: Option<ObjectReference>) -> RootSlot {
        let slot = RootSlot::new(object);
        self.globals.lock().unwrap().push(slot.clone());
        slot
    }
}

impl Scanning for MockVM {
    fn stack_roots(&self, tls: VMMutatorThread) -> Vec<RootSlot> {
        self.stacks
            .lock()
            .unwrap()
            .get(&tls)
            .cloned()
            .unwrap_or_default()
    }

    fn global_roots(&self) -> Vec<RootSlot> {
        self.globals.lock().unwrap().clone()
    }
}

impl Collection for MockVM {
    fn out_of_memory(&self, tls: VMMutatorThread, err: AllocationError) {
        self.out_of_memory.call((tls, err))
    }
}
