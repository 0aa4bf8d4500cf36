// Not every test uses every fixture.
#![allow(dead_code)]

use atomic_refcell::{AtomicRef, AtomicRefCell, AtomicRefMut};
use std::sync::Arc;

use crate::g1::{G1Builder, G1};
use crate::memory_manager;
use crate::plan::Mutator;
use crate::util::constants::BYTES_IN_KBYTE;
use crate::util::test_util::mock_vm::MockVM;
use crate::util::{ObjectReference, VMMutatorThread};
use crate::vm::{RootSlot, TypeDescriptor, TypeId};

/// 32 bytes: the header, one reference and one data word.
pub const LINK: TypeDescriptor = TypeDescriptor::new("Link", 1, 1);
/// 40 bytes: two references and one data word.
pub const NODE: TypeDescriptor = TypeDescriptor::new("Node", 2, 1);
/// Larger than half of an 8 KiB region.
pub const BIG: TypeDescriptor = TypeDescriptor::new("Big", 1, 1200);

pub const REGION_SIZE: usize = 8 * BYTES_IN_KBYTE;

/// Options for tests: 64 regions of 8 KiB, two GC workers, and marking driven by the mutator
/// at poll points, so tests control when marking makes progress.
pub fn test_builder() -> G1Builder {
    let mut builder = G1Builder::new_no_env();
    builder.options.region_size = REGION_SIZE;
    builder.options.heap_size = 64 * REGION_SIZE;
    builder.options.threads = 2;
    builder.options.concurrent_threads = 0;
    builder.options.eden_regions = 4;
    builder.options.verify_heap = true;
    builder
}

/// A collector with the test types registered.
pub struct G1Fixture {
    pub g1: Arc<G1<MockVM>>,
    pub link: TypeId,
    pub node: TypeId,
    pub big: TypeId,
}

impl G1Fixture {
    pub fn create() -> Self {
        Self::create_with_builder(|_| {})
    }

    pub fn create_with_builder<F>(with_builder: F) -> Self
    where
        F: FnOnce(&mut G1Builder),
    {
        let mut builder = test_builder();
        with_builder(&mut builder);
        let g1 = memory_manager::g1_init(&builder, MockVM::default());
        G1Fixture {
            link: memory_manager::register_type(&g1, LINK),
            node: memory_manager::register_type(&g1, NODE),
            big: memory_manager::register_type(&g1, BIG),
            g1,
        }
    }

    pub fn vm(&self) -> &MockVM {
        self.g1.binding()
    }
}

/// A collector with one bound mutator.
pub struct MutatorFixture {
    pub g1: G1Fixture,
    pub tls: VMMutatorThread,
    mutator: AtomicRefCell<Box<Mutator<MockVM>>>,
}

impl MutatorFixture {
    pub fn create() -> Self {
        Self::create_with_builder(|_| {})
    }

    pub fn create_with_builder<F>(with_builder: F) -> Self
    where
        F: FnOnce(&mut G1Builder),
    {
        let g1 = G1Fixture::create_with_builder(with_builder);
        let tls = VMMutatorThread(1);
        let mutator = memory_manager::bind_mutator(&g1.g1, tls);
        MutatorFixture {
            g1,
            tls,
            mutator: AtomicRefCell::new(mutator),
        }
    }

    pub fn g1(&self) -> &Arc<G1<MockVM>> {
        &self.g1.g1
    }

    pub fn vm(&self) -> &MockVM {
        self.g1.vm()
    }

    pub fn mutator(&self) -> AtomicRefMut<'_, Box<Mutator<MockVM>>> {
        self.mutator.borrow_mut()
    }

    pub fn mutator_ref(&self) -> AtomicRef<'_, Box<Mutator<MockVM>>> {
        self.mutator.borrow()
    }

    /// Allocate an object and keep it alive in a new stack root.
    pub fn alloc_rooted(&self, ty: TypeId) -> RootSlot {
        let object = self.alloc(ty);
        self.vm().push_root(self.tls, Some(object))
    }

    /// Allocate an object that nothing refers to.
    pub fn alloc(&self, ty: TypeId) -> ObjectReference {
        match memory_manager::alloc(&mut self.mutator(), ty) {
            Ok(object) => object,
            Err(e) => panic!("allocation of {} failed: {}", ty, e),
        }
    }

    pub fn read_word(&self, slot: &RootSlot) -> usize {
        self.mutator_ref().read_word(slot.load().unwrap(), 0)
    }

    pub fn write_word(&self, slot: &RootSlot, value: usize) {
        self.mutator_ref().write_word(slot.load().unwrap(), 0, value)
    }
}
