use super::barriers::{Barrier, G1Barrier};
use super::GcCause;
use crate::g1::G1;
use crate::policy::region::RegionRole;
use crate::util::alloc::{AllocationBuffer, AllocationError};
use crate::util::{Address, ObjectReference, VMMutatorThread};
use crate::vm::{ObjectModel, TypeId, VMBinding};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Objects a mutator traces at a poll point when no background marking thread runs.
const MUTATOR_MARK_STEP: usize = 256;

/// A mutator: the per-thread allocation context and write barrier of one runtime thread.
///
/// A mutator is owned by its thread. It is registered with the safepoint coordinator when
/// created and unregistered when dropped. Pauses never touch a mutator directly: a parked
/// mutator revalidates its allocation buffer when it resumes.
pub struct Mutator<VM: VMBinding> {
    tls: VMMutatorThread,
    g1: Arc<G1<VM>>,
    buffer: AllocationBuffer,
    barrier: G1Barrier,
}

impl<VM: VMBinding> Mutator<VM> {
    pub fn new(g1: Arc<G1<VM>>, tls: VMMutatorThread) -> Self {
        g1.safepoint.register(tls);
        let barrier = G1Barrier::new(
            g1.marker.clone(),
            g1.space.clone(),
            g1.options.satb_buffer_size,
        );
        Mutator {
            tls,
            g1,
            buffer: AllocationBuffer::new(),
            barrier,
        }
    }

    pub fn tls(&self) -> VMMutatorThread {
        self.tls
    }

    pub fn g1(&self) -> &Arc<G1<VM>> {
        &self.g1
    }

    pub fn barrier(&self) -> &G1Barrier {
        &self.barrier
    }

    /// Allocate an object of the given type without collecting. Objects larger than the
    /// humongous threshold get regions of their own. Fails with `AllocationFailure` when no
    /// region can be claimed.
    pub fn alloc(&mut self, ty: TypeId) -> Result<ObjectReference, AllocationError> {
        let descriptor = self.g1.types.get(ty);
        let bytes = descriptor.size_in_bytes();
        if bytes > self.g1.space.humongous_threshold() {
            let addr = self.alloc_humongous(bytes)?;
            return Ok(ObjectModel::initialize(
                self.g1.space.memory(),
                addr,
                ty,
                &descriptor,
            ));
        }
        let addr = match self.buffer.alloc(bytes) {
            Some(addr) => addr,
            None => self.alloc_slow(bytes)?,
        };
        let space = &self.g1.space;
        let object = ObjectModel::initialize(space.memory(), addr, ty, &descriptor);
        if let Some(id) = self.buffer.region() {
            // Publish the new top so heap parsing sees the object.
            let region = space.region(id);
            region.note_object(bytes);
            region.set_top(self.buffer.cursor());
        }
        Ok(object)
    }

    /// Bind the buffer to a fresh Eden region and allocate from it.
    #[cold]
    fn alloc_slow(&mut self, bytes: usize) -> Result<Address, AllocationError> {
        let space = &self.g1.space;
        let id = space
            .allocate_region_bounded(RegionRole::Eden, self.g1.eden_budget())
            .map_err(|e| {
                trace!("{}: no Eden region ({})", self.tls, e);
                AllocationError::AllocationFailure
            })?;
        let region = space.region(id);
        trace!("{} allocates in {:?}", self.tls, region);
        self.buffer
            .rebind(id, region.epoch(), region.start(), region.end());
        self.buffer
            .alloc(bytes)
            .ok_or(AllocationError::AllocationFailure)
    }

    #[cold]
    fn alloc_humongous(&mut self, bytes: usize) -> Result<Address, AllocationError> {
        let space = &self.g1.space;
        let id = space.allocate_humongous(bytes).map_err(|e| {
            debug!("{}: humongous allocation of {} bytes failed ({})", self.tls, bytes, e);
            AllocationError::AllocationFailure
        })?;
        self.g1.check_occupancy();
        Ok(space.region(id).start())
    }

    /// Load a reference field.
    pub fn read_ref(&self, object: ObjectReference, field: usize) -> Option<ObjectReference> {
        ObjectModel::load_ref(self.g1.space.memory(), ObjectModel::ref_slot(object, field))
    }

    /// Store into a reference field, with both barriers.
    pub fn write_ref(
        &mut self,
        object: ObjectReference,
        field: usize,
        value: Option<ObjectReference>,
    ) {
        self.object_reference_write(ObjectModel::ref_slot(object, field), value)
    }

    /// Store into a reference slot, with both barriers.
    pub fn object_reference_write(&mut self, slot: Address, value: Option<ObjectReference>) {
        let memory = self.g1.space.memory();
        let old = ObjectModel::load_ref(memory, slot);
        self.barrier.pre_write_barrier(slot, old);
        ObjectModel::store_ref(memory, slot, value);
        self.barrier.post_write_barrier(slot, value);
    }

    pub fn read_word(&self, object: ObjectReference, index: usize) -> usize {
        let memory = self.g1.space.memory();
        memory.load(ObjectModel::data_slot(memory, object, index), Ordering::Relaxed)
    }

    pub fn write_word(&self, object: ObjectReference, index: usize, value: usize) {
        let memory = self.g1.space.memory();
        memory.store(
            ObjectModel::data_slot(memory, object, index),
            value,
            Ordering::Relaxed,
        )
    }

    /// A poll point. Parks the thread if a pause is requested, runs pending collections, and
    /// advances concurrent marking when there are no background marking threads.
    pub fn poll(&mut self) {
        if self.g1.safepoint.is_requested() {
            self.barrier.flush();
            if self.g1.safepoint.poll(self.tls) {
                self.revalidate();
            }
        }
        if let Some(cause) = self.g1.take_pending_collection() {
            if let Err(e) = self.collect(cause) {
                warn!("{}: requested {} collection failed: {}", self.tls, cause, e);
            }
        }
        let marker = &self.g1.marker;
        if marker.remark_ready() {
            self.barrier.flush();
            self.g1.remark(Some(self.tls), false);
            self.revalidate();
        } else if self.g1.options.concurrent_threads == 0 && marker.is_marking() {
            self.barrier.flush();
            marker.step(&self.g1.space, &self.g1.safepoint, MUTATOR_MARK_STEP);
        }
    }

    /// Run a collection on this thread.
    pub fn collect(&mut self, cause: GcCause) -> Result<(), super::CollectionError> {
        self.barrier.flush();
        let result = self.g1.collect(Some(self.tls), cause);
        self.revalidate();
        result
    }

    /// Finish the active marking cycle on this thread.
    pub fn complete_concurrent_cycle(&mut self) -> bool {
        self.barrier.flush();
        let completed = self.g1.complete_concurrent_cycle(Some(self.tls));
        self.revalidate();
        completed
    }

    /// Flush the SATB buffer to the marker.
    pub fn flush(&mut self) {
        self.barrier.flush();
    }

    /// The thread is about to block outside the collector's control, for instance in native
    /// code. Its stack must stay unchanged until [`Mutator::leave_blocked`].
    pub fn enter_blocked(&mut self) {
        self.barrier.flush();
        self.g1.safepoint.enter_blocked(self.tls);
    }

    pub fn leave_blocked(&mut self) {
        self.g1.safepoint.leave_blocked(self.tls);
        self.revalidate();
    }

    /// Drop the allocation buffer if a pause took its region away.
    fn revalidate(&mut self) {
        let Some(id) = self.buffer.region() else {
            return;
        };
        let region = self.g1.space.region(id);
        if region.role() != RegionRole::Eden || region.epoch() != self.buffer.epoch() {
            self.buffer.reset();
        }
    }
}

impl<VM: VMBinding> Drop for Mutator<VM> {
    fn drop(&mut self) {
        self.barrier.flush();
        self.g1.safepoint.unregister(self.tls);
    }
}
