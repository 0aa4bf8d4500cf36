//! Runtime-to-collector interface: safe Rust APIs.
//!
//! This module provides a safe Rust API for g1gc. We expect an embedding runtime to wrap
//! these functions in whatever calling convention it needs.
//!
//! A runtime builds one collector instance with [`g1_init`], gets a [`Mutator`] for each of its
//! threads with [`bind_mutator`], and allocates, writes references and polls through the
//! mutator. Every function here that takes a `&mut Mutator` must be called from the thread that
//! owns it.

use crate::g1::{G1Builder, G1};
use crate::plan::{CollectionError, GcCause, Mutator};
use crate::util::alloc::AllocationError;
use crate::util::statistics::HeapStatistics;
use crate::util::{Address, ObjectReference, VMMutatorThread};
use crate::vm::{TypeDescriptor, TypeId, VMBinding};
use std::sync::Arc;

/// Initialize a collector instance from the options in `builder`.
///
/// This also tries to install the built-in `env_logger` (with the `builtin_env_logger`
/// feature). If the runtime has already set up a `log` backend, the failure is logged at debug
/// level and ignored.
///
/// Arguments:
/// * `builder`: The builder holding the options.
/// * `binding`: The runtime's root scanning and callback implementation.
pub fn g1_init<VM: VMBinding>(builder: &G1Builder, binding: VM) -> Arc<G1<VM>> {
    builder.build(binding)
}

/// Register a type. Objects of the returned type id have the layout of `descriptor`.
pub fn register_type<VM: VMBinding>(g1: &G1<VM>, descriptor: TypeDescriptor) -> TypeId {
    g1.register_type(descriptor)
}

/// Request a collector context for a new mutator thread. The thread is registered with the
/// safepoint coordinator until the mutator is destroyed.
///
/// Arguments:
/// * `g1`: The collector instance.
/// * `tls`: The runtime's identifier of the thread, passed back when its stack is scanned.
pub fn bind_mutator<VM: VMBinding>(g1: &Arc<G1<VM>>, tls: VMMutatorThread) -> Box<Mutator<VM>> {
    let mutator = Box::new(Mutator::new(g1.clone(), tls));
    debug!("Bound {}", tls);
    mutator
}

/// Report to the collector that a mutator is no longer needed. Its pending SATB entries are
/// handed to the marker and the thread is no longer waited for at safepoints.
pub fn destroy_mutator<VM: VMBinding>(mutator: Box<Mutator<VM>>) {
    debug!("Destroy {}", mutator.tls());
    drop(mutator);
}

/// Hand the mutator's thread-local buffers to the collector.
pub fn flush_mutator<VM: VMBinding>(mutator: &mut Mutator<VM>) {
    mutator.flush()
}

/// Allocate an object of type `ty`.
///
/// If the mutator cannot get a new Eden region, this runs a young (or mixed) collection and
/// retries, then a full collection and retries. If that fails too, the runtime is told through
/// [`crate::vm::Collection::out_of_memory`] and `HeapExhausted` is returned. All reference
/// fields of the new object are null and all data words are zero.
///
/// Arguments:
/// * `mutator`: The mutator to perform this allocation request.
/// * `ty`: The type of the object, as returned by [`register_type`].
pub fn alloc<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    ty: TypeId,
) -> Result<ObjectReference, AllocationError> {
    if let Ok(object) = mutator.alloc(ty) {
        return Ok(object);
    }
    for cause in [GcCause::AllocationFailure, GcCause::AllocationFailureFull] {
        if let Err(e) = mutator.collect(cause) {
            debug!("{} collection for {} failed: {}", cause, mutator.tls(), e);
        }
        if let Ok(object) = mutator.alloc(ty) {
            return Ok(object);
        }
    }
    let err = AllocationError::HeapExhausted;
    let g1 = mutator.g1().clone();
    error!(
        "{} cannot allocate {} bytes of {}: {}",
        mutator.tls(),
        g1.type_descriptor(ty).size_in_bytes(),
        g1.type_descriptor(ty).name,
        err
    );
    g1.binding().out_of_memory(mutator.tls(), err);
    Err(err)
}

/// Store `value` into the reference slot `slot` of an object, applying the pre-write (SATB)
/// and post-write (remembered set) barriers.
///
/// Arguments:
/// * `mutator`: The mutator for the current thread.
/// * `slot`: The address of a reference field, as from [`crate::vm::ObjectModel::ref_slot`].
/// * `value`: The new value, or `None` to clear the field.
pub fn object_reference_write<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    slot: Address,
    value: Option<ObjectReference>,
) {
    mutator.object_reference_write(slot, value)
}

/// A poll point. The runtime calls this regularly, for example on loop back-edges and
/// method entries. The thread parks here while a pause runs.
pub fn poll<VM: VMBinding>(mutator: &mut Mutator<VM>) {
    mutator.poll()
}

/// The thread is about to block (in native code, or waiting for a lock). Pauses may run
/// without it until [`leave_blocked`]. It must not touch the heap in between.
pub fn enter_blocked<VM: VMBinding>(mutator: &mut Mutator<VM>) {
    mutator.enter_blocked()
}

/// The thread returns from a blocking call. Waits if a pause is running.
pub fn leave_blocked<VM: VMBinding>(mutator: &mut Mutator<VM>) {
    mutator.leave_blocked()
}

/// The runtime asks for a garbage collection, such as `System.gc()`. This runs a full
/// collection unless the `ignore_system_gc` option is set.
///
/// Returns `true` if a collection ran.
pub fn handle_user_collection_request<VM: VMBinding>(mutator: &mut Mutator<VM>) -> bool {
    if mutator.g1().options().ignore_system_gc {
        info!("User collection request ignored");
        return false;
    }
    if let Err(e) = mutator.collect(GcCause::UserRequest) {
        warn!("User requested collection failed: {}", e);
    }
    true
}

/// Start a concurrent marking cycle now, with a young pause.
pub fn start_concurrent_cycle<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
) -> Result<(), CollectionError> {
    mutator.collect(GcCause::ConcurrentStart)
}

/// Finish the active concurrent marking cycle with a remark pause. Returns `false` if no cycle
/// was active.
pub fn complete_concurrent_cycle<VM: VMBinding>(mutator: &mut Mutator<VM>) -> bool {
    mutator.complete_concurrent_cycle()
}

/// A snapshot of the heap and collection counters.
pub fn heap_statistics<VM: VMBinding>(g1: &G1<VM>) -> HeapStatistics {
    g1.heap_statistics()
}

/// Number of regions in the heap.
pub fn total_regions<VM: VMBinding>(g1: &G1<VM>) -> usize {
    g1.space().region_count()
}

/// Is `addr` inside the managed heap?
pub fn is_in_heap<VM: VMBinding>(g1: &G1<VM>, addr: Address) -> bool {
    g1.space().contains(addr)
}
