use crate::util::memory::HeapMemory;
use crate::util::{Address, ObjectReference};
use crate::vm::ObjectModel;
use crossbeam::utils::Backoff;
use std::sync::atomic::Ordering;

const FORWARDING_NOT_TRIGGERED_YET: u8 = 0b00;
const BEING_FORWARDED: u8 = 0b10;
const FORWARDED: u8 = 0b11;
const FORWARDING_MASK: usize = 0b11;

const FORWARDING_POINTER_MASK: usize = !0b111;

/// The collector-visible state of an object header during copying.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkState {
    /// Not yet reached in this pause.
    Unmarked,
    /// Claimed by a GC worker; the copy is in progress.
    Marked,
    /// Copied; the status word holds the forwarding pointer.
    Forwarded,
}

impl MarkState {
    fn from_bits(forwarding_bits: u8) -> Self {
        match forwarding_bits {
            FORWARDING_NOT_TRIGGERED_YET => MarkState::Unmarked,
            BEING_FORWARDED => MarkState::Marked,
            FORWARDED => MarkState::Forwarded,
            _ => panic!("Invalid/Corrupted forwarding bits {:b}", forwarding_bits),
        }
    }
}

fn status_word(memory: &HeapMemory, object: ObjectReference) -> usize {
    memory.load(ObjectModel::status_word_address(object), Ordering::Acquire)
}

fn forwarding_bits(status: usize) -> u8 {
    (status & FORWARDING_MASK) as u8
}

/// Attempt to become the worker thread who will forward the object.
/// The successful worker will set the object forwarding bits to BEING_FORWARDED, preventing
/// other workers from forwarding the same object. The age bits of the status word are preserved.
///
/// Returns the forwarding bits observed before the attempt. `FORWARDING_NOT_TRIGGERED_YET`
/// means the caller won and must copy the object and call [`forward_object`].
pub fn attempt_to_forward(memory: &HeapMemory, object: ObjectReference) -> u8 {
    let addr = ObjectModel::status_word_address(object);
    loop {
        let old_value = memory.load(addr, Ordering::Relaxed);
        let bits = forwarding_bits(old_value);
        if bits != FORWARDING_NOT_TRIGGERED_YET
            || memory
                .compare_exchange(
                    addr,
                    old_value,
                    old_value | BEING_FORWARDED as usize,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok()
        {
            return bits;
        }
    }
}

/// Spin-wait for the object's forwarding to become complete and then read the forwarding pointer to the new object.
///
/// # Arguments:
///
/// * `object`: the forwarded/being_forwarded object.
/// * `forwarding_bits`: the last state of the forwarding bits before calling this function.
///
/// Returns a reference to the new object.
pub fn spin_and_get_forwarded_object(
    memory: &HeapMemory,
    object: ObjectReference,
    forwarding_bits_seen: u8,
) -> ObjectReference {
    let backoff = Backoff::new();
    let mut bits = forwarding_bits_seen;
    while bits == BEING_FORWARDED {
        backoff.snooze();
        bits = get_forwarding_status(memory, object);
    }
    assert_eq!(
        bits, FORWARDED,
        "Invalid/Corrupted forwarding word {:x} for object {}",
        bits, object
    );
    read_forwarding_pointer(memory, object)
}

/// Publish the forwarding pointer of an object that this thread claimed with
/// [`attempt_to_forward`]. The copy at `new_object` must be complete: the release store makes
/// it visible to every thread that later reads the forwarding pointer.
pub fn forward_object(memory: &HeapMemory, object: ObjectReference, new_object: ObjectReference) {
    debug_assert!(state_is_being_forwarded(get_forwarding_status(memory, object)));
    let new_addr = new_object.to_raw_address().as_usize();
    debug_assert_eq!(new_addr & !FORWARDING_POINTER_MASK, 0);
    memory.store(
        ObjectModel::status_word_address(object),
        new_addr | FORWARDED as usize,
        Ordering::Release,
    );
}

/// Return the forwarding bits for a given `ObjectReference`.
pub fn get_forwarding_status(memory: &HeapMemory, object: ObjectReference) -> u8 {
    forwarding_bits(status_word(memory, object))
}

pub fn mark_state(memory: &HeapMemory, object: ObjectReference) -> MarkState {
    MarkState::from_bits(get_forwarding_status(memory, object))
}

pub fn is_forwarded(memory: &HeapMemory, object: ObjectReference) -> bool {
    get_forwarding_status(memory, object) == FORWARDED
}

pub fn is_forwarded_or_being_forwarded(memory: &HeapMemory, object: ObjectReference) -> bool {
    get_forwarding_status(memory, object) != FORWARDING_NOT_TRIGGERED_YET
}

pub fn state_is_forwarded_or_being_forwarded(forwarding_bits: u8) -> bool {
    forwarding_bits != FORWARDING_NOT_TRIGGERED_YET
}

pub fn state_is_being_forwarded(forwarding_bits: u8) -> bool {
    forwarding_bits == BEING_FORWARDED
}

/// Read the forwarding pointer of an object.
/// This function is called on forwarded objects.
pub fn read_forwarding_pointer(memory: &HeapMemory, object: ObjectReference) -> ObjectReference {
    let status = status_word(memory, object);
    debug_assert_eq!(
        forwarding_bits(status),
        FORWARDED,
        "read_forwarding_pointer called for object {:?} that has not been forwarded!",
        object,
    );
    match ObjectReference::from_raw_address(Address::from_usize(status & FORWARDING_POINTER_MASK))
    {
        Some(new_object) => new_object,
        None => panic!("object {} has a null forwarding pointer", object),
    }
}
