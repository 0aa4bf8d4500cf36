use crate::util::constants::*;
use crate::util::memory::HeapMemory;
use crate::util::{Address, ObjectReference};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::Ordering;

/// Index of a type in the [`TypeTable`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TypeId(u16);

impl TypeId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Immutable class metadata. The collector only needs to know how many reference fields an
/// object has and how big it is. Reference fields always come first, followed by plain data
/// words that the collector copies but never interprets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub ref_fields: usize,
    pub data_words: usize,
}

impl TypeDescriptor {
    pub const fn new(name: &'static str, ref_fields: usize, data_words: usize) -> Self {
        Self {
            name,
            ref_fields,
            data_words,
        }
    }

    pub const fn size_in_words(&self) -> usize {
        HEADER_WORDS + self.ref_fields + self.data_words
    }

    pub const fn size_in_bytes(&self) -> usize {
        self.size_in_words() << LOG_BYTES_IN_WORD
    }
}

/// Append-only registry of type descriptors, shared by all mutators.
#[derive(Default)]
pub struct TypeTable {
    types: spin::RwLock<Vec<TypeDescriptor>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and return its id. Panics if the descriptor cannot be encoded in an
    /// object header.
    pub fn register(&self, descriptor: TypeDescriptor) -> TypeId {
        assert!(
            descriptor.ref_fields <= u16::MAX as usize,
            "{} has too many reference fields ({})",
            descriptor.name,
            descriptor.ref_fields
        );
        assert!(
            descriptor.size_in_words() <= u32::MAX as usize,
            "{} is too large ({} words)",
            descriptor.name,
            descriptor.size_in_words()
        );
        let mut types = self.types.write();
        assert!(types.len() <= u16::MAX as usize, "type table is full");
        let id = TypeId(types.len() as u16);
        types.push(descriptor);
        id
    }

    pub fn get(&self, id: TypeId) -> TypeDescriptor {
        match self.types.read().get(id.as_usize()) {
            Some(descriptor) => *descriptor,
            None => panic!("{} is not registered", id),
        }
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const TYPE_ID_MASK: usize = 0xffff;
const REF_COUNT_SHIFT: usize = 16;
const REF_COUNT_MASK: usize = 0xffff;
const SIZE_SHIFT: usize = 32;

const AGE_SHIFT: usize = 3;
const AGE_MASK: usize = 0xf << AGE_SHIFT;

/// Object layout.
///
/// ```text
/// word 0: status word  [ forwarding bits 0-1 | age 3-6 ], or forwarding pointer | 0b11
/// word 1: type word    [ type id 0-15 | ref field count 16-31 | size in words 32-63 ]
/// word 2..: reference fields, then data words
/// ```
///
/// The type word carries everything needed to scan or copy an object, so collector threads
/// never consult the [`TypeTable`].
pub struct ObjectModel;

impl ObjectModel {
    pub fn status_word_address(object: ObjectReference) -> Address {
        object.to_raw_address()
    }

    fn type_word_address(object: ObjectReference) -> Address {
        object.to_raw_address() + BYTES_IN_WORD
    }

    fn encode_type_word(type_id: TypeId, descriptor: &TypeDescriptor) -> usize {
        type_id.as_usize()
            | (descriptor.ref_fields << REF_COUNT_SHIFT)
            | (descriptor.size_in_words() << SIZE_SHIFT)
    }

    /// Write the header of a fresh object at `addr`. The fields must already be zero.
    pub fn initialize(
        memory: &HeapMemory,
        addr: Address,
        type_id: TypeId,
        descriptor: &TypeDescriptor,
    ) -> ObjectReference {
        let object = match ObjectReference::from_raw_address(addr) {
            Some(object) => object,
            None => panic!("cannot place an object at the zero address"),
        };
        debug_assert!(
            memory.is_zeroed(addr + MIN_OBJECT_SIZE..addr + descriptor.size_in_bytes()),
            "fields of new object {} are not zeroed",
            object
        );
        memory.store(Self::status_word_address(object), 0, Ordering::Relaxed);
        memory.store(
            Self::type_word_address(object),
            Self::encode_type_word(type_id, descriptor),
            Ordering::Relaxed,
        );
        object
    }

    fn type_word(memory: &HeapMemory, object: ObjectReference) -> usize {
        memory.load(Self::type_word_address(object), Ordering::Relaxed)
    }

    pub fn type_id(memory: &HeapMemory, object: ObjectReference) -> TypeId {
        TypeId((Self::type_word(memory, object) & TYPE_ID_MASK) as u16)
    }

    pub fn ref_count(memory: &HeapMemory, object: ObjectReference) -> usize {
        (Self::type_word(memory, object) >> REF_COUNT_SHIFT) & REF_COUNT_MASK
    }

    pub fn size_in_words(memory: &HeapMemory, object: ObjectReference) -> usize {
        Self::type_word(memory, object) >> SIZE_SHIFT
    }

    pub fn size_in_bytes(memory: &HeapMemory, object: ObjectReference) -> usize {
        Self::size_in_words(memory, object) << LOG_BYTES_IN_WORD
    }

    /// The address of the `index`-th reference field.
    pub fn ref_slot(object: ObjectReference, index: usize) -> Address {
        object.to_raw_address().add_words(HEADER_WORDS + index)
    }

    /// The address of the `index`-th data word.
    pub fn data_slot(memory: &HeapMemory, object: ObjectReference, index: usize) -> Address {
        Self::ref_slot(object, Self::ref_count(memory, object) + index)
    }

    pub fn load_ref(memory: &HeapMemory, slot: Address) -> Option<ObjectReference> {
        ObjectReference::from_word(memory.load(slot, Ordering::Relaxed))
    }

    pub fn store_ref(memory: &HeapMemory, slot: Address, target: Option<ObjectReference>) {
        memory.store(slot, ObjectReference::to_word(target), Ordering::Relaxed)
    }

    /// Visit the address of every reference field of the object.
    pub fn for_each_ref_slot<F: FnMut(Address)>(
        memory: &HeapMemory,
        object: ObjectReference,
        mut f: F,
    ) {
        for i in 0..Self::ref_count(memory, object) {
            f(Self::ref_slot(object, i))
        }
    }

    /// Age bits of a status word.
    pub fn age_of_status(status: usize) -> u8 {
        ((status & AGE_MASK) >> AGE_SHIFT) as u8
    }

    /// A status word for an unforwarded object of the given age.
    pub fn status_with_age(age: u8) -> usize {
        ((age.min(MAX_AGE) as usize) << AGE_SHIFT) & AGE_MASK
    }

    pub fn age(memory: &HeapMemory, object: ObjectReference) -> u8 {
        Self::age_of_status(memory.load(Self::status_word_address(object), Ordering::Relaxed))
    }

    /// Visit every object in a linearly parsable range, such as `[region.start, region.top)`.
    pub fn linear_scan<F: FnMut(ObjectReference)>(
        memory: &HeapMemory,
        range: Range<Address>,
        mut f: F,
    ) {
        let mut cursor = range.start;
        while cursor < range.end {
            let Some(object) = ObjectReference::from_raw_address(cursor) else {
                return;
            };
            let size = Self::size_in_bytes(memory, object);
            assert!(size >= MIN_OBJECT_SIZE, "heap is not parsable at {}", cursor);
            f(object);
            cursor += size;
        }
    }
}
