use crate::util::Address;

/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 3;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
/// log2 of the number of bits in a word
pub const LOG_BITS_IN_WORD: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_WORD as usize;
/// The number of bits in a word
pub const BITS_IN_WORD: usize = 1 << LOG_BITS_IN_WORD;

// The object header packs a 32-bit size and two 16-bit counts into one word.
static_assertions::const_assert_eq!(std::mem::size_of::<usize>(), BYTES_IN_WORD);

/// The smallest region size accepted by the options.
pub const MIN_BYTES_IN_REGION: usize = 4 * BYTES_IN_KBYTE;
/// The largest region size accepted by the options.
pub const MAX_BYTES_IN_REGION: usize = 32 * BYTES_IN_MBYTE;

/// The address of the first region. Every valid region size divides it, so the first
/// region (and therefore every region) is naturally aligned to its size.
pub const HEAP_START: Address = Address::from_usize(0x1000_0000);
static_assertions::const_assert!(HEAP_START.as_usize() % MAX_BYTES_IN_REGION == 0);

/// Number of header words in front of every object (status word and type word).
pub const HEADER_WORDS: usize = 2;
/// The smallest object, a header with no fields.
pub const MIN_OBJECT_SIZE: usize = HEADER_WORDS * BYTES_IN_WORD;

/// Survivor ages saturate at this value.
pub const MAX_AGE: u8 = 15;

/// The default heap size
pub const DEFAULT_HEAP_SIZE: usize = 64 * BYTES_IN_MBYTE;
/// The default region size
pub const DEFAULT_REGION_SIZE: usize = BYTES_IN_MBYTE;
