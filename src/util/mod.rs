//! Utilities shared by the rest of the collector.

pub mod address;
pub mod alloc;
pub mod constants;
pub mod logger;
pub mod memory;
pub mod object_forwarding;
pub mod options;
pub mod statistics;
pub mod thread;

#[cfg(test)]
pub mod test_util;

pub use self::address::{Address, ByteSize, ObjectReference};
pub use self::thread::VMMutatorThread;
