//! g1gc is a region-based, generational, mostly-concurrent garbage collector.
//!
//! The heap is split into fixed-size regions. New objects are bump-allocated into Eden regions;
//! young pauses evacuate the live ones into Survivor and Old regions. When old occupancy crosses
//! a threshold, a concurrent marking cycle computes the liveness of every old region under a
//! snapshot-at-the-beginning barrier, and the following mixed pauses evacuate the old regions
//! with the least live data first. A full, stop-the-world collection is the fallback when
//! evacuation runs out of space or marking falls behind.
//!
//! A runtime ("binding") plugs in by implementing [`vm::VMBinding`], then uses the functions in
//! [`memory_manager`]:
//!
//! 1. [`memory_manager::g1_init`] creates a collector from a [`G1Builder`],
//! 2. [`memory_manager::bind_mutator`] registers each thread that allocates,
//! 3. [`memory_manager::alloc`] and [`memory_manager::object_reference_write`] allocate and
//!    write references through the barriers,
//! 4. [`memory_manager::poll`] is called at safepoint polls.

extern crate static_assertions;

#[cfg(test)]
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod g1;
pub use g1::{G1Builder, G1};

pub mod memory_manager;
pub mod plan;
pub mod policy;
pub mod scheduler;
pub mod util;
pub mod vm;

pub use crate::plan::{CollectionError, GcCause, Mutator, PauseKind};
pub use crate::util::alloc::AllocationError;
pub use crate::util::options::Options;
pub use crate::util::statistics::HeapStatistics;
