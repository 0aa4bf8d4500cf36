//! Stop-the-world coordination: bringing mutators to a safepoint, and running the parallel
//! phases of a pause on GC workers.

mod safepoint;
mod worker;

pub use self::safepoint::{SafepointCoordinator, SafepointToken, ThreadState};
pub use self::worker::{GCWorker, WorkerGroup};
