//! Concurrent marking of Old and Humongous regions.
//!
//! A cycle starts with an initial mark piggybacked on a young pause, traces the heap on
//! background threads (or at mutator poll points) while mutators run, and ends with a short
//! remark pause that drains the SATB buffers and publishes a [`LivenessSnapshot`] to the mixed
//! collector.

mod marker;
mod snapshot;

pub use self::marker::{ConcurrentMarker, MarkingSuspended, SatbBuffer};
pub use self::snapshot::{cleanup, LivenessSnapshot, RegionLiveness};

use bytemuck::NoUninit;

/// The phase of the concurrent marking cycle.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, NoUninit, strum_macros::Display)]
pub enum MarkPhase {
    Idle,
    /// Roots are being scanned inside a young pause.
    InitialMark,
    /// Background tracing, concurrent with mutators.
    ConcurrentMark,
    /// Stop-the-world drain of the remaining work.
    Remark,
    /// Computing live bytes and reclaiming empty regions.
    Cleanup,
}

impl MarkPhase {
    /// A cycle is in progress.
    pub fn is_active(self) -> bool {
        self != MarkPhase::Idle
    }
}

impl Default for MarkPhase {
    fn default() -> Self {
        Self::Idle
    }
}
