//! Collection algorithms.
//!
//! Every pause evacuates a [`CollectionSet`](collection_set::CollectionSet):
//! * a young pause ([`young`]) collects all Eden and Survivor regions,
//! * a mixed pause ([`mixed`]) adds the old regions with the least live data, chosen from the
//!   liveness snapshot of the last [`concurrent`] marking cycle,
//! * a full collection ([`full`]) marks the whole heap and compacts what it can. It is the
//!   fallback when anything else fails.

pub mod barriers;
pub mod collection_set;
pub mod concurrent;
pub mod evacuate;
pub mod full;
pub mod mixed;
pub mod mutator;
pub mod predictor;
pub mod roots;
pub mod verify;
pub mod young;

pub use self::mutator::Mutator;

use std::fmt;

/// The kind of a stop-the-world evacuation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum GcKind {
    Young,
    Mixed,
    Full,
}

/// The kind of a completed pause, as reported in statistics.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum PauseKind {
    Young,
    /// A young pause that also performed the initial mark of a concurrent cycle.
    YoungConcurrentStart,
    Mixed,
    Remark,
    Full,
}

/// Why a collection was requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum GcCause {
    /// A mutator could not get a new Eden region.
    AllocationFailure,
    /// A young collection did not free enough space for the retried allocation.
    AllocationFailureFull,
    /// Old occupancy crossed a threshold outside a pause (after humongous allocation).
    OccupancyThreshold,
    /// Start a concurrent marking cycle now.
    ConcurrentStart,
    /// The runtime asked for a collection.
    UserRequest,
}

impl GcCause {
    pub fn requires_full(self) -> bool {
        match self {
            GcCause::AllocationFailureFull | GcCause::UserRequest => true,
            GcCause::AllocationFailure | GcCause::OccupancyThreshold | GcCause::ConcurrentStart => {
                false
            }
        }
    }

    /// Causes that several mutators may hit at once. Only one of them needs to collect.
    pub fn is_allocation(self) -> bool {
        matches!(
            self,
            GcCause::AllocationFailure | GcCause::AllocationFailureFull
        )
    }
}

/// A collection could not complete as requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectionError {
    /// Not enough Free regions to reserve the worst-case evacuation space. Detected before
    /// anything is copied.
    PromotionFailure {
        required_regions: usize,
        free_regions: usize,
    },
    /// Old occupancy became critical before concurrent marking completed.
    ConcurrentModeFailure,
    /// A full collection could not free any region.
    CollectionFailed,
}

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CollectionError::PromotionFailure {
                required_regions,
                free_regions,
            } => write!(
                f,
                "promotion failure: evacuation needs {} regions, {} are free",
                required_regions, free_regions
            ),
            CollectionError::ConcurrentModeFailure => {
                write!(f, "concurrent mode failure: old occupancy became critical during marking")
            }
            CollectionError::CollectionFailed => {
                write!(f, "collection failed: no space could be reclaimed")
            }
        }
    }
}

impl std::error::Error for CollectionError {}
