//! The young collector: a stop-the-world evacuation of every Eden and Survivor region, plus
//! the old regions a mixed pause adds.

use super::collection_set::CollectionSet;
use super::evacuate::{EvacuationStats, Evacuation, Slot};
use super::roots::RootScanner;
use super::CollectionError;
use crate::policy::region::{RegionId, RegionSpace};
use crate::scheduler::{SafepointToken, WorkerGroup};
use crate::vm::Scanning;
use atomic::{Atomic, Ordering};
use bytemuck::NoUninit;

/// Progress of a young or mixed pause.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, NoUninit, strum_macros::Display)]
pub enum YoungPhase {
    Idle,
    /// The collection set is installed, its destination space reserved and its roots
    /// enumerated.
    RootsScanned,
    Evacuating,
    /// Every survivor has been copied and the collection set reclaimed.
    Complete,
}

pub struct YoungCollector {
    phase: Atomic<YoungPhase>,
}

impl YoungCollector {
    pub fn new() -> Self {
        Self {
            phase: Atomic::new(YoungPhase::Idle),
        }
    }

    pub fn phase(&self) -> YoungPhase {
        self.phase.load(Ordering::Acquire)
    }

    fn transition(&self, from: YoungPhase, to: YoungPhase) {
        let result = self
            .phase
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire);
        if let Err(actual) = result {
            panic!("young collector is {}, expected {} before {}", actual, from, to);
        }
        trace!("Young collector: {} -> {}", from, to);
    }

    /// Evacuate every young region and the old regions in `old`.
    ///
    /// Destination space for the worst case is reserved before any root is scanned. If it
    /// cannot be, nothing is copied and `PromotionFailure` is returned.
    pub fn collect<S: Scanning>(
        &self,
        token: &SafepointToken,
        space: &RegionSpace,
        workers: &WorkerGroup,
        scanner: &RootScanner<'_, S>,
        old: &[RegionId],
        tenuring_threshold: u8,
    ) -> Result<EvacuationStats, CollectionError> {
        let cset = CollectionSet::mixed(space, old);
        let required = cset.required_regions(space);
        let evacuation = Evacuation::prepare(token, space, &cset, required)?;
        let roots: Vec<Slot> = scanner.roots(&cset).collect();
        self.transition(YoungPhase::Idle, YoungPhase::RootsScanned);
        debug!(
            "Collection set: {} young, {} old regions, {} roots, {} regions reserved",
            cset.young_regions(),
            cset.old_regions(),
            roots.len(),
            required
        );

        self.transition(YoungPhase::RootsScanned, YoungPhase::Evacuating);
        let stats = evacuation.run(token, workers, roots, tenuring_threshold, false);
        self.transition(YoungPhase::Evacuating, YoungPhase::Complete);
        self.transition(YoungPhase::Complete, YoungPhase::Idle);
        Ok(stats)
    }
}

impl Default for YoungCollector {
    fn default() -> Self {
        Self::new()
    }
}
