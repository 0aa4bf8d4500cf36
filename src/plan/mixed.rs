//! The mixed collector: young pauses that also evacuate the old regions with the least live
//! data, as measured by the last concurrent marking cycle.

use super::collection_set::CollectionSet;
use super::concurrent::LivenessSnapshot;
use super::evacuate::EvacuationStats;
use super::predictor::PauseTimePredictor;
use super::roots::RootScanner;
use super::young::YoungCollector;
use super::CollectionError;
use crate::policy::region::{RegionId, RegionRole, RegionSpace};
use crate::scheduler::{SafepointToken, WorkerGroup};
use crate::util::statistics::as_millis_f64;
use crate::vm::Scanning;
use crossbeam::channel::Receiver;
use itertools::Itertools;
use std::time::Instant;

#[derive(Copy, Clone, Debug)]
struct Candidate {
    id: RegionId,
    /// Epoch of the region when the snapshot was taken.
    epoch: usize,
}

/// How many old regions one mixed pause should evacuate.
///
/// At least enough to get through `initial` candidates in `count_target` pauses, at most a
/// tenth of the heap, and otherwise as many as the pause time budget allows.
pub fn old_regions_for_pause(
    initial: usize,
    remaining: usize,
    count_target: usize,
    heap_regions: usize,
    budget: Option<usize>,
) -> usize {
    let min_old = initial.div_ceil(count_target.max(1));
    let max_old = (heap_regions / 10).max(1).max(min_old);
    budget
        .unwrap_or(min_old)
        .clamp(min_old, max_old)
        .min(remaining)
}

/// Old regions waiting to be evacuated by mixed pauses, cheapest first.
pub struct MixedCollector {
    live_threshold_percent: f64,
    count_target: usize,
    heap_waste_percent: f64,
    candidates: Vec<Candidate>,
    initial_count: usize,
}

impl MixedCollector {
    pub fn new(live_threshold_percent: f64, count_target: usize, heap_waste_percent: f64) -> Self {
        Self {
            live_threshold_percent,
            count_target,
            heap_waste_percent,
            candidates: vec![],
            initial_count: 0,
        }
    }

    /// Take the latest snapshot published by the marker, if any.
    pub fn receive(&mut self, space: &RegionSpace, snapshots: &Receiver<LivenessSnapshot>) {
        if let Some(snapshot) = snapshots.try_iter().last() {
            self.install(space, &snapshot);
        }
    }

    /// Replace the candidates with the Old regions of `snapshot` whose live ratio is at most
    /// the threshold. The region table must already hold the live bytes of the snapshot.
    pub fn install(&mut self, space: &RegionSpace, snapshot: &LivenessSnapshot) {
        let threshold = self.live_threshold_percent / 100.0;
        self.candidates = snapshot
            .iter()
            .filter(|(id, _)| snapshot.is_current(space, *id))
            .map(|(id, _)| space.region(id))
            .filter(|r| r.role() == RegionRole::Old && r.live_bytes() > 0)
            .filter(|r| r.live_ratio() <= threshold)
            .map(|r| {
                (
                    r.live_ratio(),
                    Candidate {
                        id: r.id(),
                        epoch: r.epoch(),
                    },
                )
            })
            .sorted_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)))
            .map(|(_, c)| c)
            .collect();
        self.initial_count = self.candidates.len();
        debug!(
            "{} mixed candidates from cycle {}: {:?}",
            self.initial_count,
            snapshot.cycle(),
            self.candidates()
        );
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    pub fn candidates(&self) -> Vec<RegionId> {
        self.candidates.iter().map(|c| c.id).collect()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.initial_count = 0;
    }

    /// Bytes the remaining candidates would free.
    pub fn reclaimable_bytes(&self, space: &RegionSpace) -> usize {
        self.candidates
            .iter()
            .map(|c| space.region(c.id))
            .map(|r| r.used_bytes().saturating_sub(r.live_bytes()))
            .sum()
    }

    /// Choose the old regions of the next mixed pause and remove them from the candidates.
    ///
    /// `budget` is the number of regions the pause time budget allows, if known. `fits` tells
    /// whether a choice can be evacuated with the free space left; regions are dropped from the
    /// end of the choice until it does. Ends the mixed phase, returning nothing, once the
    /// candidates would free less than the tolerated heap waste.
    pub fn select<F>(
        &mut self,
        space: &RegionSpace,
        budget: Option<usize>,
        fits: F,
    ) -> Vec<RegionId>
    where
        F: Fn(&[RegionId]) -> bool,
    {
        self.candidates.retain(|c| {
            let region = space.region(c.id);
            region.role() == RegionRole::Old && region.epoch() == c.epoch
        });
        let heap_bytes = space.region_count() * space.bytes_in_region();
        let waste_limit = (heap_bytes as f64 * self.heap_waste_percent / 100.0) as usize;
        let reclaimable = self.reclaimable_bytes(space);
        if reclaimable < waste_limit {
            if self.has_candidates() {
                debug!(
                    "Mixed phase ends: {} reclaimable bytes left in {} candidates",
                    reclaimable,
                    self.candidates.len()
                );
            }
            self.clear();
            return vec![];
        }

        let count = old_regions_for_pause(
            self.initial_count,
            self.candidates.len(),
            self.count_target,
            space.region_count(),
            budget,
        );
        let mut chosen: Vec<RegionId> = self.candidates[..count].iter().map(|c| c.id).collect();
        while !chosen.is_empty() && !fits(&chosen) {
            chosen.pop();
        }
        self.candidates.drain(..chosen.len());
        chosen
    }

    /// Run a mixed pause: a young pause that also evacuates the next batch of candidates.
    #[allow(clippy::too_many_arguments)]
    pub fn collect<S: Scanning>(
        &mut self,
        token: &SafepointToken,
        space: &RegionSpace,
        workers: &WorkerGroup,
        scanner: &RootScanner<'_, S>,
        young: &YoungCollector,
        predictor: &PauseTimePredictor,
        tenuring_threshold: u8,
    ) -> Result<EvacuationStats, CollectionError> {
        let start = Instant::now();
        let young_regions = CollectionSet::young(space);
        let budget =
            predictor.old_regions_within_budget(space, young_regions.regions(), &self.candidates());
        let free = space.free_regions();
        let old = self.select(space, budget, |chosen| {
            CollectionSet::mixed(space, chosen).required_regions(space) <= free
        });
        let predicted = predictor.predict(space, &[young_regions.regions(), &old].concat());
        let stats = young.collect(token, space, workers, scanner, &old, tenuring_threshold)?;

        let elapsed = as_millis_f64(start.elapsed());
        if predictor.has_measurements() && elapsed > predictor.pause_time_goal() {
            warn!(
                "Mixed pause took {:.3}ms, over the {:.0}ms target (predicted {:.3}ms for {} old regions)",
                elapsed,
                predictor.pause_time_goal(),
                predicted,
                old.len()
            );
        }
        Ok(stats)
    }
}
