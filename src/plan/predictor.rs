use super::evacuate::EvacuationStats;
use super::GcKind;
use crate::policy::region::{RegionId, RegionSpace};
use crate::util::constants::BYTES_IN_WORD;
use crate::util::statistics::as_millis_f64;
use std::time::Duration;

const INITIAL_EDEN_RATIO: f64 = 0.1;
const MIN_EDEN_RATIO: f64 = 0.05;
const MAX_EDEN_RATIO: f64 = 0.40;

/**
 * V(cs) = V_{fixed} + \sum_{r \in cs}{( S*rsSize(r) + C*liveBytes(r) )}
 *
 * - V(cs) is the cost of collecting collection set cs;
 * - V_{fixed} represents fixed costs, common to all pauses;
 * - S is the cost of scanning one remembered-set entry for pointers into the collection set;
 * - rsSize(r) is the number of entries in r's remembered set;
 * - C is the cost per byte of evacuating (and scanning) a live object;
 * - liveBytes(r) is an estimate of the number of live bytes in region r.
 */

// All times are in milliseconds.

pub struct PauseTimePredictor {
    pause_time_goal: f64,
    heap_regions: usize,
    /// Eden size set by the user. Disables the adaptive eden budget.
    fixed_eden_regions: Option<usize>,
    v_fixed: f64,
    s: f64,
    c: f64,
    pub eden_time_per_region: f64,
    eden_ratio: f64,
}

impl PauseTimePredictor {
    pub fn new(pause_time_goal_ms: u32, heap_regions: usize, eden_regions: usize) -> Self {
        Self {
            pause_time_goal: pause_time_goal_ms as f64,
            heap_regions,
            fixed_eden_regions: (eden_regions > 0).then_some(eden_regions),
            v_fixed: 0.0,
            s: 0.0,
            c: 0.0,
            eden_time_per_region: 0.0,
            eden_ratio: INITIAL_EDEN_RATIO,
        }
    }

    pub fn pause_time_goal(&self) -> f64 {
        self.pause_time_goal
    }

    /// Have young or mixed pauses been measured yet?
    pub fn has_measurements(&self) -> bool {
        self.c > 0.0
    }

    /// Feed the measurements of a finished evacuation pause. Full collections are not
    /// evacuation pauses in this model and are ignored.
    pub fn update(&mut self, kind: GcKind, pause: Duration, stats: &EvacuationStats) {
        if kind == GcKind::Full {
            return;
        }
        let pause_time = as_millis_f64(pause);
        let copy_time = as_millis_f64(stats.copy_time);
        let fixed_time = (pause_time - copy_time).max(0.0);

        macro_rules! mix {
            ($a: expr, $b: expr) => {{
                let (a, b) = ($a, $b);
                if a == 0.0 {
                    b
                } else if b == 0.0 {
                    a
                } else {
                    (a + b) / 2.0
                }
            }};
        }
        self.v_fixed = mix!(self.v_fixed, fixed_time);
        if stats.copied_bytes > 0 {
            let c = copy_time / stats.copied_bytes as f64;
            self.c = mix!(self.c, c);
            // Scanning an entry costs about as much as copying one word.
            self.s = mix!(self.s, c * BYTES_IN_WORD as f64);
        }

        if kind == GcKind::Young && stats.young_regions > 0 {
            let eden_time_per_region = copy_time / stats.young_regions as f64;
            self.eden_time_per_region = mix!(self.eden_time_per_region, eden_time_per_region);
            self.adjust_eden_ratio();
        }
        debug!(
            "Predictor: v_fixed={:.3}ms S={:.6}ms C={:.9}ms/byte eden={:.3}ms/region ratio={:.2}",
            self.v_fixed, self.s, self.c, self.eden_time_per_region, self.eden_ratio
        );
    }

    fn adjust_eden_ratio(&mut self) {
        if self.eden_time_per_region == 0.0 || self.heap_regions == 0 {
            return;
        }
        let free = self.pause_time_goal - self.v_fixed;
        let ratio = if free <= 0.0 {
            MIN_EDEN_RATIO
        } else {
            free / self.eden_time_per_region / self.heap_regions as f64
        };
        self.eden_ratio = ratio.clamp(MIN_EDEN_RATIO, MAX_EDEN_RATIO);
    }

    /// Number of Eden regions mutators may fill before a young collection is due.
    pub fn eden_budget(&self) -> usize {
        match self.fixed_eden_regions {
            Some(regions) => regions,
            None => ((self.heap_regions as f64 * self.eden_ratio) as usize).max(1),
        }
    }

    /// Predicted cost of evacuating one region.
    pub fn region_cost(&self, space: &RegionSpace, id: RegionId) -> f64 {
        let region = space.region(id);
        self.s * region.remset.size() as f64 + self.c * region.live_bytes() as f64
    }

    /// Predicted pause time for a collection set. Young regions count as fully live.
    pub fn predict(&self, space: &RegionSpace, regions: &[RegionId]) -> f64 {
        self.v_fixed
            + regions
                .iter()
                .map(|id| {
                    let region = space.region(*id);
                    if region.role().is_young() {
                        self.s * region.remset.size() as f64
                            + self.c * region.used_bytes() as f64
                    } else {
                        self.region_cost(space, *id)
                    }
                })
                .sum::<f64>()
    }

    /// How many of `candidates`, taken in order, fit in the pause goal after the young regions.
    /// `None` before anything was measured.
    pub fn old_regions_within_budget(
        &self,
        space: &RegionSpace,
        young: &[RegionId],
        candidates: &[RegionId],
    ) -> Option<usize> {
        if !self.has_measurements() {
            return None;
        }
        let mut predicted = self.predict(space, young);
        let mut count = 0;
        for id in candidates {
            predicted += self.region_cost(space, *id);
            if predicted > self.pause_time_goal {
                break;
            }
            count += 1;
        }
        Some(count)
    }
}
