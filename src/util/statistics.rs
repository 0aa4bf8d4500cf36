use crate::plan::concurrent::MarkPhase;
use crate::plan::{CollectionError, PauseKind};
use crate::policy::region::RegionRole;
use enum_map::EnumMap;
use std::sync::Mutex;
use std::time::Duration;

/// A read-only snapshot of the collector's state, for logging and tooling.
#[derive(Clone, Debug)]
pub struct HeapStatistics {
    pub regions_total: usize,
    pub regions_free: usize,
    /// Live bytes in Old and Humongous regions as of the last marking, plus everything in
    /// young regions.
    pub live_bytes_estimate: usize,
    pub last_pause_ms: f64,
    pub last_pause_kind: Option<PauseKind>,
    /// Number of collections (young, mixed and full pauses).
    pub gc_count: usize,
    /// Young pauses, including those that started a concurrent cycle.
    pub young_count: usize,
    pub mixed_count: usize,
    pub full_count: usize,
    pub remark_count: usize,
    pub concurrent_cycles: usize,
    pub concurrent_mode_failures: usize,
    /// Why the last full collection replaced a young or mixed pause. `None` if no full
    /// collection has been a fallback yet.
    pub last_full_fallback: Option<CollectionError>,
    pub total_pause_ms: f64,
    pub mark_phase: MarkPhase,
    pub regions_by_role: EnumMap<RegionRole, usize>,
}

#[derive(Default)]
struct Counters {
    gc_count: usize,
    young_count: usize,
    mixed_count: usize,
    full_count: usize,
    remark_count: usize,
    concurrent_cycles: usize,
    concurrent_mode_failures: usize,
    last_full_fallback: Option<CollectionError>,
    total_pause: Duration,
    last_pause: Option<(PauseKind, Duration)>,
}

/// Pause counters, updated at the end of every pause.
#[derive(Default)]
pub struct GcStats {
    counters: Mutex<Counters>,
}

impl GcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pause(&self, kind: PauseKind, time: Duration) {
        let mut c = self.counters.lock().unwrap();
        match kind {
            PauseKind::Young | PauseKind::YoungConcurrentStart => c.young_count += 1,
            PauseKind::Mixed => c.mixed_count += 1,
            PauseKind::Full => c.full_count += 1,
            PauseKind::Remark => c.remark_count += 1,
        }
        if kind != PauseKind::Remark {
            c.gc_count += 1;
        }
        c.total_pause += time;
        c.last_pause = Some((kind, time));
    }

    pub fn note_concurrent_cycle(&self) {
        self.counters.lock().unwrap().concurrent_cycles += 1;
    }

    pub fn note_full_fallback(&self, reason: CollectionError) {
        let mut c = self.counters.lock().unwrap();
        if reason == CollectionError::ConcurrentModeFailure {
            c.concurrent_mode_failures += 1;
        }
        c.last_full_fallback = Some(reason);
    }

    pub fn gc_count(&self) -> usize {
        self.counters.lock().unwrap().gc_count
    }

    pub fn full_count(&self) -> usize {
        self.counters.lock().unwrap().full_count
    }

    pub fn last_pause_kind(&self) -> Option<PauseKind> {
        self.counters.lock().unwrap().last_pause.map(|(kind, _)| kind)
    }

    /// Fill in the pause counters of a snapshot. Region figures come from the caller.
    pub fn snapshot(
        &self,
        regions_by_role: EnumMap<RegionRole, usize>,
        live_bytes_estimate: usize,
        mark_phase: MarkPhase,
    ) -> HeapStatistics {
        let c = self.counters.lock().unwrap();
        HeapStatistics {
            regions_total: regions_by_role.values().sum(),
            regions_free: regions_by_role[RegionRole::Free],
            live_bytes_estimate,
            last_pause_ms: c.last_pause.map_or(0.0, |(_, t)| as_millis_f64(t)),
            last_pause_kind: c.last_pause.map(|(kind, _)| kind),
            gc_count: c.gc_count,
            young_count: c.young_count,
            mixed_count: c.mixed_count,
            full_count: c.full_count,
            remark_count: c.remark_count,
            concurrent_cycles: c.concurrent_cycles,
            concurrent_mode_failures: c.concurrent_mode_failures,
            last_full_fallback: c.last_full_fallback,
            total_pause_ms: as_millis_f64(c.total_pause),
            mark_phase,
            regions_by_role,
        }
    }
}

pub fn as_millis_f64(time: Duration) -> f64 {
    time.as_secs_f64() * 1000.0
}
