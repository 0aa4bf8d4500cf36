//! The collector instance and its builder.

use crate::plan::concurrent::{cleanup, ConcurrentMarker, LivenessSnapshot, MarkingSuspended};
use crate::plan::evacuate::EvacuationStats;
use crate::plan::mixed::MixedCollector;
use crate::plan::predictor::PauseTimePredictor;
use crate::plan::roots::RootScanner;
use crate::plan::young::YoungCollector;
use crate::plan::{full, verify, CollectionError, GcCause, GcKind, PauseKind};
use crate::policy::region::{RegionRole, RegionSpace};
use crate::scheduler::{SafepointCoordinator, SafepointToken, WorkerGroup};
use crate::util::constants::HEAP_START;
use crate::util::options::Options;
use crate::util::statistics::{as_millis_f64, GcStats, HeapStatistics};
use crate::util::{ObjectReference, VMMutatorThread};
use crate::vm::{ObjectModel, Scanning, TypeDescriptor, TypeId, TypeTable, VMBinding};
use crossbeam::channel::{unbounded, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

/// Collects the options of a collector instance before it is built.
pub struct G1Builder {
    pub options: Options,
}

impl G1Builder {
    /// Default options, overridden by `G1GC_*` environment variables.
    pub fn new() -> Self {
        G1Builder {
            options: Options::default(),
        }
    }

    /// Default options, ignoring the environment.
    pub fn new_no_env() -> Self {
        G1Builder {
            options: Options::without_env(),
        }
    }

    /// Set an option by name. Returns `false` if the value is invalid.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_str(name, val)
    }

    /// Build the collector. Also tries to install the built-in logger and starts the
    /// background marking threads.
    pub fn build<VM: VMBinding>(&self, binding: VM) -> Arc<G1<VM>> {
        match crate::util::logger::try_init() {
            Ok(_) => debug!("g1gc initialized the logger."),
            Err(_) => debug!(
                "g1gc failed to initialize the logger. Possibly a logger has been initialized by user."
            ),
        }
        let g1 = Arc::new(G1::new(binding, self.options.clone()));
        g1.spawn_marker_thread();
        info!(
            "Initialized g1gc: {} regions of {} KiB, pause target {}ms, {} GC threads, {} marking threads",
            g1.space.region_count(),
            g1.space.bytes_in_region() >> 10,
            g1.options.pause_time_target_ms,
            g1.options.threads,
            g1.options.concurrent_threads
        );
        #[cfg(feature = "extreme_assertions")]
        warn!("The feature 'extreme_assertions' is enabled. The heap is verified after every pause.");
        g1
    }
}

impl Default for G1Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Collector state only touched inside pauses.
struct PauseState {
    mixed: MixedCollector,
    predictor: PauseTimePredictor,
    snapshots: Receiver<LivenessSnapshot>,
}

/// A collector instance: the heap, its regions, and everything needed to collect them.
pub struct G1<VM: VMBinding> {
    pub(crate) binding: VM,
    pub(crate) options: Options,
    pub(crate) space: Arc<RegionSpace>,
    pub(crate) safepoint: Arc<SafepointCoordinator>,
    pub(crate) marker: Arc<ConcurrentMarker>,
    pub(crate) types: TypeTable,
    workers: WorkerGroup,
    young: YoungCollector,
    state: Mutex<PauseState>,
    stats: GcStats,
    eden_budget: AtomicUsize,
    /// A collection a mutator should run at its next poll point.
    pending_collection: Mutex<Option<GcCause>>,
    marker_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<VM: VMBinding> G1<VM> {
    fn new(binding: VM, options: Options) -> Self {
        let space = Arc::new(RegionSpace::new(
            HEAP_START,
            options.heap_regions(),
            options.region_size,
        ));
        let (sender, snapshots) = unbounded();
        let predictor = PauseTimePredictor::new(
            options.pause_time_target_ms,
            space.region_count(),
            options.eden_regions,
        );
        let eden_budget = AtomicUsize::new(predictor.eden_budget());
        G1 {
            binding,
            space,
            safepoint: Arc::new(SafepointCoordinator::new()),
            marker: Arc::new(ConcurrentMarker::new(sender)),
            types: TypeTable::new(),
            workers: WorkerGroup::new(options.threads),
            young: YoungCollector::new(),
            state: Mutex::new(PauseState {
                mixed: MixedCollector::new(
                    options.mixed_gc_live_threshold_percent,
                    options.mixed_gc_count_target,
                    options.heap_waste_percent,
                ),
                predictor,
                snapshots,
            }),
            stats: GcStats::new(),
            eden_budget,
            pending_collection: Mutex::new(None),
            marker_thread: Mutex::new(None),
            options,
        }
    }

    fn spawn_marker_thread(&self) {
        if self.options.concurrent_threads == 0 {
            return;
        }
        let marker = self.marker.clone();
        let space = self.space.clone();
        let safepoint = self.safepoint.clone();
        let threads = self.options.concurrent_threads;
        let handle = std::thread::Builder::new()
            .name("g1gc-marker".to_string())
            .spawn(move || {
                let workers = WorkerGroup::new(threads);
                marker.run_background(&space, &safepoint, &workers);
                debug!("Marker thread exits");
            });
        match handle {
            Ok(handle) => *self.marker_thread.lock().unwrap() = Some(handle),
            Err(e) => panic!("failed to spawn the marker thread: {}", e),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn binding(&self) -> &VM {
        &self.binding
    }

    pub fn space(&self) -> &RegionSpace {
        &self.space
    }

    pub fn safepoint(&self) -> &SafepointCoordinator {
        &self.safepoint
    }

    pub fn marker(&self) -> &ConcurrentMarker {
        &self.marker
    }

    pub fn register_type(&self, descriptor: TypeDescriptor) -> TypeId {
        self.types.register(descriptor)
    }

    pub fn type_descriptor(&self, id: TypeId) -> TypeDescriptor {
        self.types.get(id)
    }

    /// Number of Eden regions mutators may claim before a young collection.
    pub fn eden_budget(&self) -> usize {
        self.eden_budget.load(Ordering::Relaxed)
    }

    pub fn heap_statistics(&self) -> HeapStatistics {
        self.stats.snapshot(
            self.space.regions_by_role(),
            self.space.live_bytes_estimate(),
            self.marker.phase(),
        )
    }

    /// Mixed candidates left from the last marking cycle.
    pub fn mixed_candidates(&self) -> usize {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.mixed.receive(&self.space, &state.snapshots);
        state.mixed.candidates().len()
    }

    fn old_occupancy_percent(&self) -> f64 {
        self.space.old_occupancy() * 100.0
    }

    fn critical_occupancy(&self) -> bool {
        self.old_occupancy_percent() >= self.options.critical_occupancy_percent
    }

    /// Ask the next mutator that polls to collect.
    pub(crate) fn request_collection(&self, cause: GcCause) {
        let mut pending = self.pending_collection.lock().unwrap();
        if pending.is_none() {
            info!("Collection requested: {}", cause);
            *pending = Some(cause);
        }
    }

    pub(crate) fn take_pending_collection(&self) -> Option<GcCause> {
        self.pending_collection.lock().unwrap().take()
    }

    /// Check old occupancy after a humongous allocation, which claims Old-like regions
    /// outside any pause.
    pub(crate) fn check_occupancy(&self) {
        let marking = self.marker.is_active();
        if (marking && self.critical_occupancy())
            || (!marking && self.old_occupancy_percent() >= self.options.initiating_heap_occupancy_percent)
        {
            self.request_collection(GcCause::OccupancyThreshold);
        }
    }

    /// Run a collection. `requester` is the mutator asking for it, if any; its own stack is
    /// scanned like every other thread's.
    ///
    /// Allocation-failure collections requested while another thread was already collecting
    /// return without collecting again. An escalated request only gives way to a full pause.
    pub fn collect(
        &self,
        requester: Option<VMMutatorThread>,
        cause: GcCause,
    ) -> Result<(), CollectionError> {
        let count = |stats: &GcStats| match cause {
            GcCause::AllocationFailureFull => stats.full_count(),
            _ => stats.gc_count(),
        };
        let seen = count(&self.stats);
        let token = self.safepoint.request_safepoint(requester);
        if cause.is_allocation() && count(&self.stats) != seen {
            debug!("Skip {} collection: another thread collected", cause);
            self.safepoint.release(token);
            return Ok(());
        }
        debug!(
            "Safepoint for {} reached in {:.3}ms",
            cause,
            as_millis_f64(token.time_to_safepoint())
        );
        let result = self.pause(&token, cause);
        self.safepoint.release(token);
        result
    }

    fn pause(&self, token: &SafepointToken, cause: GcCause) -> Result<(), CollectionError> {
        let start = Instant::now();
        let used_before = self.space.region_count() - self.space.free_regions();
        let mut marking = self.marker.suspend(token);
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.mixed.receive(&self.space, &state.snapshots);
        let scanner = RootScanner::new(&self.binding, self.safepoint.threads(), &self.space);

        // Set when a full collection has to run. The error is the reason it replaces a young or
        // mixed pause.
        let mut run_full: Option<Option<CollectionError>> = cause.requires_full().then_some(None);
        if run_full.is_none() && marking.is_active() && self.critical_occupancy() {
            run_full = Some(Some(self.concurrent_mode_failure(&mut marking)));
        }

        let mut kind = PauseKind::Full;
        let mut evacuation = None;
        if run_full.is_none() {
            match self.evacuation_pause(token, &mut marking, state, &scanner, cause) {
                Ok((pause_kind, stats)) => {
                    kind = pause_kind;
                    evacuation = Some(stats);
                    if marking.is_active() && self.critical_occupancy() {
                        run_full = Some(Some(self.concurrent_mode_failure(&mut marking)));
                    }
                }
                Err(e) => run_full = Some(Some(e)),
            }
        }

        let mut result = Ok(());
        if let Some(reason) = run_full {
            if let Some(reason) = reason {
                info!("{}; falling back to a full collection", reason);
                self.stats.note_full_fallback(reason);
            }
            if marking.is_active() {
                marking.abandon();
            }
            state.mixed.clear();
            kind = PauseKind::Full;
            result = full::collect(token, &self.space, &self.workers, &scanner).map(|_| ());
        }

        let elapsed = start.elapsed();
        if let Some(stats) = evacuation.filter(|_| kind != PauseKind::Full) {
            let gc_kind = if kind == PauseKind::Mixed {
                GcKind::Mixed
            } else {
                GcKind::Young
            };
            state.predictor.update(gc_kind, elapsed, &stats);
        }
        self.eden_budget
            .store(state.predictor.eden_budget(), Ordering::Relaxed);
        self.stats.record_pause(kind, elapsed);
        info!(
            "GC({}) Pause {} ({}) {}->{} regions used, {:.3}ms",
            self.stats.gc_count(),
            kind,
            cause,
            used_before,
            self.space.region_count() - self.space.free_regions(),
            as_millis_f64(elapsed)
        );
        if self.options.verify_heap || cfg!(feature = "extreme_assertions") {
            verify::verify_heap(token, &self.space, &scanner);
        }
        if let Err(e) = result {
            error!("GC({}) failed: {}", self.stats.gc_count(), e);
        }
        result
    }

    fn concurrent_mode_failure(&self, marking: &mut MarkingSuspended<'_>) -> CollectionError {
        let err = CollectionError::ConcurrentModeFailure;
        warn!(
            "{}: old occupancy {:.1}% reached {:.1}%",
            err,
            self.old_occupancy_percent(),
            self.options.critical_occupancy_percent
        );
        marking.abandon();
        err
    }

    /// A young or mixed pause, starting a marking cycle if old occupancy calls for it.
    fn evacuation_pause<S: Scanning>(
        &self,
        token: &SafepointToken,
        marking: &mut MarkingSuspended<'_>,
        state: &mut PauseState,
        scanner: &RootScanner<'_, S>,
        cause: GcCause,
    ) -> Result<(PauseKind, EvacuationStats), CollectionError> {
        let tenuring_threshold = self.options.tenuring_threshold;
        if cause == GcCause::ConcurrentStart && !marking.is_active() {
            state.mixed.clear();
        }
        let stats = if state.mixed.has_candidates() && !marking.is_active() {
            state.mixed.collect(
                token,
                &self.space,
                &self.workers,
                scanner,
                &self.young,
                &state.predictor,
                tenuring_threshold,
            )?
        } else {
            self.young.collect(
                token,
                &self.space,
                &self.workers,
                scanner,
                &[],
                tenuring_threshold,
            )?
        };
        if stats.old_regions > 0 {
            return Ok((PauseKind::Mixed, stats));
        }

        let start_marking = !marking.is_active()
            && !state.mixed.has_candidates()
            && (cause == GcCause::ConcurrentStart
                || self.old_occupancy_percent() >= self.options.initiating_heap_occupancy_percent);
        if !start_marking {
            return Ok((PauseKind::Young, stats));
        }
        info!(
            "Start concurrent marking: old occupancy {:.1}% ({})",
            self.old_occupancy_percent(),
            cause
        );
        let mut roots: Vec<ObjectReference> =
            scanner.external_roots().filter_map(|r| r.load()).collect();
        let memory = self.space.memory();
        for id in self.space.regions_with_role(RegionRole::Survivor) {
            self.space.for_each_object(id, |object| {
                ObjectModel::for_each_ref_slot(memory, object, |slot| {
                    roots.extend(ObjectModel::load_ref(memory, slot))
                })
            });
        }
        marking.initial_mark(&self.space, roots);
        Ok((PauseKind::YoungConcurrentStart, stats))
    }

    /// Run the remark and cleanup pause if marking has finished, or unconditionally with
    /// `force`. Returns `true` if a cycle was completed.
    pub fn remark(&self, requester: Option<VMMutatorThread>, force: bool) -> bool {
        let token = self.safepoint.request_safepoint(requester);
        let start = Instant::now();
        let mut marking = self.marker.suspend(&token);
        if !marking.is_active() || !(force || self.marker.remark_ready()) {
            drop(marking);
            self.safepoint.release(token);
            return false;
        }
        let mut completed = false;
        if let Some(snapshot) = marking.remark(&self.space, &self.workers) {
            let reclaimed = cleanup(&token, &self.space, &snapshot);
            let cycle = snapshot.cycle();
            self.marker.publish(snapshot);
            marking.finish_cleanup();
            self.stats.note_concurrent_cycle();
            completed = true;
            let elapsed = start.elapsed();
            self.stats.record_pause(PauseKind::Remark, elapsed);
            info!(
                "Pause Remark (cycle {}) reclaimed {} regions, {:.3}ms",
                cycle,
                reclaimed.len(),
                as_millis_f64(elapsed)
            );
        }
        drop(marking);
        if self.options.verify_heap || cfg!(feature = "extreme_assertions") {
            let scanner = RootScanner::new(&self.binding, self.safepoint.threads(), &self.space);
            verify::verify_heap(&token, &self.space, &scanner);
        }
        self.safepoint.release(token);
        completed
    }

    /// Start a concurrent marking cycle with a young pause, dropping any pending mixed
    /// candidates. Does nothing to an active cycle beyond the young pause.
    pub fn start_concurrent_cycle(
        &self,
        requester: Option<VMMutatorThread>,
    ) -> Result<(), CollectionError> {
        self.collect(requester, GcCause::ConcurrentStart)
    }

    /// Finish the active marking cycle now: drain what is left in a remark pause and run
    /// cleanup. Returns `false` if no cycle was active.
    pub fn complete_concurrent_cycle(&self, requester: Option<VMMutatorThread>) -> bool {
        self.remark(requester, true)
    }

    /// Check the heap from the roots. Panics on a broken invariant.
    pub fn verify_heap(&self, requester: Option<VMMutatorThread>) -> verify::VerifyStats {
        let token = self.safepoint.request_safepoint(requester);
        let scanner = RootScanner::new(&self.binding, self.safepoint.threads(), &self.space);
        let stats = verify::verify_heap(&token, &self.space, &scanner);
        self.safepoint.release(token);
        stats
    }
}

impl<VM: VMBinding> Drop for G1<VM> {
    fn drop(&mut self) {
        self.marker.shutdown();
        if let Some(handle) = self.marker_thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("The marker thread panicked");
            }
        }
    }
}
