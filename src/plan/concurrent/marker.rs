use super::snapshot::{LivenessSnapshot, RegionLiveness};
use super::MarkPhase;
use crate::policy::region::{HeapMarkBitmap, RegionId, RegionRole, RegionSpace};
use crate::scheduler::{SafepointCoordinator, SafepointToken, WorkerGroup};
use crate::util::ObjectReference;
use crate::vm::ObjectModel;
use atomic::Atomic;
use crossbeam::channel::Sender;
use crossbeam::queue::SegQueue;
use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

/// Objects traced by a background marking thread before it releases the mark lock.
const BACKGROUND_STEP: usize = 4096;

/// A batch of pre-write values recorded by one mutator's SATB barrier.
#[derive(Debug)]
pub struct SatbBuffer {
    /// The marking cycle the values were recorded in. Buffers from an older cycle are dropped.
    pub cycle: usize,
    pub entries: Vec<ObjectReference>,
}

struct MarkingCycle {
    id: usize,
    bitmap: HeapMarkBitmap,
    /// Marked objects whose fields are not traced yet.
    worklist: Vec<ObjectReference>,
    /// Epoch of every region that was Old or Humongous at initial mark.
    epochs: Vec<Option<usize>>,
}

/// The concurrent marker.
///
/// The state of the current cycle sits behind the mark lock. Background marking threads hold
/// the lock while they trace a bounded step, and give it up as soon as a safepoint is
/// requested. Stop-the-world phases take the lock for the whole pause through
/// [`ConcurrentMarker::suspend`], so marking never runs while objects move.
///
/// Mutators only touch the lock-free parts: the phase, and the queue of flushed SATB buffers.
pub struct ConcurrentMarker {
    phase: Atomic<MarkPhase>,
    cycle_id: AtomicUsize,
    cycle: Mutex<Option<MarkingCycle>>,
    work_available: Condvar,
    satb: SegQueue<SatbBuffer>,
    remark_ready: AtomicBool,
    shutdown: AtomicBool,
    sender: Sender<LivenessSnapshot>,
}

impl ConcurrentMarker {
    /// Completed snapshots are sent to `sender`.
    pub fn new(sender: Sender<LivenessSnapshot>) -> Self {
        Self {
            phase: Atomic::new(MarkPhase::Idle),
            cycle_id: AtomicUsize::new(0),
            cycle: Mutex::new(None),
            work_available: Condvar::new(),
            satb: SegQueue::new(),
            remark_ready: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            sender,
        }
    }

    pub fn phase(&self) -> MarkPhase {
        self.phase.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: MarkPhase) {
        trace!("Mark phase {} -> {}", self.phase(), phase);
        self.phase.store(phase, Ordering::Release)
    }

    pub fn is_active(&self) -> bool {
        self.phase().is_active()
    }

    /// Is the SATB barrier armed?
    pub fn is_marking(&self) -> bool {
        self.phase() == MarkPhase::ConcurrentMark
    }

    /// The worklist was empty when last checked, so a remark pause can finish the cycle.
    pub fn remark_ready(&self) -> bool {
        self.remark_ready.load(Ordering::Acquire)
    }

    /// The id of the latest cycle. Ids start at 1.
    pub fn current_cycle(&self) -> usize {
        self.cycle_id.load(Ordering::Acquire)
    }

    /// Does the current cycle trace this object? Only objects in Old and Humongous regions that
    /// were there when the cycle started. Everything above TAMS is implicitly live.
    pub fn should_mark(space: &RegionSpace, object: ObjectReference) -> bool {
        let region = space.region_of_object(object);
        region.role().is_old() && object.to_raw_address() < region.tams()
    }

    /// Hand a mutator's SATB buffer to the marker.
    pub fn enqueue_satb(&self, buffer: SatbBuffer) {
        if buffer.entries.is_empty() {
            return;
        }
        if buffer.cycle == self.current_cycle() && self.is_marking() {
            self.satb.push(buffer);
        } else {
            trace!(
                "Drop SATB buffer of cycle {} ({} entries)",
                buffer.cycle,
                buffer.entries.len()
            );
        }
    }

    /// Take the mark lock for the duration of a pause.
    pub fn suspend(&self, _token: &SafepointToken) -> MarkingSuspended<'_> {
        MarkingSuspended {
            marker: self,
            cycle: self.cycle.lock().unwrap(),
        }
    }

    /// Advance marking by at most `budget` objects on the calling thread. Used by mutators at
    /// poll points when there are no background marking threads. Returns `true` once the
    /// cycle is ready for remark.
    pub fn step(&self, space: &RegionSpace, safepoint: &SafepointCoordinator, budget: usize) -> bool {
        if !self.is_marking() || self.remark_ready() {
            return self.remark_ready();
        }
        // Someone else holds the lock: a pause or another mutator already marking.
        let Ok(mut guard) = self.cycle.try_lock() else {
            return false;
        };
        let Some(cycle) = guard.as_mut() else {
            return false;
        };
        let workers = WorkerGroup::new(1);
        let done = Self::drain(
            cycle,
            &self.satb,
            space,
            &workers,
            Some(budget),
            &|| safepoint.is_requested(),
        );
        if done {
            self.note_remark_ready(cycle.id);
        }
        done
    }

    fn note_remark_ready(&self, cycle: usize) {
        if !self.remark_ready.swap(true, Ordering::AcqRel) {
            debug!("Marking cycle {} is ready for remark", cycle);
        }
    }

    /// The body of a background marking thread. Returns after [`ConcurrentMarker::shutdown`].
    pub fn run_background(
        &self,
        space: &RegionSpace,
        safepoint: &SafepointCoordinator,
        workers: &WorkerGroup,
    ) {
        let mut guard = self.cycle.lock().unwrap();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if !self.is_marking() || self.remark_ready() || guard.is_none() {
                guard = self.work_available.wait(guard).unwrap();
                continue;
            }
            let Some(cycle) = guard.as_mut() else {
                continue;
            };
            let done = Self::drain(
                cycle,
                &self.satb,
                space,
                workers,
                Some(BACKGROUND_STEP),
                &|| safepoint.is_requested(),
            );
            if done {
                self.note_remark_ready(cycle.id);
            }
            drop(guard);
            // Let a pending pause take the lock.
            let backoff = Backoff::new();
            while safepoint.is_requested() && !self.shutdown.load(Ordering::Acquire) {
                backoff.snooze();
            }
            guard = self.cycle.lock().unwrap();
        }
        debug!("Background marking stopped");
    }

    /// Stop the background marking threads.
    pub fn shutdown(&self) {
        let _guard = self.cycle.lock().unwrap();
        self.shutdown.store(true, Ordering::Release);
        self.work_available.notify_all();
    }

    /// Send a completed snapshot to the mixed collector.
    pub fn publish(&self, snapshot: LivenessSnapshot) {
        let cycle = snapshot.cycle();
        if self.sender.send(snapshot).is_err() {
            debug!("No receiver for the snapshot of cycle {}", cycle);
        }
    }

    /// Trace one object: mark its unmarked children and hand them to `push`.
    fn trace_object<F: FnMut(ObjectReference)>(
        space: &RegionSpace,
        bitmap: &HeapMarkBitmap,
        object: ObjectReference,
        mut push: F,
    ) {
        let memory = space.memory();
        ObjectModel::for_each_ref_slot(memory, object, |slot| {
            if let Some(child) = ObjectModel::load_ref(memory, slot) {
                if Self::should_mark(space, child) && bitmap.mark(child) {
                    push(child)
                }
            }
        })
    }

    /// Move flushed SATB entries onto the worklist, then trace up to `budget` objects (all of
    /// them with `None`). Objects left over when the budget runs out or `should_yield` turns
    /// true go back to the worklist. Returns `true` if no work is left.
    fn drain(
        cycle: &mut MarkingCycle,
        satb: &SegQueue<SatbBuffer>,
        space: &RegionSpace,
        workers: &WorkerGroup,
        budget: Option<usize>,
        should_yield: &(dyn Fn() -> bool + Sync),
    ) -> bool {
        while let Some(buffer) = satb.pop() {
            if buffer.cycle != cycle.id {
                continue;
            }
            for object in buffer.entries {
                if Self::should_mark(space, object) && cycle.bitmap.mark(object) {
                    cycle.worklist.push(object);
                }
            }
        }
        if cycle.worklist.is_empty() {
            return true;
        }
        let len = cycle.worklist.len();
        let batch = cycle
            .worklist
            .split_off(len - budget.map_or(len, |b| b.min(len)));
        let processed = AtomicUsize::new(0);
        let deferred = Mutex::new(Vec::new());
        let bitmap = &cycle.bitmap;
        workers.run(batch, |object, worker| {
            let over_budget =
                budget.is_some_and(|b| processed.fetch_add(1, Ordering::Relaxed) >= b);
            if over_budget || should_yield() {
                deferred.lock().unwrap().push(object);
                return;
            }
            Self::trace_object(space, bitmap, object, |child| worker.add_work(child));
        });
        cycle.worklist.extend(deferred.into_inner().unwrap());
        cycle.worklist.is_empty() && satb.is_empty()
    }
}

/// The mark lock, held by a stop-the-world pause. The cycle-changing operations live here.
pub struct MarkingSuspended<'a> {
    marker: &'a ConcurrentMarker,
    cycle: MutexGuard<'a, Option<MarkingCycle>>,
}

impl MarkingSuspended<'_> {
    pub fn is_active(&self) -> bool {
        self.cycle.is_some()
    }

    /// Start a cycle: record TAMS and epochs of every Old and Humongous region, and mark the
    /// given roots. Called at the end of a young pause, when every young object is a survivor.
    pub fn initial_mark<I>(&mut self, space: &RegionSpace, roots: I)
    where
        I: IntoIterator<Item = ObjectReference>,
    {
        assert!(self.cycle.is_none(), "a marking cycle is already active");
        let marker = self.marker;
        marker.set_phase(MarkPhase::InitialMark);
        let id = marker.cycle_id.fetch_add(1, Ordering::AcqRel) + 1;
        let bitmap = HeapMarkBitmap::new(
            space.memory().start(),
            space.bytes_in_region(),
            space.region_count(),
        );
        let epochs: Vec<Option<usize>> = space
            .regions()
            .map(|r| {
                r.role().is_old().then(|| {
                    r.set_tams(r.top());
                    r.epoch()
                })
            })
            .collect();
        let mut worklist = vec![];
        for root in roots {
            if ConcurrentMarker::should_mark(space, root) && bitmap.mark(root) {
                worklist.push(root);
            }
        }
        debug!(
            "Initial mark of cycle {}: {} regions, {} root objects",
            id,
            epochs.iter().flatten().count(),
            worklist.len()
        );
        *self.cycle = Some(MarkingCycle {
            id,
            bitmap,
            worklist,
            epochs,
        });
        marker.remark_ready.store(false, Ordering::Release);
        marker.set_phase(MarkPhase::ConcurrentMark);
        marker.work_available.notify_all();
    }

    /// Finish tracing and compute the liveness snapshot. Leaves the marker in `Cleanup`, to
    /// be finished by [`MarkingSuspended::finish_cleanup`]. Returns `None` if no cycle is
    /// active.
    pub fn remark(&mut self, space: &RegionSpace, workers: &WorkerGroup) -> Option<LivenessSnapshot> {
        let mut cycle = self.cycle.take()?;
        let marker = self.marker;
        marker.set_phase(MarkPhase::Remark);
        while !ConcurrentMarker::drain(&mut cycle, &marker.satb, space, workers, None, &|| false) {}
        marker.remark_ready.store(false, Ordering::Release);
        marker.set_phase(MarkPhase::Cleanup);

        let memory = space.memory();
        let regions = cycle
            .epochs
            .iter()
            .enumerate()
            .map(|(index, epoch)| {
                let epoch = (*epoch)?;
                let region = space.region(RegionId::from_index(index));
                let (live_bytes, humongous_continuation) = match region.role() {
                    RegionRole::Old => {
                        let mut marked = 0;
                        cycle
                            .bitmap
                            .for_each_marked_in(region.id(), |o| {
                                marked += ObjectModel::size_in_bytes(memory, o)
                            });
                        (marked + (region.top() - region.tams()), false)
                    }
                    RegionRole::Humongous => {
                        let start = region.humongous_start().unwrap_or(region.id());
                        let object = ObjectReference::from_raw_address(space.region(start).start());
                        let live = object.is_some_and(|o| cycle.bitmap.is_marked(o));
                        (
                            if live { region.used_bytes() } else { 0 },
                            region.humongous_start().is_some(),
                        )
                    }
                    RegionRole::Free | RegionRole::Eden | RegionRole::Survivor => return None,
                };
                Some(RegionLiveness {
                    epoch,
                    live_bytes,
                    humongous_continuation,
                })
            })
            .collect();
        let snapshot = LivenessSnapshot::new(cycle.id, regions, cycle.bitmap);
        debug!(
            "Remark of cycle {}: {} live bytes in {} regions",
            snapshot.cycle(),
            snapshot.total_live_bytes(),
            snapshot.iter().count()
        );
        Some(snapshot)
    }

    /// The cycle is over.
    pub fn finish_cleanup(&mut self) {
        debug_assert_eq!(self.marker.phase(), MarkPhase::Cleanup);
        self.marker.set_phase(MarkPhase::Idle);
    }

    /// Drop the current cycle and everything it marked.
    pub fn abandon(&mut self) {
        let marker = self.marker;
        if let Some(cycle) = self.cycle.take() {
            debug!("Abandon marking cycle {}", cycle.id);
        }
        while marker.satb.pop().is_some() {}
        marker.remark_ready.store(false, Ordering::Release);
        marker.set_phase(MarkPhase::Idle);
    }
}
