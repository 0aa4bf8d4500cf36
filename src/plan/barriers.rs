//! Write barriers.

use super::concurrent::{ConcurrentMarker, SatbBuffer};
use crate::policy::region::RegionSpace;
use crate::util::{Address, ObjectReference};
use std::sync::Arc;

pub trait Barrier: 'static + Send {
    /// Hand buffered entries over to the collector.
    fn flush(&mut self);
    /// Called with the value a reference slot holds before it is overwritten.
    fn pre_write_barrier(&mut self, slot: Address, old: Option<ObjectReference>);
    /// Called after a reference store became visible.
    fn post_write_barrier(&mut self, slot: Address, new: Option<ObjectReference>);
}

/// The G1 barrier pair.
///
/// The pre-write half keeps the snapshot-at-the-beginning invariant: while marking, every old
/// object that loses a reference is logged in a thread-local SATB buffer, which is handed to
/// the marker when it fills up, at safepoints, and when the mutator goes away. The post-write
/// half records the slot in the remembered set of the target's region.
pub struct G1Barrier {
    marker: Arc<ConcurrentMarker>,
    space: Arc<RegionSpace>,
    satb: Vec<ObjectReference>,
    /// The marking cycle the buffered entries belong to.
    cycle: usize,
    capacity: usize,
}

impl G1Barrier {
    pub fn new(marker: Arc<ConcurrentMarker>, space: Arc<RegionSpace>, capacity: usize) -> Self {
        Self {
            marker,
            space,
            satb: Vec::with_capacity(capacity),
            cycle: 0,
            capacity,
        }
    }

    /// Number of buffered SATB entries.
    pub fn pending(&self) -> usize {
        self.satb.len()
    }

    #[cold]
    fn enqueue_satb(&mut self, object: ObjectReference) {
        let cycle = self.marker.current_cycle();
        if cycle != self.cycle {
            // Left over from a cycle that has ended.
            self.satb.clear();
            self.cycle = cycle;
        }
        self.satb.push(object);
        if self.satb.len() >= self.capacity {
            self.flush();
        }
    }
}

impl Barrier for G1Barrier {
    #[cold]
    fn flush(&mut self) {
        if self.satb.is_empty() {
            return;
        }
        let entries = std::mem::replace(&mut self.satb, Vec::with_capacity(self.capacity));
        trace!("Flush {} SATB entries of cycle {}", entries.len(), self.cycle);
        self.marker.enqueue_satb(SatbBuffer {
            cycle: self.cycle,
            entries,
        });
    }

    #[inline(always)]
    fn pre_write_barrier(&mut self, _slot: Address, old: Option<ObjectReference>) {
        if !self.marker.is_marking() {
            return;
        }
        if let Some(old) = old {
            if ConcurrentMarker::should_mark(&self.space, old) {
                self.enqueue_satb(old);
            }
        }
    }

    #[inline(always)]
    fn post_write_barrier(&mut self, slot: Address, new: Option<ObjectReference>) {
        if let Some(new) = new {
            self.space.remember(slot, new);
        }
    }
}
