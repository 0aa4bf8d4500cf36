use crate::util::VMMutatorThread;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Where a registered mutator thread is, as far as safepoints are concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Executing managed code. Must reach a poll point before a safepoint can begin.
    Running,
    /// Parked at a poll point.
    Parked,
    /// In native or blocking code. Does not touch the heap, so it counts as safe.
    Blocked,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Owner {
    Mutator(VMMutatorThread),
    Collector,
}

#[derive(Default)]
struct State {
    threads: HashMap<VMMutatorThread, ThreadState>,
    owner: Option<Owner>,
    /// Incremented every time a safepoint ends.
    epoch: u64,
}

impl State {
    fn set(&mut self, tls: VMMutatorThread, state: ThreadState) {
        match self.threads.get_mut(&tls) {
            Some(entry) => *entry = state,
            None => panic!("{} is not registered with the safepoint coordinator", tls),
        }
    }

    fn all_safe(&self, requester: Option<VMMutatorThread>) -> bool {
        self.threads
            .iter()
            .all(|(tls, state)| Some(*tls) == requester || *state != ThreadState::Running)
    }
}

/// Proof that every mutator is stopped. Operations that may only run inside a stop-the-world
/// pause take a `&SafepointToken`; the token is consumed by
/// [`SafepointCoordinator::release`].
#[must_use = "a safepoint must be released"]
#[derive(Debug)]
pub struct SafepointToken {
    epoch: u64,
    time_to_safepoint: Duration,
}

impl SafepointToken {
    /// Number of safepoints completed before this one.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// How long the requester waited for all mutators to park.
    pub fn time_to_safepoint(&self) -> Duration {
        self.time_to_safepoint
    }
}

/// Brings all registered mutator threads to a poll point before a stop-the-world phase and
/// resumes them afterwards.
///
/// Mutators call [`poll`](SafepointCoordinator::poll) at their cooperative poll points. The
/// fast path is a single load of the `requested` flag. A thread that never polls delays every
/// safepoint until it does.
pub struct SafepointCoordinator {
    requested: AtomicBool,
    state: Mutex<State>,
    /// The requester waits here for threads to park.
    parked: Condvar,
    /// Parked threads wait here for the safepoint to end.
    resumed: Condvar,
}

impl SafepointCoordinator {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            state: Mutex::new(State::default()),
            parked: Condvar::new(),
            resumed: Condvar::new(),
        }
    }

    /// Register a mutator thread. If a safepoint is in progress, wait for it to end first, so
    /// the new thread never runs inside a pause.
    pub fn register(&self, tls: VMMutatorThread) {
        let mut state = self.state.lock().unwrap();
        while state.owner.is_some() {
            state = self.resumed.wait(state).unwrap();
        }
        let old = state.threads.insert(tls, ThreadState::Running);
        assert!(old.is_none(), "{} registered twice", tls);
        debug!("Register {} for safepoints", tls);
    }

    pub fn unregister(&self, tls: VMMutatorThread) {
        let mut state = self.state.lock().unwrap();
        state.threads.remove(&tls);
        // The requester may be waiting for this thread.
        self.parked.notify_all();
        debug!("Unregister {} from safepoints", tls);
    }

    /// Registered threads, sorted.
    pub fn threads(&self) -> Vec<VMMutatorThread> {
        let state = self.state.lock().unwrap();
        let mut threads: Vec<VMMutatorThread> = state.threads.keys().copied().collect();
        threads.sort();
        threads
    }

    pub fn thread_state(&self, tls: VMMutatorThread) -> Option<ThreadState> {
        self.state.lock().unwrap().threads.get(&tls).copied()
    }

    /// Is a safepoint requested or in progress? This is the poll fast path.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Block until every registered mutator other than `requester` is parked or blocked.
    ///
    /// A mutator requester that finds another safepoint in progress parks until that one
    /// ends, then competes again. `None` is for requesters that are not mutators.
    pub fn request_safepoint(&self, requester: Option<VMMutatorThread>) -> SafepointToken {
        let start = Instant::now();
        let mut state = self.state.lock().unwrap();
        while state.owner.is_some() {
            if let Some(tls) = requester {
                state.set(tls, ThreadState::Parked);
                self.parked.notify_all();
            }
            let epoch = state.epoch;
            while state.owner.is_some() && state.epoch == epoch {
                state = self.resumed.wait(state).unwrap();
            }
            if let Some(tls) = requester {
                state.set(tls, ThreadState::Running);
            }
        }
        state.owner = Some(match requester {
            Some(tls) => Owner::Mutator(tls),
            None => Owner::Collector,
        });
        self.requested.store(true, Ordering::Release);

        while !state.all_safe(requester) {
            state = self.parked.wait(state).unwrap();
        }
        let time_to_safepoint = start.elapsed();
        debug!(
            "Safepoint {} reached in {:?} ({} threads)",
            state.epoch,
            time_to_safepoint,
            state.threads.len()
        );
        SafepointToken {
            epoch: state.epoch,
            time_to_safepoint,
        }
    }

    /// End the safepoint and resume every parked thread.
    pub fn release(&self, token: SafepointToken) {
        let mut state = self.state.lock().unwrap();
        assert_eq!(
            state.epoch, token.epoch,
            "released a safepoint that is not the current one"
        );
        state.owner = None;
        state.epoch += 1;
        self.requested.store(false, Ordering::Release);
        self.resumed.notify_all();
    }

    /// Poll point. If a safepoint is requested by someone else, park until it ends.
    /// Returns `true` if the thread parked.
    pub fn poll(&self, tls: VMMutatorThread) -> bool {
        if !self.is_requested() {
            return false;
        }
        self.park(tls)
    }

    fn park(&self, tls: VMMutatorThread) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.owner {
            None => return false,
            Some(Owner::Mutator(owner)) if owner == tls => return false,
            Some(_) => {}
        }
        state.set(tls, ThreadState::Parked);
        self.parked.notify_all();
        let epoch = state.epoch;
        while state.owner.is_some() && state.epoch == epoch {
            state = self.resumed.wait(state).unwrap();
        }
        state.set(tls, ThreadState::Running);
        true
    }

    /// The thread is about to run code that does not touch the heap and may block.
    pub fn enter_blocked(&self, tls: VMMutatorThread) {
        let mut state = self.state.lock().unwrap();
        state.set(tls, ThreadState::Blocked);
        self.parked.notify_all();
    }

    /// The thread is back. If a safepoint is in progress, wait for it to end.
    pub fn leave_blocked(&self, tls: VMMutatorThread) {
        let mut state = self.state.lock().unwrap();
        while state.owner.is_some() {
            state = self.resumed.wait(state).unwrap();
        }
        state.set(tls, ThreadState::Running);
    }
}

impl Default for SafepointCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
