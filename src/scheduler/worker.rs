use crossbeam::deque::{Injector, Steal, Stealer, Worker};
use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A GC worker: the thread-local half of a parallel phase. Work items discovered while
/// processing an item are pushed to the worker's own deque, and idle workers steal from it.
pub struct GCWorker<'a, T> {
    pub ordinal: usize,
    local: Worker<T>,
    shared: &'a Shared<T>,
}

struct Shared<T> {
    injector: Injector<T>,
    stealers: Vec<Stealer<T>>,
    /// Items pushed but not yet fully processed. Reaches zero only when every worker is idle
    /// and every deque is empty.
    pending: AtomicUsize,
}

impl<'a, T> GCWorker<'a, T> {
    /// Queue a new work item.
    pub fn add_work(&mut self, item: T) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.local.push(item);
    }

    fn find_work(&self) -> Option<T> {
        self.local.pop().or_else(|| loop {
            let steal = self.shared.injector.steal_batch_and_pop(&self.local).or_else(|| {
                self.shared
                    .stealers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != self.ordinal)
                    .map(|(_, s)| s.steal())
                    .collect()
            });
            match steal {
                Steal::Success(item) => break Some(item),
                Steal::Empty => break None,
                Steal::Retry => {}
            }
        })
    }
}

/// Runs one parallel phase of a stop-the-world pause to completion.
///
/// Worker threads are scoped to the phase. With a single worker the phase runs on the calling
/// thread.
pub struct WorkerGroup {
    workers: usize,
}

impl WorkerGroup {
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0);
        Self { workers }
    }

    /// Process `initial` and everything transitively added through
    /// [`GCWorker::add_work`] with `work`. Returns once all items are done.
    pub fn run<T, I, F>(&self, initial: I, work: F)
    where
        T: Send,
        I: IntoIterator<Item = T>,
        F: Fn(T, &mut GCWorker<'_, T>) + Sync,
    {
        let locals: Vec<Worker<T>> = (0..self.workers).map(|_| Worker::new_lifo()).collect();
        let shared = Shared {
            injector: Injector::new(),
            stealers: locals.iter().map(|w| w.stealer()).collect(),
            pending: AtomicUsize::new(0),
        };
        for item in initial {
            shared.pending.fetch_add(1, Ordering::SeqCst);
            shared.injector.push(item);
        }
        if shared.pending.load(Ordering::SeqCst) == 0 {
            return;
        }

        let run_worker = |ordinal: usize, local: Worker<T>| {
            let mut worker = GCWorker {
                ordinal,
                local,
                shared: &shared,
            };
            let backoff = Backoff::new();
            while shared.pending.load(Ordering::SeqCst) > 0 {
                match worker.find_work() {
                    Some(item) => {
                        work(item, &mut worker);
                        shared.pending.fetch_sub(1, Ordering::SeqCst);
                        backoff.reset();
                    }
                    None => backoff.snooze(),
                }
            }
        };

        if self.workers == 1 {
            for local in locals {
                run_worker(0, local);
            }
            return;
        }
        std::thread::scope(|s| {
            for (ordinal, local) in locals.into_iter().enumerate() {
                let run_worker = &run_worker;
                std::thread::Builder::new()
                    .name(format!("g1-gc-worker-{}", ordinal))
                    .spawn_scoped(s, move || run_worker(ordinal, local))
                    .unwrap_or_else(|e| panic!("failed to spawn GC worker {}: {}", ordinal, e));
            }
        });
    }
}
