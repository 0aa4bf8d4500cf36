use super::mock_test_prelude::*;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

const SLOW_LOOP: Duration = Duration::from_millis(100);

/// A thread in a long loop without poll points delays the pause until it polls.
#[test]
pub fn pause_waits_for_a_thread_that_does_not_poll() {
    let fixture = MutatorFixture::create();
    let g1 = fixture.g1().clone();
    let registered = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            let mut mutator = memory_manager::bind_mutator(&g1, VMMutatorThread(2));
            registered.wait();
            thread::sleep(SLOW_LOOP);
            memory_manager::poll(&mut mutator);
            memory_manager::destroy_mutator(mutator);
        });

        registered.wait();
        let start = Instant::now();
        fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
        assert!(
            start.elapsed() >= SLOW_LOOP / 2,
            "pause started after {:?}",
            start.elapsed()
        );
    });
    assert_eq!(g1.safepoint().threads(), vec![fixture.tls]);
}

/// A blocked thread does not hold up a pause, and waits for the pause to end before it touches
/// the heap again.
#[test]
pub fn blocked_thread_does_not_delay_the_pause() {
    let fixture = MutatorFixture::create();
    let g1 = fixture.g1().clone();
    let blocked = Barrier::new(2);
    let resume = Barrier::new(2);
    let other = VMMutatorThread(2);

    thread::scope(|s| {
        s.spawn(|| {
            let mut mutator = memory_manager::bind_mutator(&g1, other);
            let slot = fixture.vm().push_root(other, None);
            let object = memory_manager::alloc(&mut mutator, fixture.g1.link).unwrap();
            slot.store(Some(object));
            mutator.write_word(object, 0, 11);
            memory_manager::enter_blocked(&mut mutator);
            blocked.wait();
            resume.wait();
            memory_manager::leave_blocked(&mut mutator);
            // The pause moved the object and updated the stack slot.
            let moved = slot.load().unwrap();
            assert_ne!(moved, object);
            assert_eq!(mutator.read_word(moved, 0), 11);
            memory_manager::destroy_mutator(mutator);
        });

        blocked.wait();
        assert_eq!(
            g1.safepoint().thread_state(other),
            Some(crate::scheduler::ThreadState::Blocked)
        );
        fixture.mutator().collect(GcCause::AllocationFailure).unwrap();
        resume.wait();
    });
    assert_eq!(memory_manager::heap_statistics(&g1).young_count, 1);
}
