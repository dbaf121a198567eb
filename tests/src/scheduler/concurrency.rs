//! Concurrency tests
//!
//! Hooks run on every CPU at once. These tests hammer the policies from
//! several threads released together by a `Barrier`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;

use sonar_sched::scheduler::VirtualClock;
use sonar_sched::{PolicyKind, SchedOps, Settings};

use crate::mock::Harness;

const THREADS: usize = 4;

// ============================================================================
// Global virtual clock
// ============================================================================

#[test]
fn test_clock_monotonic_under_racing_advances() {
    let clock = Arc::new(VirtualClock::new());
    let barrier = Arc::new(Barrier::new(THREADS + 1));
    let done = Arc::new(AtomicBool::new(false));
    let mut handles = vec![];

    for t in 0..THREADS as u64 {
        let clock = Arc::clone(&clock);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..10_000u64 {
                // interleaved, partly decreasing proposals
                let proposal = (i * 7 + t * 13) % 5_000 + i;
                clock.advance_to(proposal);
            }
        }));
    }

    let observer = {
        let clock = Arc::clone(&clock);
        let barrier = Arc::clone(&barrier);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            barrier.wait();
            let mut last = 0;
            while !done.load(Ordering::Relaxed) {
                let now = clock.now();
                assert!(now >= last, "clock went back from {last} to {now}");
                last = now;
            }
        })
    };

    for h in handles {
        h.join().expect("advancer panicked");
    }
    done.store(true, Ordering::Relaxed);
    observer.join().expect("observer saw the clock move back");

    // the largest proposal of any thread wins
    let max = (0..THREADS as u64)
        .flat_map(|t| (0..10_000u64).map(move |i| (i * 7 + t * 13) % 5_000 + i))
        .max()
        .unwrap_or(0);
    assert_eq!(clock.now(), max);
}

#[test]
fn test_vtime_running_from_all_cpus() {
    let h = Arc::new(Harness::new(PolicyKind::VTime, THREADS as u32, Settings::default()));
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = vec![];

    for cpu in 0..THREADS as u32 {
        let h = Arc::clone(&h);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let task = h.task(cpu + 1, "racer");
            barrier.wait();
            let mut seen = 0;
            for i in 0..2_000u64 {
                task.set_dsq_vtime(i * 10 + cpu as u64);
                h.policy.running(&h.ctx, &task);
                let now = h.ctx.clock().now();
                assert!(now >= seen);
                seen = now;
                h.policy.stopping(&h.ctx, &task, true);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("cpu thread panicked");
    }
    assert!(h.ctx.clock().now() >= 19_990);
}

// ============================================================================
// Shared queue
// ============================================================================

#[test]
fn test_concurrent_dispatch_never_duplicates() {
    for kind in PolicyKind::ALL {
        let h = Arc::new(Harness::new(kind, THREADS as u32, Settings::default()));
        for pid in 0..400 {
            h.enqueue(&h.task(pid, "job"));
        }

        let barrier = Arc::new(Barrier::new(THREADS));
        let mut handles = vec![];
        for cpu in 0..THREADS as u32 {
            let h = Arc::clone(&h);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let mut got = vec![];
                while let Some(pid) = h.dispatch(cpu) {
                    got.push(pid);
                }
                got
            }));
        }

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("cpu thread panicked"))
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>(), "{kind} lost or duplicated tasks");
    }
}

#[test]
fn test_concurrent_enqueue_and_stats() {
    let h = Arc::new(Harness::new(PolicyKind::Fifo, THREADS as u32, Settings::default()));
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = vec![];

    for cpu in 0..THREADS as u32 {
        let h = Arc::clone(&h);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..250u32 {
                let task = h.task(cpu * 1_000 + i, "mixed");
                h.enqueue(&task);
                h.policy.running(&h.ctx, &task);
                h.policy.stopping(&h.ctx, &task, false);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("cpu thread panicked");
    }

    assert_eq!(h.queued_pids().len(), THREADS * 250);
    assert_eq!(h.ctx.stats().len(), THREADS * 250);
    let summary = sonar_sched::scheduler::summarize(&h.ctx.stats().snapshot());
    assert_eq!(summary.total_dispatches, (THREADS * 250) as u64);
    assert_eq!(summary.running, 0);
}

proptest! {
    #[test]
    fn prop_clock_is_running_max(vtimes in proptest::collection::vec(0u64..1u64 << 62, 1..64)) {
        let clock = VirtualClock::new();
        let mut expected = 0u64;
        for v in vtimes {
            let after = clock.advance_to(v);
            expected = expected.max(v);
            prop_assert_eq!(after, expected);
        }
    }
}
