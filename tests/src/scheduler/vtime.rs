//! VTime policy tests
//!
//! Covers the enqueue clamp, queue ordering by virtual time, weighted
//! charging on `stopping`, and the global clock driven by `running`.

use proptest::prelude::*;

use sonar_sched::scheduler::{
    DispatchQueue, DsqOrdering, DSQ_SCAN_LIMIT, SCX_SLICE_DFL, SHARED_DSQ_ID,
};
use sonar_sched::{CpuMask, PolicyKind, SchedOps, Settings, Task};

use crate::mock::Harness;

fn vtime(nr_cpus: u32) -> Harness {
    Harness::new(PolicyKind::VTime, nr_cpus, Settings::default())
}

// ============================================================================
// Enqueue clamp
// ============================================================================

#[test]
fn test_clamp_pulls_sleeper_up() {
    let h = Harness::vtime_with_budget(20_000, 1, Settings::default());
    let t = h.task(1, "sleeper");

    h.ctx.clock().advance_to(1_000_000);
    t.set_dsq_vtime(500_000);
    h.enqueue(&t);

    assert_eq!(t.dsq_vtime(), 980_000);
}

#[test]
fn test_recent_vtime_kept() {
    let h = Harness::vtime_with_budget(20_000, 1, Settings::default());
    let t = h.task(1, "busy");

    h.ctx.clock().advance_to(1_000_000);
    t.set_dsq_vtime(995_000);
    h.enqueue(&t);

    assert_eq!(t.dsq_vtime(), 995_000);
}

#[test]
fn test_default_budget_is_default_slice() {
    let h = vtime(1);
    let t = h.task(1, "sleeper");
    h.ctx.clock().advance_to(100_000_000);
    h.enqueue(&t);
    assert_eq!(t.dsq_vtime(), 100_000_000 - SCX_SLICE_DFL);
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_queue_is_vtime_ordered() {
    let h = vtime(1);
    assert_eq!(
        h.rt.dsq(SHARED_DSQ_ID).map(|d| d.ordering()),
        Some(DsqOrdering::VTime)
    );

    for (pid, vt) in [(1, 300), (2, 100), (3, 200), (4, 100)] {
        let t = h.task(pid, "t");
        t.set_dsq_vtime(vt);
        h.enqueue(&t);
    }
    // equal keys keep arrival order
    assert_eq!(h.queued_pids(), vec![2, 4, 3, 1]);
    assert_eq!(h.dispatch(0), Some(2));
}

#[test]
fn test_lowest_vtime_skipped_when_not_allowed() {
    let h = vtime(2);
    let pinned = h.pinned(1, "pinned", 1);
    pinned.set_dsq_vtime(10);
    let free = h.task(2, "free");
    free.set_dsq_vtime(20);
    h.enqueue(&pinned);
    h.enqueue(&free);

    assert_eq!(h.dispatch(0), Some(2));
}

#[test]
fn test_enqueue_uses_computed_slice() {
    let h = Harness::new(PolicyKind::VTime, 1, Settings::new(4_000_000, -1, true));
    h.enqueue(&h.task(1, "a"));
    h.enqueue(&h.task(2, "b"));
    h.dispatch(0);
    h.dispatch(0);

    let slices: Vec<u64> = h.rt.moves().iter().map(|m| m.slice_ns).collect();
    assert_eq!(slices, vec![4_000_000, 4_000_000]);

    for pid in 3..=6 {
        h.enqueue(&h.task(pid, "c"));
    }
    while h.dispatch(0).is_some() {}
    // depths 0, 1, 2, 3
    let tail: Vec<u64> = h.rt.moves()[2..].iter().map(|m| m.slice_ns).collect();
    assert_eq!(tail, vec![4_000_000, 4_000_000, 2_000_000, 1_333_333]);
}

#[test]
fn test_insert_past_scan_limit_goes_to_tail() {
    let dsq = DispatchQueue::new(9, DsqOrdering::VTime);
    for pid in 0..DSQ_SCAN_LIMIT as u32 {
        dsq.insert_vtime(Task::new(pid, "t", CpuMask::first_n(1)).into_ref(), 1, 10);
    }
    let late = DSQ_SCAN_LIMIT as u32;
    dsq.insert_vtime(Task::new(late, "late", CpuMask::first_n(1)).into_ref(), 1, 1_000);
    // sorts before `late` but only the first DSQ_SCAN_LIMIT entries are compared
    dsq.insert_vtime(Task::new(late + 1, "early", CpuMask::first_n(1)).into_ref(), 1, 500);

    let pids = dsq.pids();
    assert_eq!(pids.len(), DSQ_SCAN_LIMIT + 2);
    assert_eq!(&pids[DSQ_SCAN_LIMIT..], &[late, late + 1]);
}

#[test]
fn test_insert_within_scan_limit_stays_sorted() {
    let dsq = DispatchQueue::new(9, DsqOrdering::VTime);
    for (pid, vt) in [(1, 30), (2, 10), (3, 20)] {
        dsq.insert_vtime(Task::new(pid, "t", CpuMask::first_n(1)).into_ref(), 1, vt);
    }
    assert_eq!(dsq.pids(), vec![2, 3, 1]);
}

// ============================================================================
// Charging and the global clock
// ============================================================================

#[test]
fn test_stopping_charges_runtime_over_weight() {
    let h = vtime(1);
    let light = h.task(1, "light");
    let heavy = Task::new(2, "heavy", CpuMask::first_n(1))
        .with_weight(400)
        .into_ref();

    h.run_for(&light, 1_000, 4_000);
    h.run_for(&heavy, 10_000, 4_000);

    assert_eq!(light.dsq_vtime(), 40);
    assert_eq!(heavy.dsq_vtime(), 10);
}

#[test]
fn test_enable_starts_at_clock() {
    let h = vtime(1);
    let runner = h.task(1, "runner");
    runner.set_dsq_vtime(5_000);
    h.policy.running(&h.ctx, &runner);
    assert_eq!(h.ctx.clock().now(), 5_000);

    let fresh = h.task(2, "fresh");
    h.policy.enable(&h.ctx, &fresh);
    assert_eq!(fresh.dsq_vtime(), 5_000);
}

#[test]
fn test_running_never_moves_clock_back() {
    let h = vtime(1);
    let ahead = h.task(1, "ahead");
    let behind = h.task(2, "behind");
    ahead.set_dsq_vtime(9_000);
    behind.set_dsq_vtime(1_000);

    h.policy.running(&h.ctx, &ahead);
    h.policy.running(&h.ctx, &behind);
    assert_eq!(h.ctx.clock().now(), 9_000);
}

#[test]
fn test_stopping_without_record_charges_nothing() {
    let h = vtime(1);
    let t = h.task(1, "late");
    t.set_dsq_vtime(77);
    h.rt.set_now(1_000_000);
    h.policy.stopping(&h.ctx, &t, false);

    assert_eq!(t.dsq_vtime(), 77);
    assert_eq!(h.ctx.stats().peek(1).map(|s| s.runtime_ns), Some(0));
}

#[test]
fn test_init_resets_clock() {
    let h = vtime(1);
    h.ctx.clock().advance_to(123);
    h.policy.exit(&h.ctx);
    h.policy.init(&h.ctx).expect("re-init");
    assert_eq!(h.ctx.clock().now(), 0);
}

proptest! {
    #[test]
    fn prop_clamped_vtime_within_budget(clock in 0u64..1u64 << 40, vt in 0u64..1u64 << 40, budget in 1u64..1u64 << 30) {
        let h = Harness::vtime_with_budget(budget, 1, Settings::default());
        let t = h.task(1, "t");
        h.ctx.clock().advance_to(clock);
        t.set_dsq_vtime(vt);
        h.enqueue(&t);

        let queued = t.dsq_vtime();
        prop_assert!(queued >= vt);
        if clock >= budget {
            prop_assert!(queued >= clock - budget);
        }
    }
}
