//! Lottery policy tests
//!
//! Randomness comes from the mock runtime: scripted tickets pin down the
//! interval logic, the fallback xorshift stream checks proportions.

use sonar_sched::scheduler::LOTTERY_MAX_CANDIDATES;
use sonar_sched::{CpuMask, PolicyKind, SchedOps, Settings, Task, TaskRef};

use crate::mock::Harness;

fn lottery(nr_cpus: u32) -> Harness {
    Harness::new(PolicyKind::Lottery, nr_cpus, Settings::default())
}

fn weighted(h: &Harness, pid: u32, weight: u32) -> TaskRef {
    Task::new(pid, "ticket", CpuMask::first_n(h.rt.nr_cpus()))
        .with_weight(weight)
        .into_ref()
}

#[test]
fn test_name_and_arrival_queue() {
    let h = lottery(1);
    assert_eq!(h.policy.name(), "lottery_sonar");
    for pid in [3, 1, 2] {
        h.enqueue(&h.task(pid, "t"));
    }
    assert_eq!(h.queued_pids(), vec![3, 1, 2]);
}

#[test]
fn test_ticket_selects_weight_interval() {
    let h = lottery(1);
    h.enqueue(&weighted(&h, 1, 100));
    h.enqueue(&weighted(&h, 2, 300));
    h.enqueue(&weighted(&h, 3, 100));

    // tickets are taken modulo the total weight (500)
    h.rt.script_random(&[150, 0, 0]);
    assert_eq!(h.dispatch(0), Some(2));
    assert_eq!(h.dispatch(0), Some(1));
    assert_eq!(h.dispatch(0), Some(3));
}

#[test]
fn test_only_eligible_tasks_hold_tickets() {
    let h = lottery(2);
    h.enqueue(&h.pinned(1, "elsewhere", 1));
    h.enqueue(&h.task(2, "here"));

    // any ticket must pick pid 2 on cpu 0
    h.rt.script_random(&[0]);
    assert_eq!(h.dispatch(0), Some(2));
    assert_eq!(h.queued_pids(), vec![1]);
}

#[test]
fn test_refused_winner_falls_back_in_queue_order() {
    let h = lottery(1);
    for pid in 1..=3 {
        h.enqueue(&h.task(pid, "t"));
    }
    h.rt.refuse(2);
    // equal weights: ticket 150 of 300 lands on pid 2
    h.rt.script_random(&[150]);
    assert_eq!(h.dispatch(0), Some(1));
    assert_eq!(h.queued_pids(), vec![2, 3]);
}

#[test]
fn test_empty_queue_draws_nothing() {
    let h = lottery(1);
    assert_eq!(h.dispatch(0), None);
    assert!(h.rt.moves().is_empty());
}

#[test]
fn test_core_limit_applies() {
    let h = Harness::new(PolicyKind::Lottery, 4, Settings::new(1_000_000, 2, false));
    h.enqueue(&h.task(1, "user"));
    assert_eq!(h.dispatch(3), None);
    h.enqueue(&h.kthread(2, "kworker"));
    assert_eq!(h.dispatch(3), Some(2));
}

#[test]
fn test_candidates_are_bounded() {
    let h = lottery(1);
    let total = LOTTERY_MAX_CANDIDATES as u32 + 10;
    for pid in 0..total {
        h.enqueue(&h.task(pid, "t"));
    }
    // the last possible ticket still lands inside the first window
    h.rt.script_random(&[u32::MAX]);
    let picked = h.dispatch(0).expect("one task");
    assert!(picked < LOTTERY_MAX_CANDIDATES as u32);
}

#[test]
fn test_heavier_task_wins_more_often() {
    let h = lottery(1);
    let heavy = weighted(&h, 1, 900);
    let light = weighted(&h, 2, 100);

    let mut heavy_wins = 0;
    for _ in 0..2_000 {
        h.enqueue(&heavy);
        h.enqueue(&light);
        if h.dispatch(0) == Some(1) {
            heavy_wins += 1;
        }
        // drain the loser so every round starts with both queued
        h.policy.dispatch(&h.ctx, 0, None);
    }
    assert!(heavy_wins > 1_500, "heavy won only {heavy_wins} of 2000");
}

#[test]
fn test_running_and_stopping_keep_stats() {
    let h = lottery(1);
    let t = h.task(8, "stat");
    h.run_for(&t, 100, 50);
    h.run_for(&t, 400, 25);
    let stat = h.ctx.stats().peek(8).expect("record");
    assert_eq!(stat.dispatches, 2);
    assert_eq!(stat.runtime_ns, 75);
}
