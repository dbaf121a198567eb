//! Scheduler Test Suite
//!
//! Tests for the sonar-sched policies and their shared infrastructure:
//! - Statistics table (LRU eviction order, recency, snapshots)
//! - Hook statistics (dispatch counting, runtime accounting)
//! - FIFO policy (arrival order, slice scaling, core limit, affinity)
//! - VTime policy (clamp, ordering, weighting, global clock)
//! - Lottery policy (weighted draw, fallback on refused placement)
//! - Concurrency (racing hooks on many CPUs)

mod concurrency;
mod lottery;
mod stats;
mod vtime;
