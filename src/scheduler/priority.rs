//! Virtual time arithmetic
//!
//! ## Key Concepts:
//! - **dsq_vtime**: per-task virtual time, the ordering key of vtime queues
//! - **global clock**: forward-only floor that tracks the vtime of whatever
//!   most recently started running
//! - **weight**: scales how fast a task's virtual time grows while it runs
//!
//! Virtual times are unsigned counters compared with wrapping arithmetic,
//! so ordering stays correct across a counter wrap as long as live values
//! are within 2^63 of each other.

use core::sync::atomic::{AtomicU64, Ordering};

use super::types::SCX_SLICE_DFL;

/// `a` is earlier than `b` in wrapping virtual time.
#[inline(always)]
pub const fn is_smaller(a: u64, b: u64) -> bool {
    (a.wrapping_sub(b) as i64) < 0
}

/// Clamps `vtime` to no earlier than `clock - budget`, bounding the credit an
/// idle task can bank while asleep.
#[inline]
pub const fn clamp_vtime(vtime: u64, clock: u64, budget: u64) -> u64 {
    let floor = clock.wrapping_sub(budget);
    if is_smaller(vtime, floor) {
        floor
    } else {
        vtime
    }
}

/// Virtual time charged for `runtime_ns` of execution at `weight`.
#[inline]
pub const fn delta_vtime(runtime_ns: u64, weight: u32) -> u64 {
    let weight = if weight == 0 { 1 } else { weight as u64 };
    runtime_ns / weight
}

/// Default amount of credit an idle task may keep
pub const DEFAULT_VTIME_BUDGET: u64 = SCX_SLICE_DFL;

/// Global virtual clock.
///
/// Shared by every CPU without a lock. [`VirtualClock::advance_to`] only
/// ever moves it forward, so concurrent callers can lose the race to set
/// the newest value but never drag the clock backwards.
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    /// Moves the clock to `max(now, vtime)`; returns the value it holds after
    /// the call.
    pub fn advance_to(&self, vtime: u64) -> u64 {
        let mut current = self.now.load(Ordering::Relaxed);
        loop {
            if !is_smaller(current, vtime) {
                return current;
            }
            match self.now.compare_exchange_weak(
                current,
                vtime,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return vtime,
                Err(observed) => current = observed,
            }
        }
    }

    /// Restarts the clock; only valid while no policy is attached.
    pub fn reset(&self) {
        self.now.store(0, Ordering::Relaxed);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}
