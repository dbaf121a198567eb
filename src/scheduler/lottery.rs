//! Lottery policy
//!
//! Tasks queue in arrival order like FIFO, but an idle CPU does not simply
//! take the head. It gathers up to [`LOTTERY_MAX_CANDIDATES`] tasks it may
//! run, gives each as many tickets as its weight and draws one. A task with
//! twice the weight wins twice as often; every runnable task keeps a
//! nonzero chance.
//!
//! If the winner cannot be placed, the remaining candidates are tried in
//! queue order.

use super::core::{PolicyContext, SchedOps};
use super::dsq::DsqOrdering;
use super::error::SchedResult;
use super::types::{EnqueueFlags, TaskRef};

/// Candidates considered per draw
pub const LOTTERY_MAX_CANDIDATES: usize = 64;

/// Index of the weight interval containing `ticket % sum(weights)`.
///
/// Returns 0 when all weights are zero and `None` for an empty slice.
pub fn draw_winner(weights: &[u32], ticket: u32) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: u64 = weights.iter().map(|&w| w as u64).sum();
    if total == 0 {
        return Some(0);
    }
    let ticket = ticket as u64 % total;
    let mut upper = 0u64;
    for (i, &w) in weights.iter().enumerate() {
        upper += w as u64;
        if ticket < upper {
            return Some(i);
        }
    }
    Some(weights.len() - 1)
}

pub struct LotteryPolicy;

impl SchedOps for LotteryPolicy {
    fn name(&self) -> &'static str {
        "lottery_sonar"
    }

    fn init(&self, ctx: &PolicyContext) -> SchedResult<()> {
        ctx.create_shared_dsq(DsqOrdering::Fifo)
    }

    fn enqueue(&self, ctx: &PolicyContext, task: &TaskRef, flags: EnqueueFlags) {
        let Some(dsq) = ctx.shared_dsq() else {
            return;
        };
        let slice_ns = ctx.enqueue_slice(&dsq);
        dsq.insert(task.clone(), slice_ns, flags);
    }

    fn dispatch(&self, ctx: &PolicyContext, cpu: u32, _prev: Option<&TaskRef>) -> Option<TaskRef> {
        let dsq = ctx.shared_dsq()?;
        let settings = ctx.settings().get();
        let runtime = ctx.runtime();

        dsq.with_entries(|view| {
            let mut slots = [0usize; LOTTERY_MAX_CANDIDATES];
            let mut weights = [0u32; LOTTERY_MAX_CANDIDATES];
            let mut n = 0;
            for (idx, entry) in view.iter().enumerate() {
                if n == LOTTERY_MAX_CANDIDATES {
                    break;
                }
                if ctx.can_run_on(&entry.task, cpu, &settings) {
                    slots[n] = idx;
                    weights[n] = entry.task.weight;
                    n += 1;
                }
            }

            let winner = draw_winner(&weights[..n], runtime.prandom_u32())?;
            let order = core::iter::once(winner).chain((0..n).filter(|&i| i != winner));
            for i in order {
                let idx = slots[i];
                let placed = view.get(idx).is_some_and(|entry| {
                    runtime.move_to_local(cpu, &entry.task, entry.slice_ns, EnqueueFlags::PREEMPT)
                });
                if placed {
                    return view.remove(idx);
                }
            }
            None
        })
    }
}
