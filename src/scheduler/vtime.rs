//! Weighted virtual-time policy
//!
//! The shared queue is ordered by each task's `dsq_vtime`. A task's virtual
//! time grows by `runtime / weight` every time it stops, so heavier tasks
//! age slower and get proportionally more CPU. The global clock follows the
//! vtime of whatever starts running and serves two purposes:
//!
//! 1. newly enabled tasks start at the clock instead of at zero
//! 2. on enqueue a sleeper's vtime is pulled up to `clock - budget`, so it
//!    cannot bank more than one budget of credit

use super::core::{PolicyContext, SchedOps};
use super::dsq::DsqOrdering;
use super::error::SchedResult;
use super::priority::{clamp_vtime, delta_vtime, DEFAULT_VTIME_BUDGET};
use super::types::{EnqueueFlags, TaskRef};

pub struct VTimePolicy {
    budget_ns: u64,
}

impl VTimePolicy {
    pub const fn new() -> Self {
        Self::with_budget(DEFAULT_VTIME_BUDGET)
    }

    /// Policy whose sleepers keep at most `budget_ns` of credit.
    pub const fn with_budget(budget_ns: u64) -> Self {
        Self { budget_ns }
    }

    pub fn budget_ns(&self) -> u64 {
        self.budget_ns
    }
}

impl Default for VTimePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedOps for VTimePolicy {
    fn name(&self) -> &'static str {
        "vtime_sonar"
    }

    fn init(&self, ctx: &PolicyContext) -> SchedResult<()> {
        ctx.create_shared_dsq(DsqOrdering::VTime)?;
        ctx.clock().reset();
        Ok(())
    }

    fn enqueue(&self, ctx: &PolicyContext, task: &TaskRef, _flags: EnqueueFlags) {
        let Some(dsq) = ctx.shared_dsq() else {
            return;
        };
        let slice_ns = ctx.enqueue_slice(&dsq);
        let vtime = clamp_vtime(task.dsq_vtime(), ctx.clock().now(), self.budget_ns);
        dsq.insert_vtime(task.clone(), slice_ns, vtime);
    }

    fn dispatch(&self, ctx: &PolicyContext, cpu: u32, _prev: Option<&TaskRef>) -> Option<TaskRef> {
        ctx.dispatch_first(cpu)
    }

    fn running(&self, ctx: &PolicyContext, task: &TaskRef) {
        ctx.clock().advance_to(task.dsq_vtime());
        ctx.record_running(task);
    }

    fn stopping(&self, ctx: &PolicyContext, task: &TaskRef, _runnable: bool) {
        if let Some(ran) = ctx.record_stopping(task) {
            let charged = delta_vtime(ran, task.weight);
            task.set_dsq_vtime(task.dsq_vtime().wrapping_add(charged));
        }
    }

    fn enable(&self, ctx: &PolicyContext, task: &TaskRef) {
        task.set_dsq_vtime(ctx.clock().now());
    }
}
