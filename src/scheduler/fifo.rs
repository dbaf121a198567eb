//! FIFO round-robin policy
//!
//! One shared queue in strict arrival order. Idle CPUs take the first task
//! they are allowed to run, preempting whatever occupies them.

use super::core::{PolicyContext, SchedOps};
use super::dsq::DsqOrdering;
use super::error::SchedResult;
use super::types::{EnqueueFlags, TaskRef};

pub struct FifoPolicy;

impl SchedOps for FifoPolicy {
    fn name(&self) -> &'static str {
        "fifo_sonar"
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
        ctx.dispatch_first(cpu)
    }
}
