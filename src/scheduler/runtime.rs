//! Kernel-extension runtime interface
//!
//! Everything a policy needs from the kernel goes through [`SchedRuntime`]:
//! the monotonic clock, the number of possible CPUs, dispatch queue
//! management, local run slot placement and a pseudo-random source.
//! Implementations must be callable from any CPU concurrently.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use spin::Mutex;

use super::dsq::{DispatchQueue, DsqOrdering};
use super::error::{SchedError, SchedResult};
use super::types::{EnqueueFlags, TaskRef};

pub trait SchedRuntime: Send + Sync {
    /// Monotonic kernel time in nanoseconds
    fn now_ns(&self) -> u64;

    /// Number of possible CPU ids; a task allowed on all of them is unpinned
    fn nr_cpu_ids(&self) -> u32;

    fn create_dsq(&self, id: u64, ordering: DsqOrdering) -> SchedResult<Arc<DispatchQueue>>;

    fn destroy_dsq(&self, id: u64) -> SchedResult<()>;

    /// Places `task` on `cpu`'s local run slot with the given slice.
    ///
    /// Returns false when `cpu` is not a valid id or the slot refuses the
    /// task, in which case the caller keeps the task queued.
    fn move_to_local(&self, cpu: u32, task: &TaskRef, slice_ns: u64, flags: EnqueueFlags) -> bool;

    fn prandom_u32(&self) -> u32;
}

/// Default queue budget of a [`DsqRegistry`]
pub const MAX_DSQS: usize = 64;

/// Dispatch queue bookkeeping shared by runtime implementations
pub struct DsqRegistry {
    queues: Mutex<BTreeMap<u64, Arc<DispatchQueue>>>,
    limit: usize,
}

impl DsqRegistry {
    pub const fn new() -> Self {
        Self::with_limit(MAX_DSQS)
    }

    pub const fn with_limit(limit: usize) -> Self {
        Self {
            queues: Mutex::new(BTreeMap::new()),
            limit,
        }
    }

    pub fn create(&self, id: u64, ordering: DsqOrdering) -> SchedResult<Arc<DispatchQueue>> {
        let mut queues = self.queues.lock();
        if queues.contains_key(&id) {
            return Err(SchedError::DsqExists(id));
        }
        if queues.len() >= self.limit {
            return Err(SchedError::DsqLimit);
        }
        let dsq = Arc::new(DispatchQueue::new(id, ordering));
        queues.insert(id, dsq.clone());
        Ok(dsq)
    }

    /// Unregisters the queue and drops whatever was still queued on it.
    pub fn destroy(&self, id: u64) -> SchedResult<()> {
        let dsq = self
            .queues
            .lock()
            .remove(&id)
            .ok_or(SchedError::DsqNotFound(id))?;
        dsq.drain();
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<Arc<DispatchQueue>> {
        self.queues.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DsqRegistry {
    fn default() -> Self {
        Self::new()
    }
}
