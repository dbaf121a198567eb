//! Policy attachment handle

use sonar_sched::scheduler::Pid;
use sonar_sched::TaskStat;

use crate::error::Result;

/// A scheduling policy loaded into the kernel
pub trait Attachment {
    fn name(&self) -> &str;

    /// False once the kernel has unloaded the policy or it was detached.
    fn is_attached(&self) -> bool;

    /// Full copy of the task statistics table.
    fn task_stats(&self) -> Result<Vec<(Pid, TaskStat)>>;

    /// Unloads the policy and releases its queues and tables.
    /// Calling it again is a no-op.
    fn detach(&mut self) -> Result<()>;
}

/// Detaches the wrapped attachment when dropped
pub struct AttachGuard<A: Attachment> {
    inner: Option<A>,
}

impl<A: Attachment> AttachGuard<A> {
    pub fn new(attachment: A) -> Self {
        Self {
            inner: Some(attachment),
        }
    }

    pub fn get(&self) -> Option<&A> {
        self.inner.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.as_ref().is_some_and(|a| a.is_attached())
    }

    pub fn task_stats(&self) -> Result<Vec<(Pid, TaskStat)>> {
        match &self.inner {
            Some(a) => a.task_stats(),
            None => Ok(Vec::new()),
        }
    }

    /// Detaches now and reports the outcome.
    pub fn detach(mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut a) => a.detach(),
            None => Ok(()),
        }
    }
}

impl<A: Attachment> Drop for AttachGuard<A> {
    fn drop(&mut self) {
        if let Some(mut a) = self.inner.take() {
            if let Err(e) = a.detach() {
                log::warn!("detaching {} failed: {}", a.name(), e);
            }
        }
    }
}
