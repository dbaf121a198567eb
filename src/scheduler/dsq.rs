//! Dispatch queues
//!
//! A dispatch queue (DSQ) is an ordered holding area of runnable tasks. The
//! shared queue every policy uses is created by `init` through the runtime;
//! CPUs pull from it in `dispatch` by walking it in order and moving one
//! entry to their local run slot.
//!
//! Walks are bounded by [`DSQ_SCAN_LIMIT`] so neither a dispatch call nor a
//! vtime-ordered insert loops over an arbitrarily long queue.

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use super::priority::is_smaller;
use super::types::{EnqueueFlags, TaskRef};

/// Maximum number of entries a single queue walk inspects
pub const DSQ_SCAN_LIMIT: usize = 1024;

/// How a queue orders its entries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsqOrdering {
    /// Arrival order
    Fifo,
    /// Ascending virtual time, arrival order among equal keys
    VTime,
}

/// A queued task together with the slice it was granted on enqueue
#[derive(Clone, Debug)]
pub struct DsqEntry {
    pub task: TaskRef,
    pub slice_ns: u64,
    pub vtime: u64,
}

pub struct DispatchQueue {
    id: u64,
    ordering: DsqOrdering,
    entries: Mutex<VecDeque<DsqEntry>>,
    nr_queued: AtomicUsize,
}

impl DispatchQueue {
    pub fn new(id: u64, ordering: DsqOrdering) -> Self {
        Self {
            id,
            ordering,
            entries: Mutex::new(VecDeque::new()),
            nr_queued: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ordering(&self) -> DsqOrdering {
        self.ordering
    }

    /// Current depth, readable without taking the queue lock.
    #[inline]
    pub fn nr_queued(&self) -> usize {
        self.nr_queued.load(Ordering::Relaxed)
    }

    /// Appends `task` in arrival order; `HEAD` puts it in front instead.
    pub fn insert(&self, task: TaskRef, slice_ns: u64, flags: EnqueueFlags) {
        let vtime = task.dsq_vtime();
        let entry = DsqEntry {
            task,
            slice_ns,
            vtime,
        };
        let mut entries = self.entries.lock();
        if flags.contains(EnqueueFlags::HEAD) {
            entries.push_front(entry);
        } else {
            entries.push_back(entry);
        }
        self.nr_queued.store(entries.len(), Ordering::Relaxed);
    }

    /// Inserts `task` keyed by `vtime`, which also becomes the task's
    /// `dsq_vtime`. Equal keys keep arrival order. Only the first
    /// [`DSQ_SCAN_LIMIT`] entries are compared; past them the task goes to
    /// the tail.
    pub fn insert_vtime(&self, task: TaskRef, slice_ns: u64, vtime: u64) {
        task.set_dsq_vtime(vtime);
        let entry = DsqEntry {
            task,
            slice_ns,
            vtime,
        };
        let mut entries = self.entries.lock();

        // before the first later entry within the scan window
        let pos = entries
            .iter()
            .take(DSQ_SCAN_LIMIT)
            .position(|e| is_smaller(vtime, e.vtime))
            .unwrap_or(entries.len());
        entries.insert(pos, entry);
        self.nr_queued.store(entries.len(), Ordering::Relaxed);
    }

    /// Walks the queue in order and removes the first entry for which
    /// `try_move` returns true. At most one entry leaves per call.
    pub fn take_first<F>(&self, mut try_move: F) -> Option<TaskRef>
    where
        F: FnMut(&DsqEntry) -> bool,
    {
        self.with_entries(|view| {
            let idx = view.iter().position(|e| try_move(e))?;
            view.remove(idx)
        })
    }

    /// Runs `f` with exclusive access to the queue contents.
    pub fn with_entries<R>(&self, f: impl FnOnce(&mut DsqView<'_>) -> R) -> R {
        let mut entries = self.entries.lock();
        let mut view = DsqView {
            entries: &mut entries,
        };
        let ret = f(&mut view);
        self.nr_queued.store(entries.len(), Ordering::Relaxed);
        ret
    }

    /// Drops every queued entry.
    pub fn drain(&self) -> usize {
        let mut entries = self.entries.lock();
        let n = entries.len();
        entries.clear();
        self.nr_queued.store(0, Ordering::Relaxed);
        n
    }

    /// Pids in queue order (diagnostics and tests).
    pub fn pids(&self) -> alloc::vec::Vec<u32> {
        self.entries.lock().iter().map(|e| e.task.pid).collect()
    }
}

/// Locked view of a queue handed out by [`DispatchQueue::with_entries`]
pub struct DsqView<'a> {
    entries: &'a mut VecDeque<DsqEntry>,
}

impl DsqView<'_> {
    /// Entries in queue order, capped at [`DSQ_SCAN_LIMIT`].
    pub fn iter(&self) -> impl Iterator<Item = &DsqEntry> + '_ {
        self.entries.iter().take(DSQ_SCAN_LIMIT)
    }

    pub fn get(&self, idx: usize) -> Option<&DsqEntry> {
        self.entries.get(idx)
    }

    pub fn remove(&mut self, idx: usize) -> Option<TaskRef> {
        self.entries.remove(idx).map(|e| e.task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
