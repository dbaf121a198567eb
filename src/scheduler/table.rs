//! Task statistics table
//!
//! Bounded map from task-group id to [`TaskStat`], evicting the least
//! recently used record once full. Records live in a slot arena linked into
//! a recency list by index; a hash index maps tgids to slots, so lookup,
//! touch, insert and eviction are all O(1).
//!
//! An evicted group simply looks new the next time a hook sees it.

use alloc::vec::Vec;

use hashbrown::HashMap;
use spin::Mutex;

use super::types::{Pid, TaskStat};

/// Default number of task groups tracked
pub const TASK_STATS_CAPACITY: usize = 100_000;

const NIL: u32 = u32::MAX;

struct Slot {
    tgid: Pid,
    stat: TaskStat,
    prev: u32, // towards most recently used
    next: u32, // towards least recently used
}

struct Lru {
    index: HashMap<Pid, u32>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32, // most recently used
    tail: u32, // least recently used
    capacity: usize,
    evictions: u64,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            evictions: 0,
        }
    }

    fn unlink(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };
        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_front(&mut self, idx: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[idx as usize];
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.slots[old_head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn touch(&mut self, idx: u32) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Frees the least recently used slot and returns its index.
    fn evict(&mut self) -> Option<u32> {
        let idx = self.tail;
        if idx == NIL {
            return None;
        }
        self.unlink(idx);
        let tgid = self.slots[idx as usize].tgid;
        self.index.remove(&tgid);
        self.evictions += 1;
        Some(idx)
    }

    fn insert(&mut self, tgid: Pid, stat: TaskStat) -> u32 {
        let idx = if self.index.len() >= self.capacity {
            self.evict()
        } else {
            self.free.pop()
        };
        let idx = match idx {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.tgid = tgid;
                slot.stat = stat;
                idx
            }
            None => {
                self.slots.push(Slot {
                    tgid,
                    stat,
                    prev: NIL,
                    next: NIL,
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.push_front(idx);
        self.index.insert(tgid, idx);
        idx
    }

    fn remove(&mut self, tgid: Pid) -> Option<TaskStat> {
        let idx = self.index.remove(&tgid)?;
        self.unlink(idx);
        self.free.push(idx);
        Some(self.slots[idx as usize].stat)
    }

    /// Slots from most to least recently used.
    fn walk(&self) -> impl Iterator<Item = &Slot> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let slot = &self.slots[cursor as usize];
            cursor = slot.next;
            Some(slot)
        })
    }
}

pub struct TaskStatsTable {
    inner: Mutex<Lru>,
}

impl TaskStatsTable {
    pub fn new() -> Self {
        Self::with_capacity(TASK_STATS_CAPACITY)
    }

    /// Table holding at most `capacity` groups (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Lru::new(capacity.max(1))),
        }
    }

    /// Applies `update` to the record of `tgid`, creating it from `create`
    /// first when absent. The record becomes the most recently used.
    pub fn update_or_create<C, U, R>(&self, tgid: Pid, create: C, update: U) -> R
    where
        C: FnOnce() -> TaskStat,
        U: FnOnce(&mut TaskStat) -> R,
    {
        let mut lru = self.inner.lock();
        let idx = match lru.index.get(&tgid).copied() {
            Some(idx) => {
                lru.touch(idx);
                idx
            }
            None => lru.insert(tgid, create()),
        };
        update(&mut lru.slots[idx as usize].stat)
    }

    /// Copy of the record; counts as a use.
    pub fn get(&self, tgid: Pid) -> Option<TaskStat> {
        let mut lru = self.inner.lock();
        let idx = lru.index.get(&tgid).copied()?;
        lru.touch(idx);
        Some(lru.slots[idx as usize].stat)
    }

    /// Copy of the record without touching recency.
    pub fn peek(&self, tgid: Pid) -> Option<TaskStat> {
        let lru = self.inner.lock();
        let idx = lru.index.get(&tgid).copied()?;
        Some(lru.slots[idx as usize].stat)
    }

    pub fn contains(&self, tgid: Pid) -> bool {
        self.inner.lock().index.contains_key(&tgid)
    }

    pub fn remove(&self, tgid: Pid) -> Option<TaskStat> {
        self.inner.lock().remove(tgid)
    }

    /// Every record, most recently used first. Recency is left untouched.
    pub fn snapshot(&self) -> Vec<(Pid, TaskStat)> {
        let lru = self.inner.lock();
        let mut out = Vec::with_capacity(lru.index.len());
        out.extend(lru.walk().map(|slot| (slot.tgid, slot.stat)));
        out
    }

    /// Tracked tgids, most recently used first.
    pub fn keys_by_recency(&self) -> Vec<Pid> {
        self.inner.lock().walk().map(|slot| slot.tgid).collect()
    }

    pub fn clear(&self) {
        let mut lru = self.inner.lock();
        let capacity = lru.capacity;
        let evictions = lru.evictions;
        *lru = Lru::new(capacity);
        lru.evictions = evictions;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Records dropped to make room since creation.
    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }
}

impl Default for TaskStatsTable {
    fn default() -> Self {
        Self::new()
    }
}
