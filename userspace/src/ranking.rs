//! Sliding-window ranking of processes
//!
//! Each tick the engine receives a full statistics snapshot and turns the
//! cumulative counters into per-tick deltas. The last `window_size` deltas
//! of every tracked pid are summed, and the sums drive two top-K rankings:
//! by runtime and by dispatch count.
//!
//! A tracker whose counters look corrupted is dropped and rebuilt from
//! scratch the next time its pid shows up:
//! - the runtime counter went backwards (pid reuse after eviction), or
//! - with stall detection on, the runtime delta is exactly the previous one.

use std::collections::{BTreeMap, VecDeque};

use sonar_sched::scheduler::Pid;
use sonar_sched::TaskStat;

/// Window state of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub comm: String,
    last_runtime_ns: u64,
    last_dispatches: u64,
    runtime_deltas: VecDeque<u64>,
    dispatch_deltas: VecDeque<u64>,
    window_runtime_ns: u64,
    window_dispatches: u64,
    tick_runtime_ns: u64,
    tick_dispatches: u64,
}

impl ProcessInfo {
    fn seed(pid: Pid, stat: &TaskStat) -> Self {
        Self {
            pid,
            comm: stat.comm.as_str().to_string(),
            last_runtime_ns: stat.runtime_ns,
            last_dispatches: stat.dispatches,
            runtime_deltas: VecDeque::new(),
            dispatch_deltas: VecDeque::new(),
            window_runtime_ns: 0,
            window_dispatches: 0,
            tick_runtime_ns: 0,
            tick_dispatches: 0,
        }
    }

    /// Folds the next snapshot in. Returns false if the tracker is invalid.
    fn update(&mut self, stat: &TaskStat, window_size: usize, stall_detection: bool) -> bool {
        if stat.runtime_ns < self.last_runtime_ns || stat.dispatches < self.last_dispatches {
            return false;
        }
        let runtime = stat.runtime_ns - self.last_runtime_ns;
        let dispatches = stat.dispatches - self.last_dispatches;
        if stall_detection && runtime == self.tick_runtime_ns {
            return false;
        }

        self.last_runtime_ns = stat.runtime_ns;
        self.last_dispatches = stat.dispatches;
        self.tick_runtime_ns = runtime;
        self.tick_dispatches = dispatches;
        if !stat.comm.is_empty() {
            self.comm = stat.comm.as_str().to_string();
        }

        push_window(&mut self.runtime_deltas, &mut self.window_runtime_ns, runtime, window_size);
        push_window(
            &mut self.dispatch_deltas,
            &mut self.window_dispatches,
            dispatches,
            window_size,
        );
        true
    }

    /// Runtime summed over the window
    pub fn window_runtime_ns(&self) -> u64 {
        self.window_runtime_ns
    }

    pub fn window_dispatches(&self) -> u64 {
        self.window_dispatches
    }

    /// Runtime gained during the last tick
    pub fn tick_runtime_ns(&self) -> u64 {
        self.tick_runtime_ns
    }

    pub fn tick_dispatches(&self) -> u64 {
        self.tick_dispatches
    }

    pub fn runtime_changed(&self) -> bool {
        self.tick_runtime_ns > 0
    }

    pub fn dispatches_changed(&self) -> bool {
        self.tick_dispatches > 0
    }

    /// Number of deltas currently in the window
    pub fn samples(&self) -> usize {
        self.runtime_deltas.len()
    }
}

fn push_window(deltas: &mut VecDeque<u64>, sum: &mut u64, delta: u64, window_size: usize) {
    deltas.push_back(delta);
    if deltas.len() > window_size {
        if let Some(oldest) = deltas.pop_front() {
            *sum -= oldest;
        }
    }
    *sum += delta;
}

/// Outcome of one [`RankingEngine::update`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub tracked: usize,
    pub created: usize,
    pub dropped_invalid: usize,
    pub removed: usize,
}

pub struct RankingEngine {
    window_size: usize,
    stall_detection: bool,
    trackers: BTreeMap<Pid, ProcessInfo>,
    ticks: u64,
}

impl RankingEngine {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            stall_detection: true,
            trackers: BTreeMap::new(),
            ticks: 0,
        }
    }

    /// With stall detection off only regressing counters invalidate a tracker.
    pub fn with_stall_detection(mut self, enabled: bool) -> Self {
        self.stall_detection = enabled;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of updates processed so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.trackers.get(&pid)
    }

    /// Folds one full statistics snapshot in. Pids rejected by `visible` or
    /// missing from the snapshot stop being tracked.
    pub fn update<F>(&mut self, snapshot: &[(Pid, TaskStat)], visible: F) -> UpdateSummary
    where
        F: Fn(Pid) -> bool,
    {
        let mut summary = UpdateSummary::default();
        let current: BTreeMap<Pid, &TaskStat> = snapshot
            .iter()
            .filter(|(pid, _)| visible(*pid))
            .map(|(pid, stat)| (*pid, stat))
            .collect();

        let before = self.trackers.len();
        self.trackers.retain(|pid, _| current.contains_key(pid));
        summary.removed = before - self.trackers.len();

        for (pid, stat) in current {
            match self.trackers.get_mut(&pid) {
                None => {
                    self.trackers.insert(pid, ProcessInfo::seed(pid, stat));
                    summary.created += 1;
                }
                Some(info) => {
                    if !info.update(stat, self.window_size, self.stall_detection) {
                        log::debug!("dropping tracker of pid {}: inconsistent counters", pid);
                        self.trackers.remove(&pid);
                        summary.dropped_invalid += 1;
                    }
                }
            }
        }

        self.ticks += 1;
        summary.tracked = self.trackers.len();
        summary
    }

    fn top_by<K>(&self, k: usize, key: K) -> Vec<&ProcessInfo>
    where
        K: Fn(&ProcessInfo) -> u64,
    {
        let mut ranked: Vec<&ProcessInfo> = self.trackers.values().collect();
        // stable: ties keep pid order
        ranked.sort_by(|a, b| key(b).cmp(&key(a)));
        ranked.truncate(k);
        ranked
    }

    /// Top `k` processes by windowed runtime, largest first
    pub fn top_by_runtime(&self, k: usize) -> Vec<&ProcessInfo> {
        self.top_by(k, ProcessInfo::window_runtime_ns)
    }

    /// Top `k` processes by windowed dispatch count, largest first
    pub fn top_by_dispatches(&self, k: usize) -> Vec<&ProcessInfo> {
        self.top_by(k, ProcessInfo::window_dispatches)
    }

    pub fn clear(&mut self) {
        self.trackers.clear();
    }
}
