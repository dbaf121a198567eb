//! Policy contract and shared hook logic
//!
//! Every policy implements [`SchedOps`]. The kernel drives a task through
//! *enqueued → dispatched → running → stopped → {enqueued | removed}*,
//! calling the matching hook on whatever CPU the transition happens on.
//!
//! Hooks share one [`PolicyContext`]: the runtime, the [`SettingsCell`],
//! the statistics table, the global virtual clock and the shared dispatch
//! queue. Only `init` can fail; every other hook degrades silently (a
//! missing statistics record is simply created).

use alloc::sync::Arc;
use core::cell::Cell;
use core::fmt;

use spin::RwLock;

use super::dsq::{DispatchQueue, DsqOrdering};
use super::error::{SchedError, SchedResult};
use super::fifo::FifoPolicy;
use super::lottery::LotteryPolicy;
use super::priority::VirtualClock;
use super::runtime::SchedRuntime;
use super::table::TaskStatsTable;
use super::types::{EnqueueFlags, Task, TaskRef, TaskStat, SHARED_DSQ_ID};
use super::vtime::VTimePolicy;
use crate::{kerror, kinfo, ktrace, kwarn};

/// Slice granted when nothing else is configured (5ms)
pub const DEFAULT_SLICE_NS: u64 = 5_000_000;

/// Core limit meaning "every CPU"
pub const ALL_CORES: i32 = -1;

/// Knobs shared by all policies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub slice_ns: u64,
    /// Ordinary tasks only run on CPUs `0..cores`; -1 lifts the limit
    pub cores: i32,
    /// Divide the slice by the queue depth at enqueue time
    pub scale_slice: bool,
}

impl Settings {
    pub const fn new(slice_ns: u64, cores: i32, scale_slice: bool) -> Self {
        Self {
            slice_ns,
            cores,
            scale_slice,
        }
    }

    /// Whether ordinary (unconstrained) tasks may run on `cpu`.
    #[inline]
    pub fn allows_cpu(&self, cpu: u32) -> bool {
        self.cores < 0 || (cpu as i64) < self.cores as i64
    }

    /// Slice for a task enqueued behind `depth` others.
    #[inline]
    pub fn slice_for_depth(&self, depth: usize) -> u64 {
        if self.scale_slice && depth > 0 {
            self.slice_ns / depth as u64
        } else {
            self.slice_ns
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_SLICE_NS, ALL_CORES, false)
    }
}

/// Settings shared with running hooks.
///
/// Replaced as a whole; a hook reads one consistent copy per call.
pub struct SettingsCell {
    inner: RwLock<Settings>,
}

impl SettingsCell {
    pub const fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    #[inline]
    pub fn get(&self) -> Settings {
        *self.inner.read()
    }

    pub fn set(&self, settings: Settings) {
        *self.inner.write() = settings;
    }
}

impl Default for SettingsCell {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Tasks exempt from the core limit: kernel threads and pinned tasks.
#[inline]
pub fn has_constraints(task: &Task, nr_cpu_ids: u32) -> bool {
    task.is_kthread() || task.nr_cpus_allowed() != nr_cpu_ids
}

/// State every hook of an attached policy works on
pub struct PolicyContext {
    runtime: Arc<dyn SchedRuntime>,
    settings: SettingsCell,
    stats: TaskStatsTable,
    clock: VirtualClock,
    shared: RwLock<Option<Arc<DispatchQueue>>>,
}

impl PolicyContext {
    pub fn new(runtime: Arc<dyn SchedRuntime>, settings: Settings) -> Self {
        Self::with_stats(runtime, settings, TaskStatsTable::new())
    }

    pub fn with_stats(
        runtime: Arc<dyn SchedRuntime>,
        settings: Settings,
        stats: TaskStatsTable,
    ) -> Self {
        Self {
            runtime,
            settings: SettingsCell::new(settings),
            stats,
            clock: VirtualClock::new(),
            shared: RwLock::new(None),
        }
    }

    pub fn runtime(&self) -> &dyn SchedRuntime {
        &*self.runtime
    }

    pub fn settings(&self) -> &SettingsCell {
        &self.settings
    }

    pub fn stats(&self) -> &TaskStatsTable {
        &self.stats
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// The shared queue, once `init` has created it.
    pub fn shared_dsq(&self) -> Option<Arc<DispatchQueue>> {
        self.shared.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.read().is_some()
    }

    pub(crate) fn create_shared_dsq(&self, ordering: DsqOrdering) -> SchedResult<()> {
        let mut shared = self.shared.write();
        if shared.is_some() {
            return Err(SchedError::DsqExists(SHARED_DSQ_ID));
        }
        let dsq = self.runtime.create_dsq(SHARED_DSQ_ID, ordering)?;
        *shared = Some(dsq);
        Ok(())
    }

    pub(crate) fn destroy_shared_dsq(&self) {
        let Some(dsq) = self.shared.write().take() else {
            return;
        };
        if let Err(e) = self.runtime.destroy_dsq(dsq.id()) {
            kwarn!("failed to destroy dsq {}: {}", dsq.id(), e);
        }
    }

    /// Whether `task` may be placed on `cpu` under `settings`.
    #[inline]
    pub fn can_run_on(&self, task: &Task, cpu: u32, settings: &Settings) -> bool {
        task.cpus_allowed.test(cpu)
            && (has_constraints(task, self.runtime.nr_cpu_ids()) || settings.allows_cpu(cpu))
    }

    /// Slice for a task about to join `dsq`.
    pub(crate) fn enqueue_slice(&self, dsq: &DispatchQueue) -> u64 {
        self.settings.get().slice_for_depth(dsq.nr_queued())
    }

    fn first_seen(&self, task: &Task) -> TaskStat {
        TaskStat::first_seen(task, has_constraints(task, self.runtime.nr_cpu_ids()))
    }

    /// Marks the task's group running and counts the dispatch.
    pub fn record_running(&self, task: &Task) {
        let now = self.runtime.now_ns();
        self.stats.update_or_create(
            task.tgid,
            || self.first_seen(task),
            |stat| {
                stat.running = true;
                stat.dispatches += 1;
                stat.last_start_ns = now;
            },
        );
    }

    /// Marks the task's group stopped and charges the time since the last
    /// `running`. Returns the charged time, or `None` when the group had no
    /// record (nothing to measure against).
    pub fn record_stopping(&self, task: &Task) -> Option<u64> {
        let now = self.runtime.now_ns();
        let created = Cell::new(false);
        self.stats.update_or_create(
            task.tgid,
            || {
                created.set(true);
                self.first_seen(task)
            },
            |stat| {
                stat.running = false;
                if created.get() {
                    return None;
                }
                let ran = now.saturating_sub(stat.last_start_ns);
                stat.runtime_ns = stat.runtime_ns.saturating_add(ran);
                Some(ran)
            },
        )
    }

    /// Moves the first queued task that may run on `cpu` to its local slot.
    pub(crate) fn dispatch_first(&self, cpu: u32) -> Option<TaskRef> {
        let dsq = self.shared_dsq()?;
        let settings = self.settings.get();
        dsq.take_first(|entry| {
            self.can_run_on(&entry.task, cpu, &settings)
                && self
                    .runtime
                    .move_to_local(cpu, &entry.task, entry.slice_ns, EnqueueFlags::PREEMPT)
        })
    }
}

/// Hook set of a scheduling policy
pub trait SchedOps: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates the shared queue. On error nothing stays registered.
    fn init(&self, ctx: &PolicyContext) -> SchedResult<()>;

    /// Releases the shared queue.
    fn exit(&self, ctx: &PolicyContext) {
        ctx.destroy_shared_dsq();
    }

    fn enqueue(&self, ctx: &PolicyContext, task: &TaskRef, flags: EnqueueFlags);

    /// Called when `cpu` is idle; moves at most one task to it.
    fn dispatch(&self, ctx: &PolicyContext, cpu: u32, prev: Option<&TaskRef>) -> Option<TaskRef>;

    fn running(&self, ctx: &PolicyContext, task: &TaskRef) {
        ctx.record_running(task);
    }

    fn stopping(&self, ctx: &PolicyContext, task: &TaskRef, _runnable: bool) {
        ctx.record_stopping(task);
    }

    /// Called once when a task becomes schedulable under this policy.
    fn enable(&self, _ctx: &PolicyContext, _task: &TaskRef) {}
}

/// Policy selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Fifo,
    VTime,
    Lottery,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Fifo, PolicyKind::VTime, PolicyKind::Lottery];

    pub const fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Fifo => "fifo",
            PolicyKind::VTime => "vtime",
            PolicyKind::Lottery => "lottery",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The policy chosen at startup
pub enum Policy {
    Fifo(FifoPolicy),
    VTime(VTimePolicy),
    Lottery(LotteryPolicy),
}

impl Policy {
    pub fn new(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Fifo => Policy::Fifo(FifoPolicy),
            PolicyKind::VTime => Policy::VTime(VTimePolicy::new()),
            PolicyKind::Lottery => Policy::Lottery(LotteryPolicy),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Fifo(_) => PolicyKind::Fifo,
            Policy::VTime(_) => PolicyKind::VTime,
            Policy::Lottery(_) => PolicyKind::Lottery,
        }
    }

    fn ops(&self) -> &dyn SchedOps {
        match self {
            Policy::Fifo(p) => p,
            Policy::VTime(p) => p,
            Policy::Lottery(p) => p,
        }
    }
}

impl SchedOps for Policy {
    fn name(&self) -> &'static str {
        self.ops().name()
    }

    fn init(&self, ctx: &PolicyContext) -> SchedResult<()> {
        match self.ops().init(ctx) {
            Ok(()) => {
                let s = ctx.settings().get();
                kinfo!(
                    "{}: attached (slice {}ns, cores {}, scale {})",
                    self.name(),
                    s.slice_ns,
                    s.cores,
                    s.scale_slice
                );
                Ok(())
            }
            Err(e) => {
                kerror!("{}: init failed: {}", self.name(), e);
                Err(e)
            }
        }
    }

    fn exit(&self, ctx: &PolicyContext) {
        self.ops().exit(ctx);
        kinfo!("{}: detached", self.name());
    }

    fn enqueue(&self, ctx: &PolicyContext, task: &TaskRef, flags: EnqueueFlags) {
        ktrace!("{}: enqueue pid {} flags {:?}", self.name(), task.pid, flags);
        self.ops().enqueue(ctx, task, flags);
    }

    fn dispatch(&self, ctx: &PolicyContext, cpu: u32, prev: Option<&TaskRef>) -> Option<TaskRef> {
        let moved = self.ops().dispatch(ctx, cpu, prev);
        ktrace!(
            "{}: dispatch cpu {} -> {:?}",
            self.name(),
            cpu,
            moved.as_ref().map(|t| t.pid)
        );
        moved
    }

    fn running(&self, ctx: &PolicyContext, task: &TaskRef) {
        self.ops().running(ctx, task);
    }

    fn stopping(&self, ctx: &PolicyContext, task: &TaskRef, runnable: bool) {
        self.ops().stopping(ctx, task, runnable);
    }

    fn enable(&self, ctx: &PolicyContext, task: &TaskRef) {
        self.ops().enable(ctx, task);
    }
}
