//! Scheduler subsystem
//!
//! Pluggable policies for an extensible scheduler class. The kernel calls
//! the hooks of exactly one attached [`Policy`] on every CPU; the hooks keep
//! the shared dispatch queue ordered and maintain a bounded per-task-group
//! statistics table that userspace samples.
//!
//! ## Policies
//!
//! - **FIFO**: round-robin over one shared queue in arrival order
//! - **VTime**: weighted fair queuing on per-task virtual time, with a
//!   lock-free global clock that only moves forward
//! - **Lottery**: weight-proportional random draw among the runnable tasks
//!
//! ## Module Organization
//!
//! - `types`: task handles, CPU masks, hook flags, statistics record
//! - `runtime`: the kernel-extension runtime interface and queue registry
//! - `dsq`: dispatch queues
//! - `table`: bounded LRU statistics table
//! - `priority`: virtual time arithmetic and the global clock
//! - `core`: hook contract, settings, policy context and selection
//! - `fifo`, `vtime`, `lottery`: the policies
//! - `stats`: snapshot summaries and debug listing
//! - `error`: error type for the fallible entry points

mod core;
pub mod dsq;
mod error;
mod fifo;
mod lottery;
pub mod priority;
pub mod runtime;
pub mod stats;
pub mod table;
pub mod types;
mod vtime;

pub use self::core::{
    has_constraints, Policy, PolicyContext, PolicyKind, SchedOps, Settings, SettingsCell,
    ALL_CORES, DEFAULT_SLICE_NS,
};
pub use dsq::{DispatchQueue, DsqEntry, DsqOrdering, DsqView, DSQ_SCAN_LIMIT};
pub use error::{SchedError, SchedResult};
pub use fifo::FifoPolicy;
pub use lottery::{draw_winner, LotteryPolicy, LOTTERY_MAX_CANDIDATES};
pub use priority::{clamp_vtime, delta_vtime, is_smaller, VirtualClock, DEFAULT_VTIME_BUDGET};
pub use runtime::{DsqRegistry, SchedRuntime, MAX_DSQS};
pub use stats::{summarize, StatsSummary};
pub use table::{TaskStatsTable, TASK_STATS_CAPACITY};
pub use types::{
    Comm, CpuMask, EnqueueFlags, Pid, Task, TaskFlags, TaskRef, TaskStat, DEFAULT_WEIGHT,
    MAX_CPUS, SCX_SLICE_DFL, SHARED_DSQ_ID, TASK_COMM_LEN,
};
pub use vtime::VTimePolicy;
