//! sonar: userspace side of sonar-sched
//!
//! Attaches one of the kernel-side scheduling policies, samples its task
//! statistics table once per tick and ranks the busiest processes over a
//! sliding window.

pub mod attach;
pub mod config;
pub mod duration;
pub mod error;
pub mod filter;
pub mod monitor;
pub mod ranking;
pub mod report;
pub mod sim;

pub use attach::{AttachGuard, Attachment};
pub use config::{Cli, Config, PolicyChoice, SimConfig};
pub use duration::{format_ns, interval_for_bpm, parse_duration, DurationNs};
pub use error::{Result, SonarError};
pub use filter::{
    AllProcesses, ProcessEntry, ProcessFilter, ProcessSource, ProcessTreeFilter, ProcfsSource,
};
pub use monitor::{Monitor, MonitorOptions, MonitorStats};
pub use ranking::{ProcessInfo, RankingEngine, UpdateSummary};
pub use report::{LogReporter, RankedProcess, Reporter, TickReport};
pub use sim::{SimAttachment, SimRuntime};
