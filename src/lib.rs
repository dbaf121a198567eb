//! sonar-sched: kernel-resident scheduling policies
//!
//! This crate holds the data path of a pluggable scheduling-policy framework
//! for an extensible scheduler class. Policies are driven by hook calls
//! (`init`, `enqueue`, `dispatch`, `running`, `stopping`, `enable`) issued by
//! the kernel on arbitrary CPUs, and they maintain a bounded per-task
//! statistics table that userspace samples to rank the busiest processes.
//!
//! Kernel services (monotonic clock, dispatch queues, local run slots,
//! randomness) are reached through the [`scheduler::SchedRuntime`] trait so
//! the same policy code runs on top of a real kernel-extension runtime, the
//! simulated kernel in `userspace/`, or the mock runtime in `tests/`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod logger;
pub mod scheduler;

pub use scheduler::{
    CpuMask, EnqueueFlags, Policy, PolicyContext, PolicyKind, SchedError, SchedOps,
    SchedResult, SchedRuntime, Settings, SettingsCell, Task, TaskFlags, TaskRef, TaskStat,
    TaskStatsTable,
};

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

/// Per-hook tracing; compiled out unless the `debug_hooks` feature is on.
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        if $crate::logger::TRACE_HOOKS {
            $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
        }
    }};
}
