//! Per-tick ranking reports

use std::fmt;

use sonar_sched::scheduler::Pid;

use crate::duration::format_ns;
use crate::error::Result;
use crate::ranking::{ProcessInfo, RankingEngine};

/// One row of a ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedProcess {
    pub pid: Pid,
    pub comm: String,
    pub window_runtime_ns: u64,
    pub window_dispatches: u64,
    pub tick_runtime_ns: u64,
    pub tick_dispatches: u64,
    pub runtime_changed: bool,
    pub dispatches_changed: bool,
}

impl From<&ProcessInfo> for RankedProcess {
    fn from(info: &ProcessInfo) -> Self {
        Self {
            pid: info.pid,
            comm: info.comm.clone(),
            window_runtime_ns: info.window_runtime_ns(),
            window_dispatches: info.window_dispatches(),
            tick_runtime_ns: info.tick_runtime_ns(),
            tick_dispatches: info.tick_dispatches(),
            runtime_changed: info.runtime_changed(),
            dispatches_changed: info.dispatches_changed(),
        }
    }
}

impl fmt::Display for RankedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>7} {:<16} {:>12} {:>8}",
            self.pid,
            self.comm,
            format_ns(self.window_runtime_ns, 2),
            self.window_dispatches
        )?;
        if self.runtime_changed || self.dispatches_changed {
            write!(
                f,
                "  +{} +{}",
                format_ns(self.tick_runtime_ns, 2),
                self.tick_dispatches
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub top_runtime: Vec<RankedProcess>,
    pub top_dispatches: Vec<RankedProcess>,
}

impl TickReport {
    pub fn from_engine(tick: u64, engine: &RankingEngine, top: usize) -> Self {
        Self {
            tick,
            top_runtime: engine.top_by_runtime(top).into_iter().map(Into::into).collect(),
            top_dispatches: engine
                .top_by_dispatches(top)
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

/// Consumer of the rankings
pub trait Reporter {
    fn report(&mut self, report: &TickReport) -> Result<()>;
}

/// Writes both rankings to the log
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, report: &TickReport) -> Result<()> {
        log::info!("tick {}: top by runtime", report.tick);
        for (rank, p) in report.top_runtime.iter().enumerate() {
            log::info!("  #{} {}", rank + 1, p);
        }
        log::info!("tick {}: top by dispatches", report.tick);
        for (rank, p) in report.top_dispatches.iter().enumerate() {
            log::info!("  #{} {}", rank + 1, p);
        }
        Ok(())
    }
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, report: &TickReport) -> Result<()> {
        (**self).report(report)
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, report: &TickReport) -> Result<()> {
        (**self).report(report)
    }
}
