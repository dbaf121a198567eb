//! Statistics summaries and debugging output
//!
//! Works on snapshots taken with [`TaskStatsTable::snapshot`] so the table
//! lock is never held while formatting.
//!
//! [`TaskStatsTable::snapshot`]: super::table::TaskStatsTable::snapshot

use super::types::{Pid, TaskStat};

/// Aggregate view of one statistics snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub records: usize,
    pub running: usize,
    pub ignored: usize,
    pub total_runtime_ns: u64,
    pub total_dispatches: u64,
}

pub fn summarize(snapshot: &[(Pid, TaskStat)]) -> StatsSummary {
    snapshot
        .iter()
        .fold(StatsSummary::default(), |mut acc, (_, stat)| {
            acc.records += 1;
            acc.running += stat.running as usize;
            acc.ignored += stat.ignored as usize;
            acc.total_runtime_ns = acc.total_runtime_ns.saturating_add(stat.runtime_ns);
            acc.total_dispatches = acc.total_dispatches.saturating_add(stat.dispatches);
            acc
        })
}

/// Logs up to `limit` records followed by the summary line.
pub fn log_table(snapshot: &[(Pid, TaskStat)], limit: usize) {
    crate::kinfo!("=== Task Statistics ===");
    crate::kinfo!(
        "{:<8} {:<16} {:>12} {:>14} {:<7} {:<7}",
        "TGID", "Comm", "Dispatches", "Runtime(ms)", "Running", "Ignored"
    );

    for (tgid, stat) in snapshot.iter().take(limit) {
        crate::kinfo!(
            "{:<8} {:<16} {:>12} {:>14} {:<7} {:<7}",
            tgid,
            stat.comm.as_str(),
            stat.dispatches,
            stat.runtime_ns / 1_000_000,
            stat.running,
            stat.ignored
        );
    }

    let summary = summarize(snapshot);
    crate::kinfo!(
        "{} groups ({} running, {} ignored), {} dispatches, {}ms runtime",
        summary.records,
        summary.running,
        summary.ignored,
        summary.total_dispatches,
        summary.total_runtime_ns / 1_000_000
    );
}
