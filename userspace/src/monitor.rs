//! Sampling loop
//!
//! One tick: refresh the process filter, snapshot the statistics table,
//! feed the ranking engine, hand the rankings to the reporter, then sleep
//! out the rest of the interval. Ticks never overlap. The attachment is
//! detached on every way out of [`Monitor::run`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::attach::{AttachGuard, Attachment};
use crate::config::Config;
use crate::error::Result;
use crate::filter::ProcessFilter;
use crate::ranking::{RankingEngine, UpdateSummary};
use crate::report::{Reporter, TickReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub window_size: usize,
    pub top: usize,
    pub stall_detection: bool,
    /// Stop after this many ticks
    pub max_ticks: Option<u64>,
}

impl MonitorOptions {
    pub fn from_config(config: &Config, max_ticks: Option<u64>) -> Self {
        Self {
            interval: Duration::from_nanos(config.interval_ns()),
            window_size: config.window_size,
            top: config.top,
            stall_detection: config.stall_detection,
            max_ticks,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub ticks: u64,
    pub reports: u64,
}

pub struct Monitor {
    options: MonitorOptions,
    engine: RankingEngine,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(options: MonitorOptions) -> Self {
        let engine =
            RankingEngine::new(options.window_size).with_stall_detection(options.stall_detection);
        Self {
            options,
            engine,
            stats: MonitorStats::default(),
        }
    }

    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    /// Runs until `shutdown` is set, the attachment goes away, `max_ticks`
    /// is reached or a tick fails. Consumes and detaches `guard`.
    pub fn run<A, F, R>(
        &mut self,
        guard: AttachGuard<A>,
        filter: &mut F,
        reporter: &mut R,
        shutdown: &AtomicBool,
    ) -> Result<MonitorStats>
    where
        A: Attachment,
        F: ProcessFilter + ?Sized,
        R: Reporter + ?Sized,
    {
        let outcome = self.run_ticks(&guard, filter, reporter, shutdown);

        let name = guard.get().map(|a| a.name().to_string()).unwrap_or_default();
        if let Err(e) = guard.detach() {
            log::warn!("detaching {} failed: {}", name, e);
        }
        outcome.map(|()| self.stats)
    }

    fn run_ticks<A, F, R>(
        &mut self,
        guard: &AttachGuard<A>,
        filter: &mut F,
        reporter: &mut R,
        shutdown: &AtomicBool,
    ) -> Result<()>
    where
        A: Attachment,
        F: ProcessFilter + ?Sized,
        R: Reporter + ?Sized,
    {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                log::info!("shutdown requested after {} ticks", self.stats.ticks);
                return Ok(());
            }
            if !guard.is_attached() {
                log::warn!("policy is no longer attached, stopping");
                return Ok(());
            }
            if self.options.max_ticks.is_some_and(|max| self.stats.ticks >= max) {
                return Ok(());
            }

            let started = Instant::now();
            let summary = self.tick(guard, filter, reporter)?;
            let elapsed = started.elapsed();
            log::debug!(
                "tick {} took {:?}: {} tracked, {} new, {} invalid, {} gone",
                self.stats.ticks,
                elapsed,
                summary.tracked,
                summary.created,
                summary.dropped_invalid,
                summary.removed
            );

            if let Some(rest) = self.options.interval.checked_sub(elapsed) {
                thread::sleep(rest);
            }
        }
    }

    fn tick<A, F, R>(
        &mut self,
        guard: &AttachGuard<A>,
        filter: &mut F,
        reporter: &mut R,
    ) -> Result<UpdateSummary>
    where
        A: Attachment,
        F: ProcessFilter + ?Sized,
        R: Reporter + ?Sized,
    {
        filter.refresh()?;
        let snapshot = guard.task_stats()?;
        let summary = self.engine.update(&snapshot, |pid| filter.contains(pid));
        self.stats.ticks += 1;

        // the first tick only seeds the trackers
        if self.stats.ticks > 1 {
            let report = TickReport::from_engine(self.stats.ticks, &self.engine, self.options.top);
            reporter.report(&report)?;
            self.stats.reports += 1;
        }
        Ok(summary)
    }
}
