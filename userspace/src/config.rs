//! Configuration
//!
//! Values come from three layers, lowest precedence first: built-in
//! defaults, an optional TOML file (`--config`), and command line flags.
//! [`Config::validate`] runs before anything is attached.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use sonar_sched::logger::{parse_level_directive, LogLevel};
use sonar_sched::scheduler::MAX_CPUS;
use sonar_sched::{PolicyKind, Settings};

use crate::duration::{interval_for_bpm, DurationNs};
use crate::error::{Result, SonarError};

/// Scheduling policy as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyChoice {
    Fifo,
    #[value(name = "vtime")]
    VTime,
    Lottery,
}

impl From<PolicyChoice> for PolicyKind {
    fn from(choice: PolicyChoice) -> Self {
        match choice {
            PolicyChoice::Fifo => PolicyKind::Fifo,
            PolicyChoice::VTime => PolicyKind::VTime,
            PolicyChoice::Lottery => PolicyKind::Lottery,
        }
    }
}

/// Simulated kernel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Number of simulated CPUs
    pub cpus: u32,
    /// Number of synthetic tasks besides the kernel thread
    pub tasks: u32,
    /// Seed of the workload generator
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cpus: num_cpus::get().clamp(1, 8) as u32,
            tasks: 12,
            seed: 0x50_4e_41_52,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub policy: PolicyChoice,
    /// Ordinary tasks only run on CPUs `0..cores`; -1 for all
    pub cores: i32,
    pub slice: DurationNs,
    pub scale_slice: bool,
    /// Sampling interval; derived from `bpm` when unset
    pub interval: Option<DurationNs>,
    pub bpm: u32,
    pub window_size: usize,
    /// Length of each ranking
    pub top: usize,
    /// Process name substrings; empty shows everything
    pub filter: Vec<String>,
    /// Drop trackers whose runtime delta repeats exactly
    pub stall_detection: bool,
    /// Options for the kernel side, e.g. `loglevel=debug`
    pub kernel_options: String,
    pub sim: SimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: PolicyChoice::Fifo,
            cores: -1,
            slice: DurationNs::from_millis(5),
            scale_slice: false,
            interval: None,
            bpm: 120,
            window_size: 10,
            top: 5,
            filter: Vec::new(),
            stall_detection: true,
            kernel_options: String::new(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Defaults, then the file named by `--config`, then the flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cli.apply(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SonarError::Config(msg.to_string()));

        if self.window_size == 0 {
            return fail("window_size must be at least 1");
        }
        if self.top == 0 {
            return fail("top must be at least 1");
        }
        if self.cores < -1 || self.cores == 0 {
            return fail("cores must be -1 (all) or a positive count");
        }
        if self.slice.0 == 0 {
            return fail("slice must be longer than 0ns");
        }
        if self.bpm == 0 {
            return fail("bpm must be at least 1");
        }
        if self.interval.is_some_and(|i| i.0 == 0) {
            return fail("interval must be longer than 0ns");
        }
        if self.sim.cpus == 0 || self.sim.cpus as usize > MAX_CPUS {
            return Err(SonarError::Config(format!(
                "sim.cpus must be between 1 and {}",
                MAX_CPUS
            )));
        }
        Ok(())
    }

    /// Policy knobs handed to the hooks.
    pub fn settings(&self) -> Settings {
        Settings::new(self.slice.0, self.cores, self.scale_slice)
    }

    /// Level of the scheduler's own log, from a `loglevel=` directive in
    /// `kernel_options` or else from `verbose`.
    pub fn kernel_log_level(&self, verbose: bool) -> LogLevel {
        parse_level_directive(&self.kernel_options).unwrap_or(if verbose {
            LogLevel::DEBUG
        } else {
            LogLevel::INFO
        })
    }

    pub fn interval_ns(&self) -> u64 {
        match self.interval {
            Some(interval) => interval.0,
            None => interval_for_bpm(self.bpm),
        }
    }
}

/// Linux scheduler that ranks the busiest processes by runtime and dispatches
#[derive(Debug, Parser)]
#[command(name = "sonar", version, about)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Scheduling policy
    #[arg(short = 't', long = "type", value_enum)]
    pub policy: Option<PolicyChoice>,

    /// Number of cores ordinary tasks may use, -1 for all
    #[arg(short, long, allow_negative_numbers = true)]
    pub cores: Option<i32>,

    /// Time slice, e.g. 5ms
    #[arg(short, long)]
    pub slice: Option<DurationNs>,

    /// Scale the slice by the number of queued tasks
    #[arg(short = 'a', long)]
    pub scale_slice: bool,

    /// Process name substrings; children of matching processes are shown too
    #[arg(short, long, value_delimiter = ',')]
    pub filter: Vec<String>,

    /// Beats per minute; one sample every eighth note
    #[arg(long)]
    pub bpm: Option<u32>,

    /// Sampling interval, overrides --bpm
    #[arg(long)]
    pub interval: Option<DurationNs>,

    /// Sliding window size in ticks
    #[arg(long)]
    pub window_size: Option<usize>,

    /// Number of processes per ranking
    #[arg(long)]
    pub top: Option<usize>,

    /// Keep trackers whose runtime delta repeats exactly
    #[arg(long)]
    pub no_stall_detection: bool,

    /// Kernel side options, e.g. "loglevel=trace"
    #[arg(long, value_name = "OPTIONS")]
    pub kernel_options: Option<String>,

    /// Simulated CPUs
    #[arg(long)]
    pub sim_cpus: Option<u32>,

    /// Synthetic tasks in the simulation
    #[arg(long)]
    pub sim_tasks: Option<u32>,

    /// Workload seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many ticks
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overrides the fields set on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(cores) = self.cores {
            config.cores = cores;
        }
        if let Some(slice) = self.slice {
            config.slice = slice;
        }
        if self.scale_slice {
            config.scale_slice = true;
        }
        if !self.filter.is_empty() {
            config.filter = self.filter.clone();
        }
        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(interval) = self.interval {
            config.interval = Some(interval);
        }
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(top) = self.top {
            config.top = top;
        }
        if self.no_stall_detection {
            config.stall_detection = false;
        }
        if let Some(options) = &self.kernel_options {
            config.kernel_options = options.clone();
        }
        if let Some(cpus) = self.sim_cpus {
            config.sim.cpus = cpus;
        }
        if let Some(tasks) = self.sim_tasks {
            config.sim.tasks = tasks;
        }
        if let Some(seed) = self.seed {
            config.sim.seed = seed;
        }
    }
}
