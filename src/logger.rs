//! Kernel-side log plumbing.
//!
//! The `k*` macros funnel through [`log`] here, which applies the crate-local
//! level gate and then hands the record to the `log` facade under the
//! `sonar_sched` target. Whatever logger the host installs (a kernel trace
//! pipe shim, `env_logger` in the userspace binary, nothing at all in unit
//! tests) decides where the line ends up.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

pub const TARGET: &str = "sonar_sched";

/// Whether `ktrace!` records are emitted at all.
pub const TRACE_HOOKS: bool = cfg!(feature = "debug_hooks");

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::INFO.priority());

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    ERROR,
    WARN,
    INFO,
    DEBUG,
    TRACE,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::ERROR => "ERROR",
            LogLevel::WARN => "WARN",
            LogLevel::INFO => "INFO",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::TRACE => "TRACE",
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            LogLevel::ERROR => 0,
            LogLevel::WARN => 1,
            LogLevel::INFO => 2,
            LogLevel::DEBUG => 3,
            LogLevel::TRACE => 4,
        }
    }

    const fn from_priority(value: u8) -> Self {
        match value {
            0 => LogLevel::ERROR,
            1 => LogLevel::WARN,
            2 => LogLevel::INFO,
            3 => LogLevel::DEBUG,
            _ => LogLevel::TRACE,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::ERROR)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::WARN)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::INFO)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::DEBUG)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::TRACE)
        } else {
            None
        }
    }

    pub const fn to_log(self) -> log::Level {
        match self {
            LogLevel::ERROR => log::Level::Error,
            LogLevel::WARN => log::Level::Warn,
            LogLevel::INFO => log::Level::Info,
            LogLevel::DEBUG => log::Level::Debug,
            LogLevel::TRACE => log::Level::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level.priority() > LOG_LEVEL.load(Ordering::Relaxed) {
        return;
    }
    log::log!(target: TARGET, level.to_log(), "{}", args);
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Picks the first `log=<level>` or `loglevel=<level>` token out of a
/// whitespace separated option string.
pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    for token in cmdline.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}
