//! Duration strings
//!
//! Durations on the command line and in config files are written as
//! `<number>[.<fraction>]<unit>` with unit `s`, `ms`, `us` or `ns`, e.g.
//! `5ms` or `0.25s`. Internally everything is nanoseconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SonarError};

const UNITS: [(&str, u64); 4] = [
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
    ("s", 1_000_000_000),
];

/// Parses a duration string into nanoseconds.
pub fn parse_duration(text: &str) -> Result<u64> {
    let invalid = || SonarError::Config(format!("invalid duration string: {:?}", text));

    let (number, scale) = UNITS
        .iter()
        .find_map(|(suffix, scale)| text.strip_suffix(suffix).map(|n| (n, *scale)))
        .ok_or_else(invalid)?;

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (number, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || frac_part.is_some_and(|f| !all_digits(f)) {
        return Err(invalid());
    }

    let whole: u64 = int_part.parse().map_err(|_| invalid())?;
    let mut ns = whole.checked_mul(scale).ok_or_else(invalid)?;

    if let Some(frac) = frac_part {
        // digits beyond nanosecond resolution are truncated
        let mut place = scale;
        for digit in frac.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            ns = ns
                .checked_add(u64::from(digit - b'0') * place)
                .ok_or_else(invalid)?;
        }
    }
    Ok(ns)
}

/// Renders `ns` in the largest unit below which it stays >= 1, with
/// `decimals` fractional digits. Values below 1us are printed as integers.
pub fn format_ns(ns: u64, decimals: usize) -> String {
    if ns < 1_000 {
        format!("{}ns", ns)
    } else if ns < 1_000_000 {
        format!("{:.*}us", decimals, ns as f64 / 1_000.0)
    } else if ns < 1_000_000_000 {
        format!("{:.*}ms", decimals, ns as f64 / 1_000_000.0)
    } else {
        format!("{:.*}s", decimals, ns as f64 / 1_000_000_000.0)
    }
}

/// Sampling interval for a beat rate: one tick per eighth note.
pub fn interval_for_bpm(bpm: u32) -> u64 {
    if bpm == 0 {
        return 0;
    }
    60_000_000_000 / u64::from(bpm) / 2
}

/// A duration in nanoseconds that reads and writes as a duration string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DurationNs(pub u64);

impl DurationNs {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000_000)
    }

    pub fn as_std(self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0)
    }
}

impl FromStr for DurationNs {
    type Err = SonarError;

    fn from_str(s: &str) -> Result<Self> {
        parse_duration(s).map(DurationNs)
    }
}

impl fmt::Display for DurationNs {
    /// Exact shortest form, so the string parses back to the same value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = self.0;
        if ns != 0 && ns % 1_000_000_000 == 0 {
            write!(f, "{}s", ns / 1_000_000_000)
        } else if ns != 0 && ns % 1_000_000 == 0 {
            write!(f, "{}ms", ns / 1_000_000)
        } else if ns != 0 && ns % 1_000 == 0 {
            write!(f, "{}us", ns / 1_000)
        } else {
            write!(f, "{}ns", ns)
        }
    }
}

impl Serialize for DurationNs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DurationNs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
