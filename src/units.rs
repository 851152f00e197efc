//! Time granularity and cycle-to-time conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cycles::CycleCount;
use crate::error::TscError;
use crate::frequency::FrequencyEstimate;
use crate::overhead::OverheadEstimate;

/// Output granularity for elapsed times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Nanosecond,
    Microsecond,
    Millisecond,
}

/// Units per second for `unit`.
#[inline]
pub const fn scale_for(unit: TimeUnit) -> u64 {
    match unit {
        TimeUnit::Nanosecond => 1_000_000_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Millisecond => 1_000,
    }
}

/// `(delta - overhead) / frequency * scale_for(unit)`.
///
/// Returns `None` when the frequency is the unknown sentinel.
#[inline]
pub fn cycles_to_unit(
    delta: CycleCount,
    overhead: OverheadEstimate,
    frequency: FrequencyEstimate,
    unit: TimeUnit,
) -> Option<f64> {
    if frequency.is_unknown() {
        return None;
    }
    let corrected = overhead.correct(delta);
    Some(corrected as f64 / frequency.as_hz() as f64 * scale_for(unit) as f64)
}

impl TimeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Nanosecond => "ns",
            TimeUnit::Microsecond => "us",
            TimeUnit::Millisecond => "ms",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for TimeUnit {
    type Err = TscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ns" | "nanosecond" => Ok(TimeUnit::Nanosecond),
            "us" | "microsecond" => Ok(TimeUnit::Microsecond),
            "ms" | "millisecond" => Ok(TimeUnit::Millisecond),
            other => Err(TscError::ConfigError(format!("Unknown time unit '{}'", other))),
        }
    }
}
