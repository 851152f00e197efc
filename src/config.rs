//! Calibration settings.
//!
//! Paths default to the Linux sysfs/procfs locations; tests and fixtures
//! point them at their own files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TscError};
use crate::frequency::{CPUINFO_MAX_FREQ_PATH, CPUINFO_PATH, TSC_FREQ_KHZ_PATH};
use crate::overhead::DEFAULT_OVERHEAD_SAMPLES;
use crate::units::TimeUnit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Empty brackets sampled when estimating overhead
    pub overhead_samples: usize,
    /// Exact TSC frequency in kHz
    pub tsc_freq_path: PathBuf,
    /// Maximum CPU clock in kHz
    pub max_freq_path: PathBuf,
    /// `label: value` table carrying `cpu MHz`
    pub cpuinfo_path: PathBuf,
    /// Length of the sleep used by the last-resort frequency source
    pub sleep_interval_ms: u64,
    /// Unit returned by `CalibrationContext::measure`
    pub unit: TimeUnit,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            overhead_samples: DEFAULT_OVERHEAD_SAMPLES,
            tsc_freq_path: PathBuf::from(TSC_FREQ_KHZ_PATH),
            max_freq_path: PathBuf::from(CPUINFO_MAX_FREQ_PATH),
            cpuinfo_path: PathBuf::from(CPUINFO_PATH),
            sleep_interval_ms: 1000,
            unit: TimeUnit::Nanosecond,
        }
    }
}

impl CalibrationConfig {
    /// Faster calibration for fixtures: fewer samples, shorter sleep
    pub fn quick() -> Self {
        Self {
            overhead_samples: 100,
            sleep_interval_ms: 100,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| TscError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.overhead_samples == 0 {
            return Err(TscError::ConfigError(
                "overhead_samples must be at least 1".to_string(),
            ));
        }
        if self.sleep_interval_ms == 0 {
            return Err(TscError::ConfigError(
                "sleep_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }
}
