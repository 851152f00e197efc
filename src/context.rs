//! Caller-owned calibration state.
//!
//! A [`CalibrationContext`] holds the bracket overhead and the counter
//! frequency. Build it once, share it by reference, and replace it wholesale
//! with [`CalibrationContext::recalibrate`] when needed. Nothing here locks;
//! concurrent initialization is the caller's job (e.g. `OnceLock`).

use std::hint::black_box;

use tracing::{info, warn};

use crate::config::CalibrationConfig;
use crate::cpu_features::TscFeatures;
use crate::cycles::{self, CycleCount};
use crate::error::Result;
use crate::frequency::{FrequencyEstimate, FrequencyResolver, SourceKind};
use crate::overhead::{measure_overhead, OverheadEstimate};
use crate::units::{cycles_to_unit, TimeUnit};

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationContext {
    overhead: OverheadEstimate,
    frequency: FrequencyEstimate,
    frequency_source: Option<SourceKind>,
    calibrated_cpu: Option<usize>,
    unit: TimeUnit,
}

impl CalibrationContext {
    /// Measures overhead and resolves the frequency per `config`.
    ///
    /// Blocks for the configured sleep interval if every file source fails.
    pub fn calibrate(config: &CalibrationConfig) -> Result<Self> {
        config.validate()?;

        let features = TscFeatures::detect();
        if !features.invariant_tsc {
            warn!(
                features = %features.summary(),
                "TSC is not invariant; frequency may drift with power states"
            );
        }

        let calibrated_cpu = cycles::current_cpu();
        let overhead = measure_overhead(config.overhead_samples);
        let resolution = FrequencyResolver::from_config(config).resolve_detailed();

        info!(
            overhead_cycles = overhead.cycles(),
            frequency = %resolution.estimate,
            cpu = ?calibrated_cpu,
            "TSC calibration complete"
        );

        Ok(Self {
            overhead,
            frequency: resolution.estimate,
            frequency_source: resolution.source,
            calibrated_cpu,
            unit: config.unit,
        })
    }

    /// Context from known estimates, without touching the hardware.
    pub fn from_parts(overhead: OverheadEstimate, frequency: FrequencyEstimate) -> Self {
        Self {
            overhead,
            frequency,
            frequency_source: None,
            calibrated_cpu: None,
            unit: TimeUnit::default(),
        }
    }

    pub fn with_unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Runs a fresh calibration. `self` is left untouched.
    pub fn recalibrate(&self, config: &CalibrationConfig) -> Result<Self> {
        Self::calibrate(config)
    }

    pub fn overhead(&self) -> OverheadEstimate {
        self.overhead
    }

    pub fn frequency(&self) -> FrequencyEstimate {
        self.frequency
    }

    pub fn frequency_source(&self) -> Option<SourceKind> {
        self.frequency_source
    }

    pub fn calibrated_cpu(&self) -> Option<usize> {
        self.calibrated_cpu
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Converts a raw bracket delta, `None` if the frequency is unknown.
    #[inline]
    pub fn elapsed(&self, delta: CycleCount, unit: TimeUnit) -> Option<f64> {
        cycles_to_unit(delta, self.overhead, self.frequency, unit)
    }

    /// Overhead-corrected cycles between two bracket reads.
    #[inline]
    pub fn corrected_cycles(&self, start: CycleCount, end: CycleCount) -> CycleCount {
        self.overhead.correct(end.saturating_sub(start))
    }

    /// Times `f` in the context's unit.
    #[inline]
    pub fn measure<F, T>(&self, f: F) -> (T, Option<f64>)
    where
        F: FnOnce() -> T,
    {
        self.measure_in(self.unit, f)
    }

    #[inline]
    pub fn measure_in<F, T>(&self, unit: TimeUnit, f: F) -> (T, Option<f64>)
    where
        F: FnOnce() -> T,
    {
        let t0 = cycles::start();
        let out = black_box(f());
        let t1 = cycles::end();
        (out, self.elapsed(t1.saturating_sub(t0), unit))
    }
}
