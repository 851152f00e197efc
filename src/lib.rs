//! Nanosecond-precision elapsed-time measurement on the x86 time-stamp counter.
//!
//! Measurements are bracketed with [`cycles::start`] / [`cycles::end`] and
//! converted through a caller-owned [`CalibrationContext`], which holds the
//! bracket overhead and the counter frequency.

#[cfg(not(target_arch = "x86_64"))]
compile_error!("nanotsc requires an x86_64 target with RDTSC/RDTSCP");

pub mod config;
pub mod context;
pub mod cpu_features;
pub mod cycles;
pub mod error;
pub mod frequency;
pub mod overhead;
pub mod units;

pub use config::CalibrationConfig;
pub use context::CalibrationContext;
pub use cycles::CycleCount;
pub use error::{Result, TscError};
pub use frequency::{FrequencyEstimate, FrequencyResolver, FrequencySource};
pub use overhead::{measure_overhead, OverheadEstimate};
pub use units::{scale_for, TimeUnit};
