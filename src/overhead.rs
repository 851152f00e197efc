//! Fixed cost of an empty `start()`/`end()` bracket.
//!
//! Noise (interrupts, cache misses, SMIs) only ever inflates a sample, so the
//! minimum over many trials is taken as the instrumentation overhead.

use crate::cycles::{self, CycleCount};

/// Default number of empty brackets sampled.
pub const DEFAULT_OVERHEAD_SAMPLES: usize = 1000;

/// Minimal observed cost of a back-to-back bracket, in cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct OverheadEstimate(CycleCount);

impl OverheadEstimate {
    pub const fn new(cycles: CycleCount) -> Self {
        Self(cycles)
    }

    pub fn cycles(&self) -> CycleCount {
        self.0
    }

    /// Removes the overhead from a raw bracket delta.
    #[inline]
    pub fn correct(&self, delta: CycleCount) -> CycleCount {
        delta.saturating_sub(self.0)
    }
}

/// Brackets an empty workload `samples` times and keeps the smallest delta.
///
/// A sample count of 0 is treated as 1.
pub fn measure_overhead(samples: usize) -> OverheadEstimate {
    measure_overhead_with(samples, |_| {})
}

/// Same as [`measure_overhead`], handing every raw delta to `observe`.
pub fn measure_overhead_with<F>(samples: usize, mut observe: F) -> OverheadEstimate
where
    F: FnMut(CycleCount),
{
    let mut overhead = CycleCount::MAX;
    for _ in 0..samples.max(1) {
        let t0 = cycles::start();
        let t1 = cycles::end();
        let delta = t1.saturating_sub(t0);
        observe(delta);
        overhead = overhead.min(delta);
    }
    OverheadEstimate(overhead)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overhead_is_minimum_of_run() {
        let mut deltas = Vec::new();
        let overhead = measure_overhead_with(500, |d| deltas.push(d));
        assert_eq!(deltas.len(), 500);
        assert!(deltas.iter().all(|&d| overhead.cycles() <= d));
        assert_eq!(Some(&overhead.cycles()), deltas.iter().min());
    }

    #[test]
    fn test_zero_samples_clamped() {
        let mut count = 0;
        let overhead = measure_overhead_with(0, |_| count += 1);
        assert_eq!(count, 1);
        assert!(overhead.cycles() < CycleCount::MAX);
    }

    #[test]
    fn test_correct_saturates() {
        let overhead = OverheadEstimate::new(40);
        assert_eq!(overhead.correct(100), 60);
        assert_eq!(overhead.correct(10), 0);
    }

    #[test]
    fn test_default_overhead_reasonable() {
        let overhead = measure_overhead(DEFAULT_OVERHEAD_SAMPLES);
        // CPUID under a hypervisor can trap, hence the generous ceiling
        assert!(overhead.cycles() < 1_000_000, "overhead = {:?}", overhead);
    }
}
