//! TSC Feature Detection using CPUID
//!
//! Reports whether the counter exists, whether `RDTSCP` is available, and
//! whether the TSC ticks at a constant rate across P-/C-states.

use std::arch::x86_64::{__cpuid, __get_cpuid_max};

/// Detected time-stamp counter capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TscFeatures {
    pub has_tsc: bool,
    pub has_rdtscp: bool,
    pub invariant_tsc: bool,
}

impl TscFeatures {
    /// Detect TSC features using CPUID instruction
    pub fn detect() -> Self {
        let mut features = TscFeatures::default();

        unsafe {
            // Basic feature flags (CPUID EAX=1)
            let cpuid1 = __cpuid(1);
            features.has_tsc = (cpuid1.edx & (1 << 4)) != 0;

            let (max_extended, _) = __get_cpuid_max(0x8000_0000);

            // RDTSCP (CPUID EAX=0x80000001, EDX bit 27)
            if max_extended >= 0x8000_0001 {
                let ext1 = __cpuid(0x8000_0001);
                features.has_rdtscp = (ext1.edx & (1 << 27)) != 0;
            }

            // Invariant TSC (CPUID EAX=0x80000007, EDX bit 8)
            if max_extended >= 0x8000_0007 {
                let ext7 = __cpuid(0x8000_0007);
                features.invariant_tsc = (ext7.edx & (1 << 8)) != 0;
            }
        }

        features
    }

    /// Whether the `start`/`end` bracket can run on this CPU
    pub fn supports_brackets(&self) -> bool {
        self.has_tsc && self.has_rdtscp
    }

    /// Get a summary of detected features
    pub fn summary(&self) -> String {
        let mut features = vec![];
        if self.has_tsc {
            features.push("TSC");
        }
        if self.has_rdtscp {
            features.push("RDTSCP");
        }
        if self.invariant_tsc {
            features.push("invariant");
        }
        features.join(", ")
    }
}
