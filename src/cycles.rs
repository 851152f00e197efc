//! Ordered reads of the x86 time-stamp counter.
//!
//! Three distinct contracts:
//! - [`start`]: `CPUID` then `RDTSCP`. Earlier instructions cannot drift past the read.
//! - [`end`]: `RDTSCP` then `CPUID`. Later instructions cannot drift before the read.
//! - [`raw_now`]: plain `RDTSC`, no ordering at all.
//!
//! Deltas are only meaningful between reads taken on the same logical core.

use std::arch::x86_64::{__cpuid, __rdtscp, _rdtsc};
use std::sync::atomic::{compiler_fence, Ordering};

/// Raw counter value since an arbitrary epoch.
pub type CycleCount = u64;

/// Opens a measurement bracket.
#[inline(always)]
pub fn start() -> CycleCount {
    compiler_fence(Ordering::SeqCst);
    let mut aux = 0u32;
    let cycles = unsafe {
        // CPUID drains the pipeline before the counter is sampled
        __cpuid(0);
        __rdtscp(&mut aux)
    };
    compiler_fence(Ordering::SeqCst);
    cycles
}

/// Closes a measurement bracket.
#[inline(always)]
pub fn end() -> CycleCount {
    end_with_aux().0
}

/// Closes a measurement bracket and also returns `IA32_TSC_AUX`.
///
/// On Linux the kernel stores the processor number in the low 12 bits of
/// `TSC_AUX`, so callers can spot a migration between two reads.
#[inline(always)]
pub fn end_with_aux() -> (CycleCount, u32) {
    compiler_fence(Ordering::SeqCst);
    let mut aux = 0u32;
    let cycles = unsafe {
        // RDTSCP waits for earlier instructions; CPUID fences off later ones
        let cycles = __rdtscp(&mut aux);
        __cpuid(0);
        cycles
    };
    compiler_fence(Ordering::SeqCst);
    (cycles, aux)
}

/// Unserialized counter read.
#[inline(always)]
pub fn raw_now() -> CycleCount {
    unsafe { _rdtsc() }
}

/// Logical CPU the calling thread is running on, if the OS will say.
pub fn current_cpu() -> Option<usize> {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        None
    } else {
        Some(cpu as usize)
    }
}
