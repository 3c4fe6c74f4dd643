//! # Time Stamp Counter (TSC)
//!
//! The TSC is a 64-bit register present on all x86_64 processors that
//! counts processor cycles. On CPUs with invariant TSC it ticks at a
//! constant rate in every power state and is synchronized across cores,
//! which makes it a good timestamp for error records.

use super::Clock;

/// Read the Time Stamp Counter
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read() -> u64 {
    let low: u32;
    let high: u32;
    unsafe {
        core::arch::asm!(
            "rdtsc",
            out("eax") low,
            out("edx") high,
            options(nostack, nomem, preserves_flags),
        );
    }
    ((high as u64) << 32) | (low as u64)
}

/// TSC clock source
///
/// Timestamps are raw TSC ticks offset by the boot value, so the first
/// record after boot carries a small number.
#[derive(Debug)]
pub struct Tsc {
    /// TSC value captured at construction
    boot: u64,
}

impl Tsc {
    /// Create a clock whose epoch is "now"
    pub fn new() -> Self {
        Self {
            boot: Self::raw(),
        }
    }

    fn raw() -> u64 {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "x86_64")] {
                read()
            } else {
                0
            }
        }
    }
}

impl Default for Tsc {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for Tsc {
    fn timestamp(&self) -> u64 {
        Self::raw().wrapping_sub(self.boot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsc_monotonic() {
        let tsc = Tsc::new();
        let first = tsc.timestamp();
        let second = tsc.timestamp();
        assert!(second >= first);
    }
}
