//! # Multi-Processor Support
//!
//! CPU identifiers, per-CPU state slots and synchronous cross-CPU calls.
//!
//! ## Cross-CPU Calls
//!
//! ```text
//!   CPU 0 (caller)                         CPU 3 (owner)
//!   ──────────────                         ─────────────
//!   run_on(3, f) ──── request ───────────▶ f()  (interrupts off)
//!        │                                   │
//!        └──── blocks until ◀── complete ────┘
//! ```
//!
//! Machine-check registers are per-CPU, so any read-modify-write of a bank
//! register has to execute on the CPU that owns the bank. [`CrossCall`] is
//! the blocking "run on CPU N" primitive the threshold subsystem relies on.

use core::fmt;

pub mod call;
pub mod per_cpu;

pub use call::{CrossCall, LocalCall};
pub use per_cpu::PerCpu;

// =============================================================================
// Constants
// =============================================================================

/// Logical CPU identifier
pub type CpuId = u32;

/// Maximum number of logical CPUs
pub const MAX_CPUS: usize = 256;

// =============================================================================
// Error Type
// =============================================================================

/// SMP Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpError {
    /// CPU index out of range
    InvalidCpu(CpuId),
    /// CPU is not online
    CpuOffline(CpuId),
    /// The platform cannot run code on a remote CPU
    RemoteCallUnsupported(CpuId),
}

impl fmt::Display for SmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmpError::InvalidCpu(cpu) => write!(f, "Invalid CPU {}", cpu),
            SmpError::CpuOffline(cpu) => write!(f, "CPU {} offline", cpu),
            SmpError::RemoteCallUnsupported(cpu) => {
                write!(f, "Cannot run function on remote CPU {}", cpu)
            },
        }
    }
}
