//! # Extended Local Vector Table
//!
//! AMD processors extend the Local APIC with up to four additional LVT
//! entries (EILVT) at register offsets `0x500 + 0x10 * n`. Machine-check
//! threshold and deferred-error interrupts are delivered through them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         EXTENDED LVT                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   EilvtTable (shared by every CPU)                                   │
//! │   ┌──────────┬──────────┬──────────┬──────────┐                      │
//! │   │ offset 0 │ offset 1 │ offset 2 │ offset 3 │  AtomicU32, CAS       │
//! │   └──────────┴──────────┴──────────┴──────────┘                      │
//! │          ▲ reserve                                                   │
//! │   ┌──────┴──────────────────────────────────────────────┐           │
//! │   │ ExtendedLvt::setup_eilvt(cpu, offset, vector, ...)   │           │
//! │   │   1. reserve offset for vector system-wide           │           │
//! │   │   2. check the CPU's current entry is changeable     │           │
//! │   │   3. write APIC_EILVTn on that CPU                   │           │
//! │   └─────────────────────────────────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An offset reserved for one vector can be claimed again by any CPU for the
//! same vector, but never for a different one until it is released by a
//! masked-only write.

use core::fmt;

use crate::arch::x86_64::smp::CpuId;

pub mod eilvt;

pub use eilvt::{set_lapic_base, EilvtTable, XApicEilvt};

// =============================================================================
// Constants
// =============================================================================

/// Number of extended LVT entries
pub const EILVT_NR_MAX: usize = 4;

/// Register offset of the first extended LVT entry
pub const APIC_EILVT0: u32 = 0x500;

/// Stride between extended LVT entries
pub const APIC_EILVT_STRIDE: u32 = 0x10;

/// Mask bit of an LVT entry
pub const APIC_EILVT_MASKED: u32 = 1 << 16;

/// Vector used for machine-check threshold interrupts
pub const THRESHOLD_APIC_VECTOR: u8 = 0xF9;

/// Vector used for deferred-error interrupts
pub const DEFERRED_ERROR_VECTOR: u8 = 0xF4;

/// Register offset of extended LVT entry `n`
#[inline]
pub const fn eilvt_register(offset: u8) -> u32 {
    APIC_EILVT0 + APIC_EILVT_STRIDE * offset as u32
}

// =============================================================================
// Error Type
// =============================================================================

/// APIC Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApicError {
    /// APIC is not present or not mapped
    NotPresent,
    /// Offset outside the extended LVT
    InvalidOffset(u8),
    /// Offset already reserved for another vector by some CPU
    OffsetReserved {
        /// Requested offset
        offset: u8,
        /// Vector currently holding the reservation
        vector: u8,
    },
    /// This CPU's entry is programmed for another vector
    RegisterBusy {
        /// Requested offset
        offset: u8,
        /// Vector currently programmed
        vector: u8,
    },
    /// Entry programming requested for a CPU other than the executing one
    RemoteCpu(CpuId),
}

impl fmt::Display for ApicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApicError::NotPresent => write!(f, "APIC not present"),
            ApicError::InvalidOffset(offset) => write!(f, "Invalid LVT offset {}", offset),
            ApicError::OffsetReserved { offset, vector } => write!(
                f,
                "LVT offset {} already in use for vector {:#04x} on another cpu",
                offset, vector
            ),
            ApicError::RegisterBusy { offset, vector } => write!(
                f,
                "LVT offset {} already in use for vector {:#04x} on this cpu",
                offset, vector
            ),
            ApicError::RemoteCpu(cpu) => write!(f, "LVT access targeted remote cpu {}", cpu),
        }
    }
}

// =============================================================================
// Message Type
// =============================================================================

/// Delivery mode of an extended LVT entry (bits 10:8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EilvtMessage {
    /// Fixed vector
    Fixed = 0b000,
    /// SMI
    Smi = 0b010,
    /// NMI
    Nmi = 0b100,
    /// External interrupt
    ExtInt = 0b111,
}

/// Encode an extended LVT entry
#[inline]
pub const fn eilvt_entry(vector: u8, msg: EilvtMessage, masked: bool) -> u32 {
    let mask = if masked { APIC_EILVT_MASKED } else { 0 };
    mask | ((msg as u32) << 8) | vector as u32
}

// =============================================================================
// Programming Trait
// =============================================================================

/// Extended LVT programming for a given CPU
pub trait ExtendedLvt: Send + Sync {
    /// Reserve `offset` for `vector` and program the entry on `cpu`
    fn setup_eilvt(
        &self,
        cpu: CpuId,
        offset: u8,
        vector: u8,
        msg: EilvtMessage,
        masked: bool,
    ) -> Result<(), ApicError>;
}

// =============================================================================
// Tests
// =============================================================================
