//! # Extended LVT Reservation and Programming
//!
//! The reservation table is shared by every CPU and updated lock-free; the
//! LVT registers themselves are per-CPU and only written by their owner.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::{
    eilvt_entry, eilvt_register, ApicError, EilvtMessage, ExtendedLvt, APIC_EILVT_MASKED,
    EILVT_NR_MAX,
};
use crate::arch::x86_64::smp::CpuId;

// =============================================================================
// Reservation Table
// =============================================================================

/// System-wide extended LVT offset reservations
///
/// Each slot stores the last reserved entry (vector, message type and mask
/// bit). A zero vector means unassigned.
#[derive(Debug)]
pub struct EilvtTable {
    offsets: [AtomicU32; EILVT_NR_MAX],
}

/// Whether an entry holding `old` may be replaced by `new`
#[inline]
const fn is_changeable(old: u32, new: u32) -> bool {
    (old & APIC_EILVT_MASKED) != 0 || new == APIC_EILVT_MASKED || (new & !APIC_EILVT_MASKED) == old
}

impl EilvtTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            offsets: [
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
        }
    }

    /// Reserve `offset` for entry `new`
    ///
    /// Succeeds when the slot is unassigned, masked, already holds the same
    /// vector, or `new` is a masked-only release.
    pub fn reserve(&self, offset: u8, new: u32) -> Result<(), ApicError> {
        let slot = self
            .offsets
            .get(offset as usize)
            .ok_or(ApicError::InvalidOffset(offset))?;

        let mut rsvd = slot.load(Ordering::Acquire);
        let vector = loop {
            let vector = rsvd & !APIC_EILVT_MASKED;
            if vector != 0 && !is_changeable(vector, new) {
                return Err(ApicError::OffsetReserved {
                    offset,
                    vector: vector as u8,
                });
            }
            match slot.compare_exchange_weak(rsvd, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break vector,
                Err(current) => rsvd = current,
            }
        };

        let assigned = new & !APIC_EILVT_MASKED;
        if assigned != 0 && assigned != vector {
            log::info!("LVT offset {} assigned for vector {:#04x}", offset, assigned);
        }
        Ok(())
    }

    /// Vector currently reserved at `offset`, if any
    pub fn reserved_vector(&self, offset: u8) -> Option<u8> {
        let rsvd = self.offsets.get(offset as usize)?.load(Ordering::Acquire);
        match rsvd & !APIC_EILVT_MASKED {
            0 => None,
            vector => Some(vector as u8),
        }
    }

    /// Reserve and validate an entry against a CPU's current register value
    ///
    /// Returns the value the caller must write to the LVT register.
    pub fn prepare(
        &self,
        cpu: CpuId,
        offset: u8,
        current: u32,
        vector: u8,
        msg: EilvtMessage,
        masked: bool,
    ) -> Result<u32, ApicError> {
        let new = eilvt_entry(vector, msg, masked);

        if let Err(err) = self.reserve(offset, new) {
            log::error!(
                "[Firmware Bug]: cpu {}, try to use APIC{:X} (LVT offset {}) for vector {:#x}, {}",
                cpu,
                eilvt_register(offset),
                offset,
                vector,
                err
            );
            return Err(err);
        }

        if !is_changeable(current, new) {
            let err = ApicError::RegisterBusy {
                offset,
                vector: (current & !APIC_EILVT_MASKED) as u8,
            };
            log::error!(
                "[Firmware Bug]: cpu {}, try to use APIC{:X} (LVT offset {}) for vector {:#x}, {}",
                cpu,
                eilvt_register(offset),
                offset,
                vector,
                err
            );
            return Err(err);
        }

        Ok(new)
    }
}

/// Reservations for the native LAPIC
static EILVT_OFFSETS: EilvtTable = EilvtTable::new();

// =============================================================================
// LAPIC Base Address
// =============================================================================

/// Virtual base address for Local APIC memory-mapped registers.
static LAPIC_VIRT_BASE: AtomicU64 = AtomicU64::new(0);

/// Set the virtual address for LAPIC access
///
/// # Safety
///
/// The address must be a valid mapping of the LAPIC registers.
#[inline]
pub unsafe fn set_lapic_base(virt_addr: u64) {
    LAPIC_VIRT_BASE.store(virt_addr, Ordering::SeqCst);
}

/// Read a Local APIC register (xAPIC mode)
#[inline]
unsafe fn read_xapic(base: u64, offset: u32) -> u32 {
    let addr = base + offset as u64;
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// Write a Local APIC register (xAPIC mode)
#[inline]
unsafe fn write_xapic(base: u64, offset: u32, value: u32) {
    let addr = base + offset as u64;
    unsafe {
        core::ptr::write_volatile(addr as *mut u32, value);
    }
}

// =============================================================================
// Native Implementation
// =============================================================================

/// Extended LVT on the executing CPU's memory-mapped Local APIC
#[derive(Debug)]
pub struct XApicEilvt {
    /// Returns the logical id of the executing CPU
    current_cpu: fn() -> CpuId,
}

impl XApicEilvt {
    /// Create the native accessor
    ///
    /// # Safety
    ///
    /// [`set_lapic_base`] must have been called with a valid mapping and
    /// `current_cpu` must return the executing CPU's id.
    pub const unsafe fn new(current_cpu: fn() -> CpuId) -> Self {
        Self { current_cpu }
    }

    /// Shared reservation table
    pub fn table(&self) -> &'static EilvtTable {
        &EILVT_OFFSETS
    }
}

impl ExtendedLvt for XApicEilvt {
    fn setup_eilvt(
        &self,
        cpu: CpuId,
        offset: u8,
        vector: u8,
        msg: EilvtMessage,
        masked: bool,
    ) -> Result<(), ApicError> {
        if (self.current_cpu)() != cpu {
            return Err(ApicError::RemoteCpu(cpu));
        }
        if offset as usize >= EILVT_NR_MAX {
            return Err(ApicError::InvalidOffset(offset));
        }
        let base = LAPIC_VIRT_BASE.load(Ordering::Relaxed);
        if base == 0 {
            return Err(ApicError::NotPresent);
        }

        let reg = eilvt_register(offset);
        let current = unsafe { read_xapic(base, reg) };
        let new = EILVT_OFFSETS.prepare(cpu, offset, current, vector, msg, masked)?;
        unsafe { write_xapic(base, reg, new) };
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
